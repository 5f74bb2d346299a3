//! The Markov brain: a file-backed store plus the worker that owns it.
//!
//! All brain traffic goes through one bounded queue processed in order by a
//! single blocking worker thread. That gives three guarantees the session
//! layer relies on: slow generation never runs on the protocol event loop,
//! at most one store handle is live at a time, and a reply queued after a
//! completed `reload` always runs against the reopened store. Dropping every
//! [`BrainHandle`] shuts the worker down.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use markov::Chain;
use tokio::sync::{mpsc, oneshot};

/// Requests accepted by the brain worker.
pub enum BrainRequest {
    /// Ingest one line of text. No response.
    Learn(String),
    /// Generate a reply seeded by the input where possible.
    Reply {
        text: String,
        respond: oneshot::Sender<Option<String>>,
    },
    /// Discard the store and reopen it from the backing file.
    Reload { respond: oneshot::Sender<Result<()>> },
}

/// File-backed Markov store. Thin wrapper over [`markov::Chain`].
pub struct BrainStore {
    chain: Chain<String>,
    path: PathBuf,
}

impl BrainStore {
    /// Open the store at `path`, starting with an empty chain if the file
    /// does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let chain = if path.exists() {
            Chain::load(path)
                .with_context(|| format!("failed to load brain file {}", path.display()))?
        } else {
            Chain::new()
        };
        Ok(Self {
            chain,
            path: path.to_path_buf(),
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            chain: Chain::new(),
            path,
        }
    }

    /// Ingest one line of text and persist the chain.
    pub fn learn(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.chain.feed_str(text);
        self.chain
            .save(&self.path)
            .with_context(|| format!("failed to save brain file {}", self.path.display()))
    }

    /// Generate a reply, seeded by the first input token the chain knows.
    /// Returns None while the chain is still untrained.
    pub fn reply(&self, text: &str) -> Option<String> {
        if self.chain.is_empty() {
            return None;
        }
        for token in text.split_whitespace() {
            let generated = self.chain.generate_str_from_token(token);
            if !generated.is_empty() {
                return Some(generated);
            }
        }
        let generated = self.chain.generate_str();
        (!generated.is_empty()).then_some(generated)
    }
}

/// Handle for talking to the brain worker. Cheap to clone.
#[derive(Clone)]
pub struct BrainHandle {
    tx: mpsc::Sender<BrainRequest>,
}

impl BrainHandle {
    /// The queue is bounded so a hung store surfaces as backpressure
    /// instead of unbounded memory growth.
    const QUEUE_DEPTH: usize = 64;

    /// Spawn the worker owning the store for `path`. If the file cannot be
    /// opened the worker logs a warning and starts with an empty chain; a
    /// later `reload` can pick the file up again.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(Self::QUEUE_DEPTH);
        tokio::task::spawn_blocking(move || worker(path, rx));
        Self { tx }
    }

    /// Pair a handle with a raw request receiver. Test seam.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<BrainRequest>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    pub async fn learn(&self, text: String) -> Result<()> {
        self.tx
            .send(BrainRequest::Learn(text))
            .await
            .map_err(|_| anyhow::anyhow!("brain worker is gone"))
    }

    pub async fn reply(&self, text: String) -> Result<Option<String>> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(BrainRequest::Reply { text, respond })
            .await
            .map_err(|_| anyhow::anyhow!("brain worker is gone"))?;
        Ok(rx.await.unwrap_or(None))
    }

    pub async fn reload(&self) -> Result<()> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(BrainRequest::Reload { respond })
            .await
            .map_err(|_| anyhow::anyhow!("brain worker is gone"))?;
        rx.await.map_err(|_| anyhow::anyhow!("brain worker is gone"))?
    }
}

fn worker(path: PathBuf, mut rx: mpsc::Receiver<BrainRequest>) {
    let mut store = match BrainStore::open(&path) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, "Starting with an empty brain");
            BrainStore::empty(path)
        }
    };

    while let Some(request) = rx.blocking_recv() {
        match request {
            BrainRequest::Learn(text) => {
                if let Err(e) = store.learn(&text) {
                    tracing::warn!(error = %e, "Brain learn failed");
                }
            }
            BrainRequest::Reply { text, respond } => {
                let _ = respond.send(store.reply(&text));
            }
            BrainRequest::Reload { respond } => match BrainStore::open(&store.path) {
                Ok(fresh) => {
                    store = fresh;
                    let _ = respond.send(Ok(()));
                }
                // Keep the old store so the session stays usable.
                Err(e) => {
                    let _ = respond.send(Err(e));
                }
            },
        }
    }
}
