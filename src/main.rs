//! banter: a Markov chat bot for IRC.
//!
//! Connects to one server, joins the configured channels, learns from
//! conversation, and answers when spoken to. Owner commands arrive in chat,
//! prefixed with the configured sentinel character:
//!
//!   @join #chan [key]   @part #chan    @msg <target> <text>
//!   @learn   @reload    @kickrejoin    @joininvite
//!   @sc #chan   @lc     @help [command]   @quit
//!
//! See banter.toml.example for configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use irc::client::prelude::{Client, Command, Response};
use irc::proto::{Message, Prefix};

use banter::backoff::Backoff;
use banter::brain::BrainHandle;
use banter::config::BotConfig;
use banter::router;
use banter::session::{Flow, IrcOutbound, Session};

#[derive(Parser)]
#[command(name = "banter", about = "Markov chat bot for IRC")]
struct Args {
    /// Path to the bot configuration file
    #[arg(long, default_value = "banter.toml", env = "BANTER_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banter=info".into()),
        )
        .init();

    let args = Args::parse();

    // Fail fast on a broken config before entering the reconnect loop.
    let config = BotConfig::load(&args.config)?;
    tracing::info!(
        server = %config.server,
        nick = %config.nickname,
        channels = config.channels.len(),
        "Starting banter"
    );

    let mut backoff = Backoff::new();
    loop {
        match run_session(&args.config, &mut backoff).await {
            Ok(Flow::Quit) => {
                tracing::info!("Shut down by owner");
                return Ok(());
            }
            Ok(Flow::Continue) => tracing::warn!("Connection closed"),
            Err(e) => tracing::warn!(error = %e, "Session ended"),
        }
        let delay = backoff.next_delay();
        tracing::info!(seconds = delay.as_secs(), "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// One connection attempt: fresh config read, fresh brain worker, fresh
/// session state. Returns when the connection is gone or the owner quit.
async fn run_session(config_path: &Path, backoff: &mut Backoff) -> Result<Flow> {
    // Re-read so channels persisted by `sc` join on this attempt.
    let config = BotConfig::load(config_path)?;

    if let Some(parent) = config.brain_file.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut client = Client::from_config(config.irc_config()).await?;
    client.identify()?;
    let mut stream = client.stream()?;

    let nickname = config.nickname.clone();
    let brain = BrainHandle::spawn(config.brain_file.clone());
    let out = IrcOutbound::new(client.sender());
    let mut session = Session::new(config, config_path.to_path_buf(), out, brain);

    while let Some(message) = stream.next().await.transpose()? {
        match &message.command {
            Command::Response(Response::RPL_WELCOME, _) => {
                tracing::info!("Signed on");
                backoff.reset();
            }
            Command::PRIVMSG(target, text) => {
                let Some(sender) = source_of(&message) else {
                    continue;
                };
                // Never react to our own lines.
                if router::nick_of(&sender) == nickname {
                    continue;
                }
                if session.handle_privmsg(&sender, target, text).await? == Flow::Quit {
                    return Ok(Flow::Quit);
                }
            }
            Command::NOTICE(target, text) => {
                tracing::debug!(from = ?message.prefix, %target, %text, "Notice");
            }
            Command::KICK(channel, who, reason) if who == &nickname => {
                let by = message.source_nickname().unwrap_or("server");
                session.handle_kick(channel, by, reason.as_deref().unwrap_or(""))?;
            }
            Command::INVITE(who, channel) if who == &nickname => {
                let by = message.source_nickname().unwrap_or("someone");
                session.handle_invite(channel, by)?;
            }
            Command::JOIN(channel, _, _) => {
                if message.source_nickname() == Some(nickname.as_str()) {
                    tracing::info!(%channel, "Joined");
                }
            }
            _ => {}
        }
    }

    Ok(Flow::Continue)
}

/// Raw source of a message, in `nick!user@host` form where available.
fn source_of(message: &Message) -> Option<String> {
    match &message.prefix {
        Some(Prefix::Nickname(nick, user, host)) => Some(format!("{nick}!{user}@{host}")),
        Some(Prefix::ServerName(name)) => Some(name.clone()),
        None => None,
    }
}
