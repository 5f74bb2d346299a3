//! Per-connection session: protocol event reactions and command handlers.
//!
//! A session is built fresh for every connection attempt and discarded on
//! disconnect; nothing in here survives a reconnect. Side effects on the
//! connection go through the narrow [`Outbound`] capability trait so the
//! handlers can be exercised against a recording mock.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::brain::BrainHandle;
use crate::commands::{self, Cmd};
use crate::config::BotConfig;
use crate::router::{self, Route};

/// The send-side capabilities a session needs from the connection.
pub trait Outbound: Clone + Send + Sync + 'static {
    fn privmsg(&self, target: &str, text: &str) -> Result<()>;
    fn notice(&self, target: &str, text: &str) -> Result<()>;
    fn join(&self, channel: &str, key: Option<&str>) -> Result<()>;
    fn part(&self, channel: &str) -> Result<()>;
    fn quit(&self, message: &str) -> Result<()>;
}

/// [`Outbound`] over the real connection.
#[derive(Clone)]
pub struct IrcOutbound {
    sender: irc::client::Sender,
}

impl IrcOutbound {
    pub fn new(sender: irc::client::Sender) -> Self {
        Self { sender }
    }
}

impl Outbound for IrcOutbound {
    fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        Ok(self.sender.send_privmsg(target, text)?)
    }

    fn notice(&self, target: &str, text: &str) -> Result<()> {
        Ok(self.sender.send_notice(target, text)?)
    }

    fn join(&self, channel: &str, key: Option<&str>) -> Result<()> {
        let command = irc::proto::Command::JOIN(
            channel.to_string(),
            key.map(str::to_string),
            None,
        );
        Ok(self.sender.send(command)?)
    }

    fn part(&self, channel: &str) -> Result<()> {
        Ok(self.sender.send(irc::proto::Command::PART(channel.to_string(), None))?)
    }

    fn quit(&self, message: &str) -> Result<()> {
        Ok(self.sender.send_quit(message)?)
    }
}

/// Mutable per-connection policy flags, reset to config defaults every time
/// a session is built.
#[derive(Debug, Clone, Copy)]
pub struct SessionState {
    pub learn: bool,
    pub kick_rejoin: bool,
    pub join_invite: bool,
}

impl SessionState {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            learn: config.learn,
            kick_rejoin: config.kick_rejoin,
            join_invite: config.join_invite,
        }
    }
}

/// What the event loop should do after an event has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The owner asked us to shut down for good; do not reconnect.
    Quit,
}

pub struct Session<O: Outbound> {
    config: BotConfig,
    config_path: PathBuf,
    out: O,
    brain: BrainHandle,
    pub state: SessionState,
}

impl<O: Outbound> Session<O> {
    pub fn new(config: BotConfig, config_path: PathBuf, out: O, brain: BrainHandle) -> Self {
        let state = SessionState::from_config(&config);
        Self {
            config,
            config_path,
            out,
            brain,
            state,
        }
    }

    /// Route one PRIVMSG and react to it.
    ///
    /// Reply generation is awaited on a spawned task, never here, so a slow
    /// brain cannot stall delivery of subsequent protocol traffic.
    pub async fn handle_privmsg(&mut self, sender: &str, target: &str, text: &str) -> Result<Flow> {
        match router::route(&self.config, self.state.learn, sender, target, text) {
            Route::Command { name, args } => self.dispatch(sender, &name, &args).await,
            Route::Unauthorized => Ok(Flow::Continue),
            Route::Conversation { reply_to, learn } => {
                if let Some(reply_target) = reply_to {
                    let brain = self.brain.clone();
                    let out = self.out.clone();
                    let prompt = text.to_string();
                    tokio::spawn(async move {
                        match brain.reply(prompt).await {
                            Ok(Some(reply)) => {
                                if let Err(e) = out.privmsg(&reply_target, &reply) {
                                    warn!(error = %e, "Reply send failed");
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "Brain reply failed"),
                        }
                    });
                }
                if learn {
                    let scrubbed = router::strip_nick(&self.config.nickname, text);
                    self.brain.learn(scrubbed).await?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// We were kicked. Always logged; rejoin is policy.
    pub fn handle_kick(&self, channel: &str, by: &str, reason: &str) -> Result<()> {
        info!(%channel, %by, %reason, "Kicked");
        if self.state.kick_rejoin {
            self.out.join(channel, None)?;
        }
        Ok(())
    }

    /// We were invited somewhere. Always logged; joining is policy.
    pub fn handle_invite(&self, channel: &str, by: &str) -> Result<()> {
        info!(%channel, %by, "Invited");
        if self.state.join_invite {
            self.out.join(channel, None)?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, sender: &str, name: &str, args: &[String]) -> Result<Flow> {
        let sender_nick = router::nick_of(sender).to_string();
        let Some(spec) = commands::lookup(name) else {
            self.out.notice(&sender_nick, "Unknown command!")?;
            return Ok(Flow::Continue);
        };

        match spec.cmd {
            Cmd::Join => {
                // No channel given: a quiet no-op, like every handler with
                // a missing trailing argument.
                if let Some(channel) = args.first() {
                    self.out.join(channel, args.get(1).map(String::as_str))?;
                }
            }
            Cmd::Part => {
                if let Some(channel) = args.first() {
                    self.out.part(channel)?;
                }
            }
            Cmd::Help => self.cmd_help(&sender_nick, args.first().map(String::as_str))?,
            Cmd::Learn => {
                self.state.learn = !self.state.learn;
                self.out
                    .notice(&sender_nick, &format!("Learn: {}", self.state.learn))?;
            }
            Cmd::Quit => {
                self.out.quit("Shutting down.")?;
                return Ok(Flow::Quit);
            }
            Cmd::Msg => {
                if args.len() >= 2 {
                    self.out.privmsg(&args[0], &args[1..].join(" "))?;
                }
            }
            Cmd::Reload => {
                let brain = self.brain.clone();
                let out = self.out.clone();
                tokio::spawn(async move {
                    let line = match brain.reload().await {
                        Ok(()) => "Brain reloaded.".to_string(),
                        Err(e) => format!("Brain reload failed: {e}"),
                    };
                    if let Err(e) = out.notice(&sender_nick, &line) {
                        warn!(error = %e, "Reload notice failed");
                    }
                });
            }
            Cmd::KickRejoin => {
                self.state.kick_rejoin = !self.state.kick_rejoin;
                self.out.notice(
                    &sender_nick,
                    &format!("Kick-rejoin: {}", self.state.kick_rejoin),
                )?;
            }
            Cmd::JoinInvite => {
                self.state.join_invite = !self.state.join_invite;
                self.out.notice(
                    &sender_nick,
                    &format!("Join-on-invite: {}", self.state.join_invite),
                )?;
            }
            Cmd::SaveChannel => {
                if let Some(channel) = args.first() {
                    self.cmd_save_channel(sender_nick, channel.clone());
                }
            }
            Cmd::ListChannels => {
                let listed = if self.config.channels.is_empty() {
                    "(none)".to_string()
                } else {
                    self.config.channels.join(" ")
                };
                self.out.notice(&sender_nick, &format!("Channels: {listed}"))?;
            }
        }
        Ok(Flow::Continue)
    }

    fn cmd_help(&self, to: &str, which: Option<&str>) -> Result<()> {
        match which {
            None => {
                self.out.notice(to, "Commands:")?;
                for spec in commands::REGISTRY {
                    self.out
                        .notice(to, &commands::help_line(self.config.prefix, spec))?;
                }
            }
            Some(name) => match commands::lookup(name) {
                Some(spec) => self
                    .out
                    .notice(to, &commands::help_line(self.config.prefix, spec))?,
                None => self.out.notice(to, &format!("No such command: {name}"))?,
            },
        }
        Ok(())
    }

    /// Mutate the in-memory channel list on the event loop, write the file
    /// off it.
    fn cmd_save_channel(&mut self, to: String, channel: String) {
        if !self.config.add_channel(&channel) {
            if let Err(e) = self.out.notice(&to, &format!("{channel} is already saved.")) {
                warn!(error = %e, "Notice failed");
            }
            return;
        }
        let snapshot = self.config.clone();
        let path = self.config_path.clone();
        let out = self.out.clone();
        tokio::task::spawn_blocking(move || {
            let line = match snapshot.save(&path) {
                Ok(()) => format!("Saved {channel}; it joins on the next reconnect."),
                Err(e) => format!("Saving {channel} failed: {e}"),
            };
            if let Err(e) = out.notice(&to, &line) {
                warn!(error = %e, "Save notice failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::brain::BrainRequest;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Privmsg(String, String),
        Notice(String, String),
        Join(String, Option<String>),
        Part(String),
        Quit(String),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<Sent>>>,
    }

    impl Recorder {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Outbound for Recorder {
        fn privmsg(&self, target: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Privmsg(target.into(), text.into()));
            Ok(())
        }
        fn notice(&self, target: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Notice(target.into(), text.into()));
            Ok(())
        }
        fn join(&self, channel: &str, key: Option<&str>) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Join(channel.into(), key.map(str::to_string)));
            Ok(())
        }
        fn part(&self, channel: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Part(channel.into()));
            Ok(())
        }
        fn quit(&self, message: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Quit(message.into()));
            Ok(())
        }
    }

    /// A brain that answers every prompt with "beep boop" and records what
    /// it was asked to learn.
    fn canned_brain() -> (BrainHandle, Arc<Mutex<Vec<String>>>) {
        let (handle, mut rx) = BrainHandle::channel(8);
        let learned = Arc::new(Mutex::new(Vec::new()));
        let learned_in_worker = Arc::clone(&learned);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    BrainRequest::Learn(text) => learned_in_worker.lock().unwrap().push(text),
                    BrainRequest::Reply { respond, .. } => {
                        let _ = respond.send(Some("beep boop".to_string()));
                    }
                    BrainRequest::Reload { respond } => {
                        let _ = respond.send(Ok(()));
                    }
                }
            }
        });
        (handle, learned)
    }

    fn config() -> BotConfig {
        toml::from_str(
            r#"
            server = "irc.example.org"
            nickname = "BotName"
            owner_nick = "ada"
        "#,
        )
        .unwrap()
    }

    fn session(config: BotConfig) -> (Session<Recorder>, Recorder, Arc<Mutex<Vec<String>>>) {
        let out = Recorder::default();
        let (brain, learned) = canned_brain();
        let session = Session::new(config, PathBuf::from("unused.toml"), out.clone(), brain);
        (session, out, learned)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn direct_message_always_replies() {
        let (mut session, out, learned) = session(config());
        session
            .handle_privmsg("bob!b@c", "BotName", "hello there")
            .await
            .unwrap();
        eventually(|| {
            out.sent()
                .contains(&Sent::Privmsg("bob".into(), "beep boop".into()))
        })
        .await;
        // Learn flag is off, so the reply stood alone.
        assert!(learned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_mention_replies_in_channel() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("bob!b@c", "#chat", "botname, thoughts?")
            .await
            .unwrap();
        eventually(|| {
            out.sent()
                .contains(&Sent::Privmsg("#chat".into(), "beep boop".into()))
        })
        .await;
    }

    #[tokio::test]
    async fn channel_mention_replies_privately_when_configured() {
        let mut config = config();
        config.private_replies = true;
        let (mut session, out, _) = session(config);
        session
            .handle_privmsg("bob!b@c", "#chat", "botname, thoughts?")
            .await
            .unwrap();
        eventually(|| {
            out.sent()
                .contains(&Sent::Privmsg("bob".into(), "beep boop".into()))
        })
        .await;
    }

    #[tokio::test]
    async fn plain_text_is_learned_but_never_answered() {
        let mut config = config();
        config.learn = true;
        let (mut session, out, learned) = session(config);
        session
            .handle_privmsg("bob!b@c", "#chat", "the weather is nice")
            .await
            .unwrap();
        eventually(|| !learned.lock().unwrap().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(out.sent().is_empty());
    }

    #[tokio::test]
    async fn own_nick_is_stripped_before_learning() {
        let mut config = config();
        config.learn = true;
        config.private_replies = true;
        let (mut session, _, learned) = session(config);
        session
            .handle_privmsg("bob!b@c", "#chat", "BotName hello botname")
            .await
            .unwrap();
        eventually(|| !learned.lock().unwrap().is_empty()).await;
        assert_eq!(learned.lock().unwrap()[0], " hello ");
    }

    #[tokio::test]
    async fn part_without_channel_is_a_noop() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@part")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(out.sent().is_empty());
    }

    #[tokio::test]
    async fn join_passes_channel_and_key() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@join #foo secret")
            .await
            .unwrap();
        assert_eq!(
            out.sent(),
            vec![Sent::Join("#foo".into(), Some("secret".into()))]
        );
    }

    #[tokio::test]
    async fn learn_toggles_back_and_forth_with_one_notice_each() {
        let (mut session, out, _) = session(config());
        assert!(!session.state.learn);

        session
            .handle_privmsg("ada!a@b", "#chat", "@learn")
            .await
            .unwrap();
        assert!(session.state.learn);

        session
            .handle_privmsg("ada!a@b", "#chat", "@learn")
            .await
            .unwrap();
        assert!(!session.state.learn);

        assert_eq!(
            out.sent(),
            vec![
                Sent::Notice("ada".into(), "Learn: true".into()),
                Sent::Notice("ada".into(), "Learn: false".into()),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_command_gets_a_notice() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@dance")
            .await
            .unwrap();
        assert_eq!(
            out.sent(),
            vec![Sent::Notice("ada".into(), "Unknown command!".into())]
        );
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@help")
            .await
            .unwrap();
        let sent = out.sent();
        // "Commands:" header plus one line per registry entry.
        assert_eq!(sent.len(), commands::REGISTRY.len() + 1);
        assert_eq!(sent[0], Sent::Notice("ada".into(), "Commands:".into()));
    }

    #[tokio::test]
    async fn help_for_unknown_name_is_graceful() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@help dance")
            .await
            .unwrap();
        assert_eq!(
            out.sent(),
            vec![Sent::Notice("ada".into(), "No such command: dance".into())]
        );
    }

    #[tokio::test]
    async fn quit_says_goodbye_and_stops_the_loop() {
        let (mut session, out, _) = session(config());
        let flow = session
            .handle_privmsg("ada!a@b", "#chat", "@quit")
            .await
            .unwrap();
        assert_eq!(flow, Flow::Quit);
        assert_eq!(out.sent(), vec![Sent::Quit("Shutting down.".into())]);
    }

    #[tokio::test]
    async fn msg_joins_its_words() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@msg #dest hello over there")
            .await
            .unwrap();
        assert_eq!(
            out.sent(),
            vec![Sent::Privmsg("#dest".into(), "hello over there".into())]
        );
    }

    #[tokio::test]
    async fn reload_reports_back() {
        let (mut session, out, _) = session(config());
        session
            .handle_privmsg("ada!a@b", "#chat", "@reload")
            .await
            .unwrap();
        eventually(|| {
            out.sent()
                .contains(&Sent::Notice("ada".into(), "Brain reloaded.".into()))
        })
        .await;
    }

    #[tokio::test]
    async fn stranger_commands_are_dropped_silently() {
        let mut config = config();
        config.learn = true;
        let (mut session, out, learned) = session(config);
        session
            .handle_privmsg("mallory!m@evil", "#chat", "@quit")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(out.sent().is_empty());
        assert!(learned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn kick_rejoin_follows_the_flag() {
        let (mut session, out, _) = session(config());
        session.handle_kick("#chat", "op", "begone").unwrap();
        assert!(out.sent().is_empty());

        session.state.kick_rejoin = true;
        session.handle_kick("#chat", "op", "begone").unwrap();
        assert_eq!(out.sent(), vec![Sent::Join("#chat".into(), None)]);
    }

    #[tokio::test]
    async fn invite_join_follows_the_flag() {
        let (mut session, out, _) = session(config());
        session.handle_invite("#private", "friend").unwrap();
        assert!(out.sent().is_empty());

        session.state.join_invite = true;
        session.handle_invite("#private", "friend").unwrap();
        assert_eq!(out.sent(), vec![Sent::Join("#private".into(), None)]);
    }

    #[tokio::test]
    async fn sc_persists_a_channel_and_lc_lists_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banter.toml");
        let base = config();
        base.save(&path).unwrap();

        let out = Recorder::default();
        let (brain, _) = canned_brain();
        let mut session = Session::new(base, path.clone(), out.clone(), brain);

        session
            .handle_privmsg("ada!a@b", "#chat", "@sc #saved")
            .await
            .unwrap();
        eventually(|| !out.sent().is_empty()).await;
        let reloaded = BotConfig::load(&path).unwrap();
        assert_eq!(reloaded.channels, vec!["#saved"]);

        session
            .handle_privmsg("ada!a@b", "#chat", "@lc")
            .await
            .unwrap();
        assert!(out
            .sent()
            .contains(&Sent::Notice("ada".into(), "Channels: #saved".into())));
    }

    #[tokio::test]
    async fn sc_twice_is_reported_as_already_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banter.toml");
        let base = config();
        base.save(&path).unwrap();

        let out = Recorder::default();
        let (brain, _) = canned_brain();
        let mut session = Session::new(base, path, out.clone(), brain);

        session
            .handle_privmsg("ada!a@b", "#chat", "@sc #saved")
            .await
            .unwrap();
        eventually(|| !out.sent().is_empty()).await;
        session
            .handle_privmsg("ada!a@b", "#chat", "@sc #saved")
            .await
            .unwrap();
        eventually(|| {
            out.sent()
                .contains(&Sent::Notice("ada".into(), "#saved is already saved.".into()))
        })
        .await;
    }
}
