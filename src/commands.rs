//! The fixed owner command registry.
//!
//! Commands live in an explicit table rather than being resolved against
//! method names, so an unknown command and a `help` lookup miss are both
//! ordinary recoverable results. `help` iterates the same table it resolves
//! single names against.

/// Tagged command handlers. Dispatch happens in [`crate::session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    Join,
    Part,
    Help,
    Learn,
    Quit,
    Msg,
    Reload,
    KickRejoin,
    JoinInvite,
    SaveChannel,
    ListChannels,
}

/// One registry entry: the chat-level name plus the line `help` prints.
pub struct CommandSpec {
    pub name: &'static str,
    pub cmd: Cmd,
    pub describe: &'static str,
}

pub const REGISTRY: &[CommandSpec] = &[
    CommandSpec {
        name: "join",
        cmd: Cmd::Join,
        describe: "join <channel> [<key>] - join a channel, optionally keyed",
    },
    CommandSpec {
        name: "part",
        cmd: Cmd::Part,
        describe: "part <channel> - leave a channel",
    },
    CommandSpec {
        name: "help",
        cmd: Cmd::Help,
        describe: "help [<command>] - list commands or describe one",
    },
    CommandSpec {
        name: "learn",
        cmd: Cmd::Learn,
        describe: "learn - toggle learning from conversation",
    },
    CommandSpec {
        name: "quit",
        cmd: Cmd::Quit,
        describe: "quit - say goodbye and shut down",
    },
    CommandSpec {
        name: "msg",
        cmd: Cmd::Msg,
        describe: "msg <target> <text> - send a message somewhere",
    },
    CommandSpec {
        name: "reload",
        cmd: Cmd::Reload,
        describe: "reload - reopen the brain file",
    },
    CommandSpec {
        name: "kickrejoin",
        cmd: Cmd::KickRejoin,
        describe: "kickrejoin - toggle rejoining channels we are kicked from",
    },
    CommandSpec {
        name: "joininvite",
        cmd: Cmd::JoinInvite,
        describe: "joininvite - toggle joining channels we are invited to",
    },
    CommandSpec {
        name: "sc",
        cmd: Cmd::SaveChannel,
        describe: "sc <channel> - persist a channel to the config file",
    },
    CommandSpec {
        name: "lc",
        cmd: Cmd::ListChannels,
        describe: "lc - list channels persisted in the config file",
    },
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    REGISTRY.iter().find(|spec| spec.name == name)
}

/// The line `help` prints for one entry: `<prefix><name> - <description>`.
pub fn help_line(prefix: char, spec: &CommandSpec) -> String {
    format!("{prefix}{}", spec.describe)
}
