//! Inbound message routing: command execution vs conversational handling.
//!
//! Pure decisions only; the session layer owns the side effects.

use regex::RegexBuilder;

use crate::config::BotConfig;

/// What to do with one inbound chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Owner command: name plus whitespace-split positional arguments.
    /// Missing trailing arguments are absent, not an error.
    Command { name: String, args: Vec<String> },
    /// Conversational traffic. Reply and learn are independent decisions.
    Conversation {
        /// Where a generated reply should go, if one is owed at all.
        reply_to: Option<String>,
        /// Feed the line to the brain.
        learn: bool,
    },
    /// Prefixed line from someone who is not the owner: dropped entirely,
    /// not even learned from.
    Unauthorized,
}

/// The nick part of a raw `nick!user@host` source.
pub fn nick_of(sender: &str) -> &str {
    sender.split('!').next().unwrap_or(sender)
}

fn is_owner(config: &BotConfig, sender: &str) -> bool {
    if let Some(ref nick) = config.owner_nick {
        if nick_of(sender) == nick {
            return true;
        }
    }
    if let Some(ref mask) = config.owner_mask {
        if sender.contains(mask.as_str()) {
            return true;
        }
    }
    false
}

/// Decide how to treat one inbound line.
///
/// `sender` is the raw source (possibly `nick!user@host` form), `target` the
/// channel the line arrived on, or our own nick for a private message.
/// `learn` is the session's current learn flag.
pub fn route(config: &BotConfig, learn: bool, sender: &str, target: &str, text: &str) -> Route {
    if let Some(rest) = text.strip_prefix(config.prefix) {
        if !is_owner(config, sender) {
            return Route::Unauthorized;
        }
        let mut tokens = rest.split_whitespace();
        let name = tokens.next().unwrap_or("").to_string();
        let args: Vec<String> = tokens.map(str::to_string).collect();
        return Route::Command { name, args };
    }

    let reply_to = if target == config.nickname {
        // Direct message: always answer, privately.
        Some(nick_of(sender).to_string())
    } else if text.to_lowercase().contains(&config.nickname.to_lowercase()) {
        // Addressed in a channel: answer where the privacy policy says.
        if config.private_replies {
            Some(nick_of(sender).to_string())
        } else {
            Some(target.to_string())
        }
    } else {
        None
    };

    Route::Conversation { reply_to, learn }
}

/// Strip every case-insensitive occurrence of `nick` from `text` so the
/// corpus is not polluted with references to our own name.
pub fn strip_nick(nick: &str, text: &str) -> String {
    let pattern = RegexBuilder::new(&regex::escape(nick))
        .case_insensitive(true)
        .build();
    match pattern {
        Ok(re) => re.replace_all(text, "").into_owned(),
        // An escaped literal always compiles; pass through if it somehow
        // does not rather than losing the line.
        Err(_) => text.to_string(),
    }
}
