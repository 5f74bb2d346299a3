//! banter: a Markov chat bot for IRC.
//!
//! The wire protocol lives in the `irc` crate and text generation in the
//! `markov` crate; this crate is the glue: per-connection session state,
//! message routing, the owner command set, and the reconnect policy.

pub mod backoff;
pub mod brain;
pub mod commands;
pub mod config;
pub mod router;
pub mod session;
