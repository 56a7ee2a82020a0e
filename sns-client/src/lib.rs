mod cli;
mod client;
mod rpc;

/// Handshake sentinel the server expects as the first `Timeline` message's
/// `msg` field before it binds the stream to a username.
pub(crate) const HANDSHAKE_SENTINEL: &str = "0xFEE1DEAD";

pub use client::run;
