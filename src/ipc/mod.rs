//! Daemon control over a Unix socket: JSON line protocol, async server,
//! blocking CLI client.

pub mod client;
pub mod protocol;
pub mod server;
