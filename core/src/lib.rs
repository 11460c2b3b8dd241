//! loopircd core
//!
//! Connection handling and session state for a line-oriented IRC daemon
//! based on RFC 1459: a single-threaded event loop, the nick and channel
//! registries, the ping/pong liveness sweep, notification fan-out and
//! reverse DNS hostnames.

pub mod buffer;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod handler;
pub mod lookup;
pub mod message;
pub mod numeric;
pub mod server;

pub use buffer::{RecvQueue, SendQueue};
pub use channel::Channel;
pub use client::{Client, ClientId, Pong};
pub use config::Config;
pub use error::{Error, Result};
pub use event_loop::EventLoop;
pub use handler::{CommandHandler, LineHandler};
pub use lookup::{DnsResolver, HostLookup, HostResolver, HostnameCache, Resolved};
pub use message::{Message, MessageType, Prefix};
pub use numeric::NumericReply;
pub use server::{Departed, Server, ServerStats};

// Re-export for implementors of HostLookup
pub use async_trait::async_trait;
