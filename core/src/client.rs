//! Client session state

use crate::buffer::{RecvQueue, SendQueue};
use crate::config::ServerConfig;
use crate::Message;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Registry key of a connection: the peer address and port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(SocketAddr);

impl ClientId {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for ClientId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.ip(), self.0.port())
    }
}

/// Live sessions keyed by peer address
pub type ClientMap = HashMap<ClientId, Client>;

/// Keepalive record. `sent == None` means no PING has gone out yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pong {
    pub sent: Option<Instant>,
    pub pending: bool,
}

/// One accepted connection
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub nick: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    /// Reverse DNS name, once resolved
    pub hostname: Option<String>,
    /// Completed NICK + USER registration
    pub authorised: bool,
    /// Cleared as soon as termination begins
    pub active: bool,
    pub connected_at: Instant,
    /// Lowercased names of joined channels
    pub channels: HashSet<String>,
    /// Present once liveness tracking has started
    pub pong: Option<Pong>,
    pub sendq: SendQueue,
    pub recvq: RecvQueue,
}

impl Client {
    pub fn new(id: ClientId, config: &ServerConfig, connected_at: Instant) -> Self {
        Self {
            id,
            nick: None,
            username: None,
            realname: None,
            hostname: None,
            authorised: false,
            active: true,
            connected_at,
            channels: HashSet::new(),
            pong: None,
            sendq: SendQueue::new(config.sendq),
            recvq: RecvQueue::new(config.recvq),
        }
    }

    /// Queue a raw protocol line for this client
    pub fn write(&mut self, line: &str) {
        if !self.sendq.push(line) {
            tracing::debug!(peer = %self.id, "Dropped outbound line, sendq full");
        }
    }

    /// Queue a formatted message for this client
    pub fn send(&mut self, message: Message) {
        self.write(&message.to_string());
    }

    /// Nickname for replies, `*` before one is chosen
    pub fn display_nick(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// Hostname shown to other users, the IP address until resolved
    pub fn host(&self) -> String {
        match &self.hostname {
            Some(hostname) => hostname.clone(),
            None => self.id.ip().to_string(),
        }
    }

    /// Full `nick!user@host` source of messages from this client
    pub fn identifier(&self) -> String {
        format!(
            "{}!{}@{}",
            self.display_nick(),
            self.username.as_deref().unwrap_or("*"),
            self.host()
        )
    }

    /// Begin ping/pong tracking; the first PING goes out on the next sweep
    pub fn start_liveness_tracking(&mut self) {
        if self.pong.is_none() {
            self.pong = Some(Pong::default());
        }
    }

    /// Send a PING and mark a PONG as outstanding
    pub fn ping(&mut self, server_name: &str, now: Instant) {
        self.write(&format!("PING :{}", server_name));
        let pong = self.pong.get_or_insert_with(Pong::default);
        pong.sent = Some(now);
        pong.pending = true;
    }

    pub fn record_pong(&mut self) {
        if let Some(pong) = self.pong.as_mut() {
            pong.pending = false;
        }
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.contains(&channel.to_lowercase())
    }
}
