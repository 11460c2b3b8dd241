//! IRC message parsing and handling
//!
//! This module implements the IRC message format as defined in RFC 1459.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IRC message prefix (server or user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prefix {
    /// Server name
    Server(String),
    /// User prefix (nick!user@host)
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => write!(f, "{}!{}@{}", nick, user, host),
        }
    }
}

/// IRC message types understood by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    // Connection registration
    Nick,
    User,
    Quit,

    // Channel operations
    Join,
    Part,

    // Messaging
    PrivMsg,
    Notice,

    // Miscellaneous
    Ping,
    Pong,
    Error,
    Lusers,

    // Custom/unknown, including numerics
    Custom(String),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Nick => "NICK",
            MessageType::User => "USER",
            MessageType::Quit => "QUIT",
            MessageType::Join => "JOIN",
            MessageType::Part => "PART",
            MessageType::PrivMsg => "PRIVMSG",
            MessageType::Notice => "NOTICE",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
            MessageType::Lusers => "LUSERS",
            MessageType::Custom(cmd) => cmd.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "NICK" => MessageType::Nick,
            "USER" => MessageType::User,
            "QUIT" => MessageType::Quit,
            "JOIN" => MessageType::Join,
            "PART" => MessageType::Part,
            "PRIVMSG" => MessageType::PrivMsg,
            "NOTICE" => MessageType::Notice,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            "ERROR" => MessageType::Error,
            "LUSERS" => MessageType::Lusers,
            _ => MessageType::Custom(s.to_string()),
        }
    }
}

/// IRC message as defined in RFC 1459
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Optional prefix (server or user)
    pub prefix: Option<Prefix>,
    /// Message command/type
    pub command: MessageType,
    /// Message parameters
    pub params: Vec<String>,
}

impl Message {
    /// Create a new message
    pub fn new(command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command,
            params,
        }
    }

    /// Create a new message with prefix
    pub fn with_prefix(prefix: Prefix, command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: Some(prefix),
            command,
            params,
        }
    }

    /// Parse an IRC message from a single line
    pub fn parse(input: &str) -> crate::Result<Self> {
        let mut rest = input.trim_matches(|c| c == '\r' || c == '\n' || c == ' ');
        if rest.is_empty() {
            return Err(crate::Error::MessageParse("Empty message".to_string()));
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix_str, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = remainder.trim_start_matches(' ');
            Some(parse_prefix(prefix_str)?)
        } else {
            None
        };

        // The trailing parameter starts at the first " :" and may contain spaces
        let (middle, trailing) = match rest.find(" :") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
            None => (rest, None),
        };

        let mut words = middle.split(' ').filter(|w| !w.is_empty());
        let command_str = words
            .next()
            .ok_or_else(|| crate::Error::MessageParse("No command found".to_string()))?;

        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command: MessageType::from(command_str),
            params,
        })
    }
}

fn parse_prefix(prefix_str: &str) -> crate::Result<Prefix> {
    if prefix_str.is_empty() {
        return Err(crate::Error::MessageParse("Empty prefix".to_string()));
    }

    match prefix_str.split_once('!') {
        Some((nick, user_host)) => {
            let (user, host) = user_host
                .split_once('@')
                .ok_or_else(|| crate::Error::MessageParse("Invalid user prefix format".to_string()))?;
            Ok(Prefix::User {
                nick: nick.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            })
        }
        None => Ok(Prefix::Server(prefix_str.to_string())),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        write!(f, "{}", self.command)?;

        for (i, param) in self.params.iter().enumerate() {
            let last = i == self.params.len() - 1;
            if last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }

        Ok(())
    }
}
