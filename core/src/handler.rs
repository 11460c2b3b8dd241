//! Session line handling
//!
//! The event loop hands every complete inbound line to a [`LineHandler`].
//! [`CommandHandler`] is the built-in implementation: it parses the line,
//! drives the [`Server`] registries and turns lookup misses into numerics.

use crate::client::ClientId;
use crate::{Error, Message, MessageType, NumericReply, Prefix, Result, Server};

/// Consumer of decoded, non-empty protocol lines
pub trait LineHandler {
    fn handle_line(&mut self, server: &mut Server, id: ClientId, line: &str) -> Result<()>;
}

/// Command dispatcher for client connections
#[derive(Debug, Default)]
pub struct CommandHandler;

impl CommandHandler {
    pub fn new() -> Self {
        Self
    }
}

impl LineHandler for CommandHandler {
    fn handle_line(&mut self, server: &mut Server, id: ClientId, line: &str) -> Result<()> {
        let authorised = server
            .client(&id)
            .map(|client| client.authorised)
            .ok_or(Error::UnknownClient(id))?;

        let message = match Message::parse(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(peer = %id, "Ignoring unparsable line: {}", e);
                return Ok(());
            }
        };

        let allowed_unregistered = matches!(
            message.command,
            MessageType::Nick | MessageType::User | MessageType::Ping | MessageType::Pong | MessageType::Quit
        );
        if !authorised && !allowed_unregistered {
            let reply = NumericReply::not_registered(server.name());
            send(server, id, reply);
            return Ok(());
        }

        match message.command {
            MessageType::Nick => handle_nick(server, id, &message),
            MessageType::User => handle_user(server, id, &message),
            MessageType::Ping => handle_ping(server, id, &message),
            MessageType::Pong => {
                server.record_pong(id);
                Ok(())
            }
            MessageType::Quit => {
                let reason = match message.params.first() {
                    Some(text) if !text.is_empty() => format!("Quit: {}", text),
                    _ => "Client Quit".to_string(),
                };
                server.close_link(id, &reason);
                Ok(())
            }
            MessageType::Join => handle_join(server, id, &message),
            MessageType::Part => handle_part(server, id, &message),
            MessageType::PrivMsg => handle_privmsg(server, id, &message),
            MessageType::Notice => handle_notice(server, id, &message),
            MessageType::Lusers => {
                send_lusers(server, id);
                Ok(())
            }
            ref command => {
                let reply = NumericReply::unknown_command(server.name(), &nick_of(server, id), &command.to_string());
                send(server, id, reply);
                Ok(())
            }
        }
    }
}

fn send(server: &mut Server, id: ClientId, message: Message) {
    if let Some(client) = server.client_mut(&id) {
        client.send(message);
    }
}

fn nick_of(server: &Server, id: ClientId) -> String {
    server
        .client(&id)
        .map(|client| client.display_nick().to_string())
        .unwrap_or_else(|| "*".to_string())
}

/// Turn a registry lookup miss into the matching numeric; other errors
/// propagate to the event loop.
fn reply_lookup_error(server: &mut Server, id: ClientId, result: Result<()>) -> Result<()> {
    let nick = nick_of(server, id);
    let reply = match result {
        Ok(()) => return Ok(()),
        Err(Error::NoSuchNick(target)) => NumericReply::no_such_nick(server.name(), &nick, &target),
        Err(Error::NoSuchChannel(target)) => NumericReply::no_such_channel(server.name(), &nick, &target),
        Err(e) => return Err(e),
    };
    send(server, id, reply);
    Ok(())
}

/// Check a nickname against the RFC 1459 character set
pub fn is_valid_nickname(nick: &str, max_length: usize) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if nick.len() > max_length {
        return false;
    }
    if !first.is_ascii_alphabetic() && !"[]\\`_^{|}~".contains(first) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || "-[]\\`_^{|}~".contains(c))
}

/// Channel names start with `#` or `&` and carry no separators
pub fn is_valid_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some('#') | Some('&') => {}
        _ => return false,
    }
    name.len() > 1 && name.len() <= 50 && chars.all(|c| !c.is_control() && c != ' ' && c != ',')
}

fn handle_nick(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let nick = nick_of(server, id);
    let Some(new_nick) = message.params.first().filter(|n| !n.is_empty()) else {
        let reply = NumericReply::no_nickname_given(server.name(), &nick);
        send(server, id, reply);
        return Ok(());
    };

    if !is_valid_nickname(new_nick, server.config().server.max_nickname_length) {
        let reply = NumericReply::erroneous_nickname(server.name(), &nick, new_nick);
        send(server, id, reply);
        return Ok(());
    }

    // A case-only change of one's own nick is not a collision
    match server.nick_owner(new_nick) {
        Some(owner) if owner != id => {
            let reply = NumericReply::nickname_in_use(server.name(), &nick, new_nick);
            send(server, id, reply);
            return Ok(());
        }
        _ => {}
    }

    let client = server.client(&id).ok_or(Error::UnknownClient(id))?;
    let old_nick = client.nick.clone();
    if old_nick.as_deref() == Some(new_nick.as_str()) {
        return Ok(());
    }

    match old_nick {
        Some(old_nick) => {
            let line = format!(":{} NICK :{}", client.identifier(), new_nick);
            let authorised = client.authorised;

            server.broadcast_nick(&old_nick, new_nick);
            if let Some(client) = server.client_mut(&id) {
                if authorised {
                    client.write(&line);
                }
                client.nick = Some(new_nick.clone());
            }
            server.deregister_nick(&old_nick);
            server.register_nick(new_nick, id);
            tracing::info!(event = "NICK", peer = %id, "{} is now known as {}", old_nick, new_nick);
        }
        None => {
            if let Some(client) = server.client_mut(&id) {
                client.nick = Some(new_nick.clone());
            }
            server.register_nick(new_nick, id);
        }
    }

    complete_registration(server, id);
    Ok(())
}

fn handle_user(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let nick = nick_of(server, id);
    if message.params.len() < 4 {
        let reply = NumericReply::need_more_params(server.name(), &nick, "USER");
        send(server, id, reply);
        return Ok(());
    }

    let client = server.client_mut(&id).ok_or(Error::UnknownClient(id))?;
    if client.authorised || client.username.is_some() {
        let reply = NumericReply::already_registered(server.name(), &nick);
        send(server, id, reply);
        return Ok(());
    }

    client.username = Some(message.params[0].clone());
    client.realname = Some(message.params[3].clone());

    complete_registration(server, id);
    Ok(())
}

/// Authorise the session once both NICK and USER are known
fn complete_registration(server: &mut Server, id: ClientId) {
    let name = server.name().to_string();
    let version = server.config().server.version.clone();
    let created = server.created().format("%a %b %e %Y at %H:%M:%S UTC").to_string();

    let Some(client) = server.client_mut(&id) else {
        return;
    };
    if client.authorised || client.nick.is_none() || client.username.is_none() {
        return;
    }

    client.authorised = true;
    client.start_liveness_tracking();

    let nick = client.display_nick().to_string();
    let identifier = client.identifier();
    client.send(NumericReply::welcome(&name, &nick, &identifier));
    client.send(NumericReply::your_host(&name, &nick, &version));
    client.send(NumericReply::created(&name, &nick, &created));
    client.send(NumericReply::my_info(&name, &nick, &version));

    tracing::info!(event = "REGISTER", peer = %id, "{}", identifier);
    send_lusers(server, id);
}

fn send_lusers(server: &mut Server, id: ClientId) {
    let stats = server.stats();
    let name = server.name().to_string();
    let nick = nick_of(server, id);

    if let Some(client) = server.client_mut(&id) {
        client.send(NumericReply::luser_client(&name, &nick, stats.clients));
        client.send(NumericReply::luser_channels(&name, &nick, stats.channels));
        client.send(NumericReply::luser_me(&name, &nick, stats.clients));
        client.send(NumericReply::local_users(&name, &nick, stats.clients, stats.max_clients));
        client.send(NumericReply::global_users(&name, &nick, stats.clients, stats.max_clients));
    }
}

fn handle_ping(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let name = server.name().to_string();
    let Some(token) = message.params.first() else {
        let reply = NumericReply::need_more_params(&name, &nick_of(server, id), "PING");
        send(server, id, reply);
        return Ok(());
    };

    let pong = Message::with_prefix(
        Prefix::Server(name.clone()),
        MessageType::Pong,
        vec![name, token.clone()],
    );
    send(server, id, pong);
    Ok(())
}

fn handle_join(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let nick = nick_of(server, id);
    let Some(targets) = message.params.first() else {
        let reply = NumericReply::need_more_params(server.name(), &nick, "JOIN");
        send(server, id, reply);
        return Ok(());
    };

    if targets == "0" {
        let mut joined: Vec<String> = server
            .client(&id)
            .map(|client| client.channels.iter().cloned().collect())
            .unwrap_or_default();
        joined.sort();
        for key in joined {
            let name = server.cased_channel(&key).unwrap_or(key.as_str()).to_string();
            let result = server.channel_part(id, &name, None);
            reply_lookup_error(server, id, result)?;
        }
        return Ok(());
    }

    for target in targets.split(',').filter(|t| !t.is_empty()) {
        if !is_valid_channel_name(target) {
            let reply = NumericReply::no_such_channel(server.name(), &nick, target);
            send(server, id, reply);
            continue;
        }
        let result = server.channel_join(id, target);
        reply_lookup_error(server, id, result)?;
    }
    Ok(())
}

fn handle_part(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let Some(targets) = message.params.first() else {
        let reply = NumericReply::need_more_params(server.name(), &nick_of(server, id), "PART");
        send(server, id, reply);
        return Ok(());
    };
    let reason = message.params.get(1).map(String::as_str);

    for target in targets.split(',').filter(|t| !t.is_empty()) {
        let result = server.channel_part(id, target, reason);
        reply_lookup_error(server, id, result)?;
    }
    Ok(())
}

fn handle_privmsg(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let nick = nick_of(server, id);
    let Some(targets) = message.params.first() else {
        let reply = NumericReply::no_recipient(server.name(), &nick, "PRIVMSG");
        send(server, id, reply);
        return Ok(());
    };
    let Some(text) = message.params.get(1).filter(|t| !t.is_empty()) else {
        let reply = NumericReply::no_text_to_send(server.name(), &nick);
        send(server, id, reply);
        return Ok(());
    };

    for target in targets.split(',').filter(|t| !t.is_empty()) {
        let result = if target.starts_with('#') || target.starts_with('&') {
            server.channel_message(id, target, text)
        } else {
            server.private_message(id, target, text)
        };
        reply_lookup_error(server, id, result)?;
    }
    Ok(())
}

/// NOTICE never generates automatic replies, so lookup misses are dropped
fn handle_notice(server: &mut Server, id: ClientId, message: &Message) -> Result<()> {
    let (Some(targets), Some(text)) = (message.params.first(), message.params.get(1)) else {
        return Ok(());
    };

    for target in targets.split(',').filter(|t| !t.is_empty()) {
        let result = if target.starts_with('#') || target.starts_with('&') {
            server.channel_notice(id, target, text)
        } else {
            server.private_notice(id, target, text)
        };
        match result {
            Ok(()) | Err(Error::NoSuchNick(_)) | Err(Error::NoSuchChannel(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
