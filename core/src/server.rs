//! Server state: client, nick and channel registries
//!
//! The `Server` is the only owner of sessions and channels. Everything that
//! adds, removes or renames goes through its methods so the paired maps
//! (`nicks`/`nicks_cased`, `channels`/`channels_cased`) never drift apart.
//! It performs no socket I/O itself: outbound lines are queued on each
//! client's send queue and flushed by the event loop.

use crate::client::{Client, ClientId, ClientMap};
use crate::{Channel, Config, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A client removed from the registry whose socket still has to be closed
#[derive(Debug)]
pub struct Departed {
    pub id: ClientId,
    /// Outbound bytes queued before removal, written best-effort
    pub pending: Vec<u8>,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub clients: usize,
    pub max_clients: usize,
    pub channels: usize,
    pub uptime: Duration,
}

/// Main IRC server state
pub struct Server {
    config: Config,
    started: Instant,
    created: DateTime<Utc>,
    clients: ClientMap,
    /// Lowercased nick to owning client
    nicks: HashMap<String, ClientId>,
    /// Lowercased nick to nick as the client chose it
    nicks_cased: HashMap<String, String>,
    /// Lowercased channel name to channel
    channels: HashMap<String, Channel>,
    /// Lowercased channel name to name as first created
    channels_cased: HashMap<String, String>,
    max_clients: usize,
    departed: Vec<Departed>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self {
            config,
            started: Instant::now(),
            created: Utc::now(),
            clients: HashMap::new(),
            nicks: HashMap::new(),
            nicks_cased: HashMap::new(),
            channels: HashMap::new(),
            channels_cased: HashMap::new(),
            max_clients: 0,
            departed: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Server name used as reply prefix
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn client(&self, id: &ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn client_mut(&mut self, id: &ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub fn contains_client(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Highest number of simultaneous clients seen since start
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            clients: self.clients.len(),
            max_clients: self.max_clients,
            channels: self.channels.len(),
            uptime: self.started.elapsed(),
        }
    }

    // Client registry

    /// Create and register a session for a freshly accepted connection
    pub fn connect(&mut self, addr: SocketAddr, now: Instant) -> ClientId {
        let id = ClientId::new(addr);
        let client = Client::new(id, &self.config.server, now);
        self.register_client(client);
        id
    }

    /// Add a client to the registry and raise the high-water mark if needed
    pub fn register_client(&mut self, client: Client) {
        tracing::info!(event = "CONNECT", peer = %client.id, "{}", client.id);
        self.clients.insert(client.id, client);

        if self.clients.len() > self.max_clients {
            self.max_clients = self.clients.len();
        }
    }

    /// Remove a client from the registry, releasing its nick and channel
    /// memberships. The socket is handed to the event loop through
    /// [`Server::take_departed`].
    pub fn deregister_client(&mut self, id: ClientId) -> Option<Client> {
        let mut client = self.clients.remove(&id)?;

        if let Some(nick) = client.nick.as_deref() {
            if self.nick_owner(nick) == Some(id) {
                self.deregister_nick(nick);
            }
        }

        let mut channel_keys: Vec<String> = client.channels.drain().collect();
        channel_keys.sort();
        for key in channel_keys {
            let destroyed = match self.channels.get_mut(&key) {
                Some(channel) => {
                    channel.remove_silently(id, &mut self.clients);
                    channel.is_destroyed()
                }
                None => false,
            };
            if destroyed {
                self.deregister_channel(&key);
            }
        }

        tracing::info!(event = "DISCONNECT", peer = %id, "{}", id);
        self.departed.push(Departed {
            id,
            pending: client.sendq.take(),
        });
        Some(client)
    }

    /// Clients removed since the last call, for the event loop to close
    pub fn take_departed(&mut self) -> Vec<Departed> {
        std::mem::take(&mut self.departed)
    }

    // Nick registry

    pub fn nick_available(&self, nick: &str) -> bool {
        !self.nicks.contains_key(&nick.to_lowercase())
    }

    pub fn register_nick(&mut self, nick: &str, id: ClientId) {
        let key = nick.to_lowercase();
        self.nicks.insert(key.clone(), id);
        self.nicks_cased.insert(key, nick.to_string());
    }

    pub fn deregister_nick(&mut self, nick: &str) {
        let key = nick.to_lowercase();
        self.nicks.remove(&key);
        self.nicks_cased.remove(&key);
    }

    /// Client currently holding `nick`, compared case-insensitively
    pub fn nick_owner(&self, nick: &str) -> Option<ClientId> {
        self.nicks.get(&nick.to_lowercase()).copied()
    }

    /// Registered spelling of `nick`
    pub fn cased_nick(&self, nick: &str) -> Option<&str> {
        self.nicks_cased.get(&nick.to_lowercase()).map(String::as_str)
    }

    // Channel registry

    pub fn register_channel(&mut self, channel: Channel) {
        let key = channel.key();
        self.channels_cased.insert(key.clone(), channel.name.clone());
        self.channels.insert(key, channel);
    }

    pub fn deregister_channel(&mut self, name: &str) {
        let key = name.to_lowercase();
        self.channels.remove(&key);
        self.channels_cased.remove(&key);
    }

    pub fn channel_exists(&self, name: &str) -> bool {
        self.channels.contains_key(&name.to_lowercase())
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&name.to_lowercase())
    }

    /// Name of the channel as first created
    pub fn cased_channel(&self, name: &str) -> Option<&str> {
        self.channels_cased.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // Lifecycle

    /// Tear a session down: QUIT to its channel peers, then deregister.
    /// Returns false if the client is unknown or already terminating.
    pub fn terminate_client(&mut self, id: ClientId, reason: &str) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) if client.active => client.active = false,
            _ => return false,
        }

        self.broadcast_quit(id, reason);
        self.deregister_client(id);
        tracing::debug!(peer = %id, reason, "Client terminated");
        true
    }

    /// Send the client an ERROR line explaining why, then terminate it
    pub fn close_link(&mut self, id: ClientId, reason: &str) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) if client.active => {
                let line = format!("ERROR :Closing Link: {} ({})", client.host(), reason);
                client.write(&line);
            }
            _ => return false,
        }

        self.terminate_client(id, reason)
    }

    /// Terminate every connected client, used on shutdown
    pub fn terminate_clients(&mut self, reason: &str) {
        for id in self.client_ids() {
            self.close_link(id, reason);
        }
    }

    // Liveness

    /// Drive the PING/PONG keepalive and drop clients that stopped answering
    /// or never finished registering.
    pub fn inactive_client_check(&mut self, now: Instant) {
        let ping_frequency = self.config.liveness.ping_frequency();
        let registration_timeout = self.config.liveness.registration_timeout();
        let server_name = self.config.server.name.clone();

        // Closing a link removes entries, so walk a snapshot of the keys
        for id in self.client_ids() {
            let Some(client) = self.clients.get_mut(&id) else {
                continue;
            };
            if !client.active {
                continue;
            }

            let mut timeout = None;

            if let Some(pong) = client.pong {
                match pong.sent {
                    Some(sent) => {
                        let elapsed = now.saturating_duration_since(sent);
                        if elapsed >= ping_frequency {
                            if pong.pending {
                                timeout = Some(elapsed);
                            } else {
                                client.ping(&server_name, now);
                            }
                        }
                    }
                    None if !pong.pending => client.ping(&server_name, now),
                    None => {}
                }
            }

            if timeout.is_none() && !client.authorised {
                let elapsed = now.saturating_duration_since(client.connected_at);
                if elapsed >= registration_timeout {
                    timeout = Some(elapsed);
                }
            }

            if let Some(elapsed) = timeout {
                let reason = format!("Ping timeout: {:.0} seconds", elapsed.as_secs_f64());
                self.close_link(id, &reason);
            }
        }
    }

    /// Apply a finished reverse lookup; `None` keeps the IP address
    pub fn set_hostname(&mut self, id: ClientId, hostname: Option<String>) {
        let Some(hostname) = hostname else {
            return;
        };
        if let Some(client) = self.clients.get_mut(&id) {
            tracing::debug!(peer = %id, %hostname, "Resolved hostname");
            client.hostname = Some(hostname);
        }
    }

    pub fn record_pong(&mut self, id: ClientId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.record_pong();
        }
    }

    // Fan-out

    /// Tell everyone sharing a channel with `old_nick` about the rename.
    /// Call before the registry entry moves. Returns the number of peers told.
    pub fn broadcast_nick(&mut self, old_nick: &str, new_nick: &str) -> usize {
        let Some(id) = self.nick_owner(old_nick) else {
            return 0;
        };
        let Some(client) = self.clients.get(&id) else {
            return 0;
        };

        let line = format!(":{} NICK :{}", client.identifier(), new_nick);
        self.fan_out(id, &line)
    }

    /// Tell everyone sharing a channel with a departing client. The client
    /// must still be registered. Returns the number of peers told.
    pub fn broadcast_quit(&mut self, id: ClientId, reason: &str) -> usize {
        let Some(client) = self.clients.get(&id) else {
            return 0;
        };

        let line = format!(":{} QUIT :{}", client.identifier(), reason);
        self.fan_out(id, &line)
    }

    /// Deliver `line` once to every member of every channel `subject` is in,
    /// except `subject` itself.
    fn fan_out(&mut self, subject: ClientId, line: &str) -> usize {
        let Some(client) = self.clients.get(&subject) else {
            return 0;
        };
        let mut channel_keys: Vec<String> = client.channels.iter().cloned().collect();
        channel_keys.sort();

        let mut notified = HashSet::from([subject]);
        for key in &channel_keys {
            let Some(channel) = self.channels.get(key) else {
                continue;
            };
            for member in channel.members() {
                if notified.contains(member) {
                    continue;
                }
                if let Some(peer) = self.clients.get_mut(member) {
                    peer.write(line);
                }
                notified.insert(*member);
            }
        }

        notified.len() - 1
    }

    // Message routing

    pub fn private_message(&mut self, sender: ClientId, target_nick: &str, text: &str) -> Result<()> {
        self.unicast("PRIVMSG", sender, target_nick, text)
    }

    pub fn private_notice(&mut self, sender: ClientId, target_nick: &str, text: &str) -> Result<()> {
        self.unicast("NOTICE", sender, target_nick, text)
    }

    fn unicast(&mut self, command: &'static str, sender: ClientId, target_nick: &str, text: &str) -> Result<()> {
        let target_id = self
            .nick_owner(target_nick)
            .ok_or_else(|| Error::NoSuchNick(target_nick.to_string()))?;
        let source = self.clients.get(&sender).ok_or(Error::UnknownClient(sender))?;
        let identifier = source.identifier();
        let source_nick = source.display_nick().to_string();

        let target = self
            .clients
            .get_mut(&target_id)
            .ok_or_else(|| Error::NoSuchNick(target_nick.to_string()))?;
        let line = format!(":{} {} {} :{}", identifier, command, target.display_nick(), text);
        target.write(&line);

        tracing::info!(
            event = command,
            from = %source_nick,
            to = %target.display_nick(),
            "[{} to {}]: {}",
            source_nick,
            target.display_nick(),
            text
        );
        Ok(())
    }

    /// Route a PRIVMSG to a channel. An unknown channel is reported with
    /// the name exactly as given.
    pub fn channel_message(&mut self, sender: ClientId, target_channel: &str, text: &str) -> Result<()> {
        let channel = self
            .channels
            .get(&target_channel.to_lowercase())
            .ok_or_else(|| Error::NoSuchChannel(target_channel.to_string()))?;
        channel.handle_message(sender, &mut self.clients, &self.config.server.name, text);
        Ok(())
    }

    pub fn channel_notice(&mut self, sender: ClientId, target_channel: &str, text: &str) -> Result<()> {
        let channel = self
            .channels
            .get(&target_channel.to_lowercase())
            .ok_or_else(|| Error::NoSuchChannel(target_channel.to_string()))?;
        channel.handle_notice(sender, &mut self.clients, text);
        Ok(())
    }

    /// Join a channel, creating it on first use
    pub fn channel_join(&mut self, id: ClientId, target_channel: &str) -> Result<()> {
        if !self.clients.contains_key(&id) {
            return Err(Error::UnknownClient(id));
        }

        let key = target_channel.to_lowercase();
        if !self.channels.contains_key(&key) {
            self.register_channel(Channel::new(target_channel));
        }

        let channel = self
            .channels
            .get_mut(&key)
            .ok_or_else(|| Error::NoSuchChannel(target_channel.to_string()))?;

        if channel.join_client(id, &mut self.clients, &self.config.server.name) {
            let nick = self.clients.get(&id).map(|c| c.display_nick()).unwrap_or("*");
            tracing::info!(event = "JOIN", channel = %channel.name, "[{}]: {}", channel.name, nick);
        }
        Ok(())
    }

    /// Leave a channel; the channel is removed once empty
    pub fn channel_part(&mut self, id: ClientId, target_channel: &str, reason: Option<&str>) -> Result<()> {
        let key = target_channel.to_lowercase();
        let channel = self
            .channels
            .get_mut(&key)
            .ok_or_else(|| Error::NoSuchChannel(target_channel.to_string()))?;

        let nick = self
            .clients
            .get(&id)
            .map(|c| c.display_nick().to_string())
            .ok_or(Error::UnknownClient(id))?;

        if channel.remove_client(id, &mut self.clients, &self.config.server.name, reason) {
            tracing::info!(event = "PART", channel = %channel.name, "[{}]: {}", channel.name, nick);
        }

        if channel.is_destroyed() {
            self.deregister_channel(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        let mut config = Config::default();
        config.server.name = "irc.test".to_string();
        Server::new(config)
    }

    fn connect(server: &mut Server, addr: &str) -> ClientId {
        server.connect(addr.parse().unwrap(), Instant::now())
    }

    /// Connect and fully register a client under `nick`
    fn register(server: &mut Server, addr: &str, nick: &str) -> ClientId {
        let id = connect(server, addr);
        let client = server.client_mut(&id).unwrap();
        client.nick = Some(nick.to_string());
        client.username = Some(nick.to_lowercase());
        client.authorised = true;
        client.start_liveness_tracking();
        server.register_nick(nick, id);
        id
    }

    fn drain(server: &mut Server, id: &ClientId) -> Vec<String> {
        server.client_mut(id).unwrap().sendq.drain_lines()
    }

    #[test]
    fn test_connect_registers_by_address() {
        let mut server = server();
        let id = connect(&mut server, "10.0.0.1:5555");

        assert_eq!(server.client_count(), 1);
        assert_eq!(server.client_ids(), vec![id]);
        assert_eq!(id.to_string(), "10.0.0.1:5555");
        assert_eq!(server.max_clients(), 1);
    }

    #[test]
    fn test_max_clients_only_grows() {
        let mut server = server();
        let a = connect(&mut server, "10.0.0.1:1");
        let b = connect(&mut server, "10.0.0.1:2");
        let mut observed = server.client_count();
        assert_eq!(server.max_clients(), 2);

        server.terminate_client(a, "bye");
        assert_eq!(server.max_clients(), 2);

        for port in 3..6 {
            connect(&mut server, &format!("10.0.0.1:{}", port));
            observed = observed.max(server.client_count());
        }
        server.terminate_client(b, "bye");
        assert_eq!(server.max_clients(), observed);
        assert_eq!(server.max_clients(), 4);
    }

    #[test]
    fn test_nick_registry_is_case_insensitive() {
        let mut server = server();
        let bob = register(&mut server, "10.0.0.1:1", "Bob");

        assert!(!server.nick_available("bob"));
        assert!(!server.nick_available("BOB"));
        assert!(server.nick_available("alice"));
        assert_eq!(server.nick_owner("bOb"), Some(bob));
        assert_eq!(server.cased_nick("bob"), Some("Bob"));

        server.deregister_nick("BOB");
        assert!(server.nick_available("Bob"));
        assert_eq!(server.cased_nick("bob"), None);
    }

    #[test]
    fn test_deregister_releases_nick() {
        let mut server = server();
        let bob = register(&mut server, "10.0.0.1:1", "Bob");

        assert!(server.deregister_client(bob).is_some());
        assert!(server.nick_available("bob"));
        assert!(server.deregister_client(bob).is_none());
    }

    #[test]
    fn test_channel_lifecycle() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");

        server.channel_join(alice, "#test").unwrap();
        assert!(server.channel_exists("#TEST"));
        let channel = server.channel("#test").unwrap();
        assert_eq!(channel.members().collect::<Vec<_>>(), vec![&alice]);

        server.channel_part(alice, "#Test", None).unwrap();
        assert!(!server.channel_exists("#test"));
        assert_eq!(server.cased_channel("#test"), None);
        assert!(server.client(&alice).unwrap().channels.is_empty());
    }

    #[test]
    fn test_channel_keeps_first_spelling() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.1:2", "Bob");

        server.channel_join(alice, "#Rust").unwrap();
        server.channel_join(bob, "#RUST").unwrap();
        assert_eq!(server.channel_count(), 1);
        assert_eq!(server.cased_channel("#rust"), Some("#Rust"));
        assert_eq!(server.channel("#rust").unwrap().member_count(), 2);
    }

    #[test]
    fn test_message_to_absent_channel() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");

        match server.channel_message(alice, "#Missing", "hello") {
            Err(Error::NoSuchChannel(name)) => assert_eq!(name, "#Missing"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            server.channel_notice(alice, "#missing", "hello"),
            Err(Error::NoSuchChannel(_))
        ));
        assert!(matches!(
            server.channel_part(alice, "#Missing", None),
            Err(Error::NoSuchChannel(_))
        ));
        assert_eq!(server.channel_count(), 0);
        assert!(drain(&mut server, &alice).is_empty());
    }

    #[test]
    fn test_private_message_routing() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.2:1", "Bob");

        server.private_message(alice, "BOB", "hi").unwrap();
        assert_eq!(drain(&mut server, &bob), vec![":Alice!alice@10.0.0.1 PRIVMSG Bob :hi"]);

        server.private_notice(bob, "alice", "hey").unwrap();
        assert_eq!(drain(&mut server, &alice), vec![":Bob!bob@10.0.0.2 NOTICE Alice :hey"]);

        match server.private_message(alice, "Carol", "anyone?") {
            Err(Error::NoSuchNick(nick)) => assert_eq!(nick, "Carol"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(server.contains_client(&alice));
    }

    #[test]
    fn test_nick_broadcast_reaches_shared_peer_once() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.2:1", "Bob");
        let carol = register(&mut server, "10.0.0.3:1", "Carol");
        let dave = register(&mut server, "10.0.0.4:1", "Dave");

        server.channel_join(alice, "#a").unwrap();
        server.channel_join(alice, "#b").unwrap();
        server.channel_join(bob, "#a").unwrap();
        server.channel_join(bob, "#b").unwrap();
        server.channel_join(carol, "#b").unwrap();
        for id in [alice, bob, carol, dave] {
            drain(&mut server, &id);
        }

        assert_eq!(server.broadcast_nick("alice", "Alicia"), 2);

        let expected = vec![":Alice!alice@10.0.0.1 NICK :Alicia".to_string()];
        assert_eq!(drain(&mut server, &bob), expected);
        assert_eq!(drain(&mut server, &carol), expected);
        assert!(drain(&mut server, &alice).is_empty());
        assert!(drain(&mut server, &dave).is_empty());
    }

    #[test]
    fn test_quit_broadcast_reaches_shared_peer_once() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.2:1", "Bob");

        for channel in ["#a", "#b", "#c"] {
            server.channel_join(alice, channel).unwrap();
            server.channel_join(bob, channel).unwrap();
        }
        drain(&mut server, &bob);

        assert!(server.terminate_client(alice, "Gone fishing"));
        assert_eq!(drain(&mut server, &bob), vec![":Alice!alice@10.0.0.1 QUIT :Gone fishing"]);

        // Alice's departure leaves Bob alone in each channel
        for channel in ["#a", "#b", "#c"] {
            let members: Vec<_> = server.channel(channel).unwrap().members().copied().collect();
            assert_eq!(members, vec![bob]);
        }
    }

    #[test]
    fn test_terminate_cleans_up_and_is_idempotent() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        server.channel_join(alice, "#solo").unwrap();
        server.take_departed();

        assert!(server.terminate_client(alice, "Connection closed"));
        assert!(!server.terminate_client(alice, "Connection closed"));
        assert!(!server.close_link(alice, "Ping timeout: 61 seconds"));

        assert!(!server.contains_client(&alice));
        assert!(server.nick_available("alice"));
        assert!(!server.channel_exists("#solo"));

        let departed = server.take_departed();
        assert_eq!(departed.len(), 1);
        assert_eq!(departed[0].id, alice);
    }

    #[test]
    fn test_close_link_sends_error_line() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        drain(&mut server, &alice);

        assert!(server.close_link(alice, "Ping timeout: 60 seconds"));
        let departed = server.take_departed();
        assert_eq!(
            String::from_utf8(departed[0].pending.clone()).unwrap(),
            "ERROR :Closing Link: 10.0.0.1 (Ping timeout: 60 seconds)\r\n"
        );
    }

    #[test]
    fn test_resolved_hostname_used_in_lines() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.2:1", "Bob");

        server.set_hostname(alice, None);
        server.private_message(alice, "Bob", "hi").unwrap();
        assert_eq!(drain(&mut server, &bob), vec![":Alice!alice@10.0.0.1 PRIVMSG Bob :hi"]);

        server.set_hostname(alice, Some("alice.example.net".to_string()));
        server.private_message(alice, "Bob", "hi").unwrap();
        assert_eq!(
            drain(&mut server, &bob),
            vec![":Alice!alice@alice.example.net PRIVMSG Bob :hi"]
        );

        server.close_link(alice, "Quit: bye");
        let departed = server.take_departed();
        assert!(String::from_utf8_lossy(&departed[0].pending)
            .ends_with("ERROR :Closing Link: alice.example.net (Quit: bye)\r\n"));

        // Results for departed clients are ignored
        server.set_hostname(alice, Some("late.example.net".to_string()));
        assert!(!server.contains_client(&alice));
    }

    #[test]
    fn test_liveness_first_ping_then_timeout() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let start = Instant::now();

        server.inactive_client_check(start);
        assert_eq!(drain(&mut server, &alice), vec!["PING :irc.test"]);
        let pong = server.client(&alice).unwrap().pong.unwrap();
        assert!(pong.pending);
        assert_eq!(pong.sent, Some(start));

        // Nothing happens before the frequency elapses
        server.inactive_client_check(start + Duration::from_secs(30));
        assert!(drain(&mut server, &alice).is_empty());

        server.inactive_client_check(start + Duration::from_secs(61));
        assert!(!server.contains_client(&alice));
        let departed = server.take_departed();
        let pending = String::from_utf8(departed[0].pending.clone()).unwrap();
        assert!(pending.contains("Ping timeout: 61 seconds"), "{}", pending);
    }

    #[test]
    fn test_liveness_pong_keeps_client() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let start = Instant::now();

        server.inactive_client_check(start);
        server.record_pong(alice);
        assert!(!server.client(&alice).unwrap().pong.unwrap().pending);

        server.inactive_client_check(start + Duration::from_secs(60));
        assert!(server.contains_client(&alice));
        let pong = server.client(&alice).unwrap().pong.unwrap();
        assert!(pong.pending);
        assert_eq!(pong.sent, Some(start + Duration::from_secs(60)));
        assert_eq!(drain(&mut server, &alice), vec!["PING :irc.test", "PING :irc.test"]);
    }

    #[test]
    fn test_unregistered_client_times_out() {
        let mut server = server();
        let start = Instant::now();
        let id = server.connect("10.0.0.9:4000".parse().unwrap(), start);

        server.inactive_client_check(start + Duration::from_secs(59));
        assert!(server.contains_client(&id));
        // Untracked clients are never pinged
        assert!(drain(&mut server, &id).is_empty());

        server.inactive_client_check(start + Duration::from_secs(60));
        assert!(!server.contains_client(&id));
    }

    #[test]
    fn test_terminate_clients_empties_registries() {
        let mut server = server();
        let alice = register(&mut server, "10.0.0.1:1", "Alice");
        let bob = register(&mut server, "10.0.0.2:1", "Bob");
        server.channel_join(alice, "#x").unwrap();
        server.channel_join(bob, "#x").unwrap();

        server.terminate_clients("Server shutting down");
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.channel_count(), 0);
        assert_eq!(server.take_departed().len(), 2);
        assert_eq!(server.stats().max_clients, 2);
    }
}
