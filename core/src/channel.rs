//! Channel membership and delivery

use crate::client::{ClientId, ClientMap};
use crate::NumericReply;
use std::collections::BTreeSet;

/// A named group of clients. Destroyed once its last member leaves.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel name as first created
    pub name: String,
    members: BTreeSet<ClientId>,
    destroyed: bool,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeSet::new(),
            destroyed: false,
        }
    }

    /// Registry key
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn members(&self) -> impl Iterator<Item = &ClientId> {
        self.members.iter()
    }

    pub fn has_member(&self, id: &ClientId) -> bool {
        self.members.contains(id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Add a client, announce the JOIN to every member and send the joiner
    /// the member list. Returns false if the client was already a member.
    pub fn join_client(&mut self, id: ClientId, clients: &mut ClientMap, server: &str) -> bool {
        let Some(client) = clients.get_mut(&id) else {
            return false;
        };
        if !self.members.insert(id) {
            return false;
        }
        client.channels.insert(self.key());
        let line = format!(":{} JOIN {}", client.identifier(), self.name);

        self.deliver(clients, None, &line);

        let nicks: Vec<String> = self
            .members
            .iter()
            .filter_map(|member| clients.get(member))
            .map(|member| member.display_nick().to_string())
            .collect();

        if let Some(client) = clients.get_mut(&id) {
            let nick = client.display_nick().to_string();
            client.send(NumericReply::names(server, &nick, &self.name, &nicks));
            client.send(NumericReply::end_of_names(server, &nick, &self.name));
        }

        true
    }

    /// Announce a PART to every member including the leaver, then remove it.
    /// Returns false (after replying 442) if the client was not a member.
    pub fn remove_client(
        &mut self,
        id: ClientId,
        clients: &mut ClientMap,
        server: &str,
        reason: Option<&str>,
    ) -> bool {
        let Some(client) = clients.get_mut(&id) else {
            return false;
        };

        if !self.members.contains(&id) {
            let nick = client.display_nick().to_string();
            client.send(NumericReply::not_on_channel(server, &nick, &self.name));
            return false;
        }

        let line = match reason {
            Some(reason) => format!(":{} PART {} :{}", client.identifier(), self.name, reason),
            None => format!(":{} PART {}", client.identifier(), self.name),
        };

        self.deliver(clients, None, &line);
        self.remove_silently(id, clients);
        true
    }

    /// Drop membership without notifying anyone. Used when the client is
    /// quitting and peers have already seen the QUIT.
    pub fn remove_silently(&mut self, id: ClientId, clients: &mut ClientMap) {
        self.members.remove(&id);
        if let Some(client) = clients.get_mut(&id) {
            client.channels.remove(&self.key());
        }
        if self.members.is_empty() {
            self.destroyed = true;
        }
    }

    /// Relay a PRIVMSG to every member except the sender
    pub fn handle_message(&self, sender: ClientId, clients: &mut ClientMap, server: &str, text: &str) {
        let Some(client) = clients.get_mut(&sender) else {
            return;
        };

        if !self.members.contains(&sender) {
            let nick = client.display_nick().to_string();
            client.send(NumericReply::cannot_send_to_channel(server, &nick, &self.name));
            return;
        }

        let line = format!(":{} PRIVMSG {} :{}", client.identifier(), self.name, text);
        self.deliver(clients, Some(sender), &line);
    }

    /// Relay a NOTICE to every member except the sender. NOTICE never
    /// generates error replies, so non-members are ignored.
    pub fn handle_notice(&self, sender: ClientId, clients: &mut ClientMap, text: &str) {
        let Some(client) = clients.get(&sender) else {
            return;
        };

        if !self.members.contains(&sender) {
            return;
        }

        let line = format!(":{} NOTICE {} :{}", client.identifier(), self.name, text);
        self.deliver(clients, Some(sender), &line);
    }

    fn deliver(&self, clients: &mut ClientMap, except: Option<ClientId>, line: &str) {
        for member in &self.members {
            if Some(*member) == except {
                continue;
            }
            if let Some(client) = clients.get_mut(member) {
                client.write(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::ServerConfig;
    use std::time::Instant;

    fn add_client(clients: &mut ClientMap, addr: &str, nick: &str) -> ClientId {
        let id = ClientId::new(addr.parse().unwrap());
        let mut client = Client::new(id, &ServerConfig::default(), Instant::now());
        client.nick = Some(nick.to_string());
        client.username = Some(nick.to_lowercase());
        clients.insert(id, client);
        id
    }

    fn drain(clients: &mut ClientMap, id: &ClientId) -> Vec<String> {
        clients.get_mut(id).unwrap().sendq.drain_lines()
    }

    #[test]
    fn test_join_keeps_both_sides_consistent() {
        let mut clients = ClientMap::new();
        let alice = add_client(&mut clients, "10.0.0.1:1000", "Alice");
        let mut channel = Channel::new("#Test");

        assert!(channel.join_client(alice, &mut clients, "irc.test"));
        assert!(!channel.join_client(alice, &mut clients, "irc.test"));

        assert!(channel.has_member(&alice));
        assert!(clients[&alice].channels.contains("#test"));

        let lines = drain(&mut clients, &alice);
        assert_eq!(lines[0], ":Alice!alice@10.0.0.1 JOIN #Test");
        assert_eq!(lines[1], ":irc.test 353 Alice = #Test Alice");
        assert_eq!(lines[2], ":irc.test 366 Alice #Test :End of /NAMES list");
    }

    #[test]
    fn test_message_skips_sender() {
        let mut clients = ClientMap::new();
        let alice = add_client(&mut clients, "10.0.0.1:1000", "Alice");
        let bob = add_client(&mut clients, "10.0.0.2:1000", "Bob");
        let mut channel = Channel::new("#test");
        channel.join_client(alice, &mut clients, "irc.test");
        channel.join_client(bob, &mut clients, "irc.test");
        drain(&mut clients, &alice);
        drain(&mut clients, &bob);

        channel.handle_message(alice, &mut clients, "irc.test", "hi all");
        assert!(drain(&mut clients, &alice).is_empty());
        assert_eq!(drain(&mut clients, &bob), vec![":Alice!alice@10.0.0.1 PRIVMSG #test :hi all"]);

        channel.handle_notice(bob, &mut clients, "psst");
        assert_eq!(drain(&mut clients, &alice), vec![":Bob!bob@10.0.0.2 NOTICE #test :psst"]);
    }

    #[test]
    fn test_non_member_cannot_send() {
        let mut clients = ClientMap::new();
        let alice = add_client(&mut clients, "10.0.0.1:1000", "Alice");
        let bob = add_client(&mut clients, "10.0.0.2:1000", "Bob");
        let mut channel = Channel::new("#test");
        channel.join_client(alice, &mut clients, "irc.test");
        drain(&mut clients, &alice);

        channel.handle_message(bob, &mut clients, "irc.test", "let me in");
        assert_eq!(
            drain(&mut clients, &bob),
            vec![":irc.test 404 Bob #test :Cannot send to channel"]
        );
        assert!(drain(&mut clients, &alice).is_empty());

        channel.handle_notice(bob, &mut clients, "quiet");
        assert!(drain(&mut clients, &bob).is_empty());
        assert!(drain(&mut clients, &alice).is_empty());
    }

    #[test]
    fn test_last_part_destroys_channel() {
        let mut clients = ClientMap::new();
        let alice = add_client(&mut clients, "10.0.0.1:1000", "Alice");
        let bob = add_client(&mut clients, "10.0.0.2:1000", "Bob");
        let mut channel = Channel::new("#test");
        channel.join_client(alice, &mut clients, "irc.test");
        channel.join_client(bob, &mut clients, "irc.test");
        drain(&mut clients, &alice);

        assert!(channel.remove_client(bob, &mut clients, "irc.test", Some("bye")));
        assert!(!channel.is_destroyed());
        assert!(!clients[&bob].in_channel("#test"));
        assert_eq!(drain(&mut clients, &alice), vec![":Bob!bob@10.0.0.2 PART #test :bye"]);

        assert!(channel.remove_client(alice, &mut clients, "irc.test", None));
        assert!(channel.is_destroyed());
        assert_eq!(channel.member_count(), 0);
    }

    #[test]
    fn test_part_when_not_member() {
        let mut clients = ClientMap::new();
        let alice = add_client(&mut clients, "10.0.0.1:1000", "Alice");
        let mut channel = Channel::new("#test");

        assert!(!channel.remove_client(alice, &mut clients, "irc.test", None));
        assert_eq!(
            drain(&mut clients, &alice),
            vec![":irc.test 442 Alice #test :You're not on that channel"]
        );
    }
}
