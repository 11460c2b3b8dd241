//! IRC numeric replies as defined in RFC 1459

use crate::{Message, MessageType, Prefix};

/// IRC numeric reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NumericReply {
    // Connection registration
    RplWelcome = 1,
    RplYourHost = 2,
    RplCreated = 3,
    RplMyInfo = 4,

    // LUSERS
    RplLuserClient = 251,
    RplLuserChannels = 254,
    RplLuserMe = 255,
    RplLocalUsers = 265,
    RplGlobalUsers = 266,

    // Channel listing
    RplNamReply = 353,
    RplEndOfNames = 366,

    // Errors
    ErrNoSuchNick = 401,
    ErrNoSuchChannel = 403,
    ErrCannotSendToChan = 404,
    ErrNoRecipient = 411,
    ErrNoTextToSend = 412,
    ErrUnknownCommand = 421,
    ErrNoNicknameGiven = 431,
    ErrErroneousNickname = 432,
    ErrNicknameInUse = 433,
    ErrNotOnChannel = 442,
    ErrNotRegistered = 451,
    ErrNeedMoreParams = 461,
    ErrAlreadyRegistered = 462,
}

impl NumericReply {
    /// Three-digit code as sent on the wire
    pub fn code(&self) -> String {
        format!("{:03}", *self as u16)
    }

    /// Build the reply sent by `server` to `target`
    pub fn reply(&self, server: &str, target: &str, params: Vec<String>) -> Message {
        let mut all_params = vec![target.to_string()];
        all_params.extend(params);

        Message::with_prefix(
            Prefix::Server(server.to_string()),
            MessageType::Custom(self.code()),
            all_params,
        )
    }
}

/// Common numeric replies
impl NumericReply {
    /// RPL_WELCOME
    pub fn welcome(server: &str, nick: &str, identifier: &str) -> Message {
        Self::RplWelcome.reply(
            server,
            nick,
            vec![format!("Welcome to the Internet Relay Network {}", identifier)],
        )
    }

    /// RPL_YOURHOST
    pub fn your_host(server: &str, nick: &str, version: &str) -> Message {
        Self::RplYourHost.reply(
            server,
            nick,
            vec![format!("Your host is {}, running version {}", server, version)],
        )
    }

    /// RPL_CREATED
    pub fn created(server: &str, nick: &str, date: &str) -> Message {
        Self::RplCreated.reply(server, nick, vec![format!("This server was created {}", date)])
    }

    /// RPL_MYINFO
    pub fn my_info(server: &str, nick: &str, version: &str) -> Message {
        Self::RplMyInfo.reply(
            server,
            nick,
            vec![server.to_string(), version.to_string(), "o".to_string(), "n".to_string()],
        )
    }

    /// RPL_LUSERCLIENT
    pub fn luser_client(server: &str, nick: &str, users: usize) -> Message {
        Self::RplLuserClient.reply(
            server,
            nick,
            vec![format!("There are {} users and 0 invisible on 1 servers", users)],
        )
    }

    /// RPL_LUSERCHANNELS
    pub fn luser_channels(server: &str, nick: &str, channels: usize) -> Message {
        Self::RplLuserChannels.reply(
            server,
            nick,
            vec![channels.to_string(), "channels formed".to_string()],
        )
    }

    /// RPL_LUSERME
    pub fn luser_me(server: &str, nick: &str, clients: usize) -> Message {
        Self::RplLuserMe.reply(
            server,
            nick,
            vec![format!("I have {} clients and 0 servers", clients)],
        )
    }

    /// RPL_LOCALUSERS
    pub fn local_users(server: &str, nick: &str, current: usize, max: usize) -> Message {
        Self::RplLocalUsers.reply(
            server,
            nick,
            vec![
                current.to_string(),
                max.to_string(),
                format!("Current local users {}, max {}", current, max),
            ],
        )
    }

    /// RPL_GLOBALUSERS
    pub fn global_users(server: &str, nick: &str, current: usize, max: usize) -> Message {
        Self::RplGlobalUsers.reply(
            server,
            nick,
            vec![
                current.to_string(),
                max.to_string(),
                format!("Current global users {}, max {}", current, max),
            ],
        )
    }

    /// RPL_NAMREPLY
    pub fn names(server: &str, nick: &str, channel: &str, members: &[String]) -> Message {
        Self::RplNamReply.reply(
            server,
            nick,
            vec!["=".to_string(), channel.to_string(), members.join(" ")],
        )
    }

    /// RPL_ENDOFNAMES
    pub fn end_of_names(server: &str, nick: &str, channel: &str) -> Message {
        Self::RplEndOfNames.reply(
            server,
            nick,
            vec![channel.to_string(), "End of /NAMES list".to_string()],
        )
    }

    /// ERR_NOSUCHNICK
    pub fn no_such_nick(server: &str, nick: &str, target: &str) -> Message {
        Self::ErrNoSuchNick.reply(
            server,
            nick,
            vec![target.to_string(), "No such nick/channel".to_string()],
        )
    }

    /// ERR_NOSUCHCHANNEL
    pub fn no_such_channel(server: &str, nick: &str, channel: &str) -> Message {
        Self::ErrNoSuchChannel.reply(
            server,
            nick,
            vec![channel.to_string(), "No such channel".to_string()],
        )
    }

    /// ERR_CANNOTSENDTOCHAN
    pub fn cannot_send_to_channel(server: &str, nick: &str, channel: &str) -> Message {
        Self::ErrCannotSendToChan.reply(
            server,
            nick,
            vec![channel.to_string(), "Cannot send to channel".to_string()],
        )
    }

    /// ERR_NORECIPIENT
    pub fn no_recipient(server: &str, nick: &str, command: &str) -> Message {
        Self::ErrNoRecipient.reply(
            server,
            nick,
            vec![format!("No recipient given ({})", command)],
        )
    }

    /// ERR_NOTEXTTOSEND
    pub fn no_text_to_send(server: &str, nick: &str) -> Message {
        Self::ErrNoTextToSend.reply(server, nick, vec!["No text to send".to_string()])
    }

    /// ERR_UNKNOWNCOMMAND
    pub fn unknown_command(server: &str, nick: &str, command: &str) -> Message {
        Self::ErrUnknownCommand.reply(
            server,
            nick,
            vec![command.to_string(), "Unknown command".to_string()],
        )
    }

    /// ERR_NONICKNAMEGIVEN
    pub fn no_nickname_given(server: &str, nick: &str) -> Message {
        Self::ErrNoNicknameGiven.reply(server, nick, vec!["No nickname given".to_string()])
    }

    /// ERR_ERRONEUSNICKNAME
    pub fn erroneous_nickname(server: &str, nick: &str, attempted: &str) -> Message {
        Self::ErrErroneousNickname.reply(
            server,
            nick,
            vec![attempted.to_string(), "Erroneous nickname".to_string()],
        )
    }

    /// ERR_NICKNAMEINUSE
    pub fn nickname_in_use(server: &str, nick: &str, attempted: &str) -> Message {
        Self::ErrNicknameInUse.reply(
            server,
            nick,
            vec![attempted.to_string(), "Nickname is already in use".to_string()],
        )
    }

    /// ERR_NOTONCHANNEL
    pub fn not_on_channel(server: &str, nick: &str, channel: &str) -> Message {
        Self::ErrNotOnChannel.reply(
            server,
            nick,
            vec![channel.to_string(), "You're not on that channel".to_string()],
        )
    }

    /// ERR_NOTREGISTERED
    pub fn not_registered(server: &str) -> Message {
        Self::ErrNotRegistered.reply(server, "*", vec!["You have not registered".to_string()])
    }

    /// ERR_NEEDMOREPARAMS
    pub fn need_more_params(server: &str, nick: &str, command: &str) -> Message {
        Self::ErrNeedMoreParams.reply(
            server,
            nick,
            vec![command.to_string(), "Not enough parameters".to_string()],
        )
    }

    /// ERR_ALREADYREGISTRED
    pub fn already_registered(server: &str, nick: &str) -> Message {
        Self::ErrAlreadyRegistered.reply(
            server,
            nick,
            vec!["You may not reregister".to_string()],
        )
    }
}
