//! Typed chat events built from parsed lines.

use chrono::{DateTime, TimeZone, Utc};

use lw_core::constants::chat as consts;

use super::parser::{IrcMessage, Tags};

/// One `name/version` badge from the `badges` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub name: String,
    pub version: String,
}

/// Parse a `badges` tag value (`moderator/1,subscriber/12`).
pub fn parse_badges(raw: &str) -> Vec<Badge> {
    raw.split(',')
        .filter(|b| !b.is_empty())
        .map(|b| match b.split_once('/') {
            Some((name, version)) => Badge { name: name.to_string(), version: version.to_string() },
            None => Badge { name: b.to_string(), version: String::new() },
        })
        .collect()
}

fn timestamp_from_tags(tags: &Tags) -> Option<DateTime<Utc>> {
    let millis = tags.get("tmi-sent-ts")?.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Strip the `\x01ACTION ...\x01` wrapper, reporting whether it was present.
pub fn decode_action(body: &str) -> (String, bool) {
    match body
        .strip_prefix("\u{1}ACTION ")
        .map(|rest| rest.strip_suffix('\u{1}').unwrap_or(rest))
    {
        Some(inner) => (inner.to_string(), true),
        None => (body.to_string(), false),
    }
}

/// An ordinary chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub channel: String,
    /// Server message id, when tagged.
    pub id: Option<String>,
    pub user_login: String,
    pub display_name: String,
    pub user_id: Option<String>,
    pub body: String,
    /// Sent as a `/me` action.
    pub is_action: bool,
    /// Echo of a message this client sent.
    pub is_self: bool,
    pub badges: Vec<Badge>,
    pub color: Option<String>,
    pub reply_parent_id: Option<String>,
    pub tags: Tags,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Build from a PRIVMSG line.
    pub fn from_privmsg(msg: &IrcMessage) -> Option<Self> {
        let channel = msg.channel()?.to_string();
        let (body, is_action) = decode_action(msg.param(1)?);
        let user_login = msg.nick().unwrap_or_default().to_string();
        Some(Self::from_tags(channel, user_login, body, is_action, msg.tags.clone()))
    }

    pub(crate) fn from_tags(
        channel: String,
        user_login: String,
        body: String,
        is_action: bool,
        tags: Tags,
    ) -> Self {
        let display_name = tags
            .get_non_empty("display-name")
            .map(str::to_string)
            .unwrap_or_else(|| user_login.clone());
        Self {
            channel,
            id: tags.get_non_empty("id").map(str::to_string),
            user_login,
            display_name,
            user_id: tags.get_non_empty("user-id").map(str::to_string),
            body,
            is_action,
            is_self: false,
            badges: tags.get("badges").map(parse_badges).unwrap_or_default(),
            color: tags.get_non_empty("color").map(str::to_string),
            reply_parent_id: tags.get_non_empty("reply-parent-msg-id").map(str::to_string),
            timestamp: timestamp_from_tags(&tags),
            tags,
        }
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }

    /// Moderator by badge or `mod=1` tag.
    pub fn is_moderator(&self) -> bool {
        self.has_badge("moderator") || self.tags.get("mod") == Some("1")
    }

    /// Owner of the channel the message was sent in.
    pub fn is_broadcaster(&self) -> bool {
        if self.has_badge("broadcaster") {
            return true;
        }
        if let (Some(user_id), Some(room_id)) = (&self.user_id, self.tags.get_non_empty("room-id")) {
            if user_id == room_id {
                return true;
            }
        }
        self.channel.trim_start_matches('#') == self.user_login.to_lowercase()
    }
}

/// Classification of a server NOTICE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The welcome-phrase notice.
    Welcome,
    /// Login rejected.
    AuthFailed,
    Other,
}

/// A server NOTICE.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotice {
    /// Channel, or `None` for connection-level notices.
    pub channel: Option<String>,
    pub message: String,
    /// `msg-id` tag.
    pub msg_id: Option<String>,
    pub kind: NoticeKind,
}

impl ServerNotice {
    pub fn from_line(msg: &IrcMessage) -> Self {
        let message = msg.trailing().unwrap_or_default().to_string();
        let kind = if message.contains(consts::WELCOME_PHRASE) {
            NoticeKind::Welcome
        } else if consts::AUTH_FAILURE_PHRASES.iter().any(|p| message.contains(p)) {
            NoticeKind::AuthFailed
        } else {
            NoticeKind::Other
        };
        Self {
            channel: msg.channel().map(str::to_string),
            msg_id: msg.tags.get_non_empty("msg-id").map(str::to_string),
            message,
            kind,
        }
    }
}

/// A USERNOTICE (subscriptions, raids and similar). Tags are kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct UserNotice {
    pub channel: String,
    pub msg_id: Option<String>,
    /// Optional user-supplied text.
    pub message: Option<String>,
    pub system_message: Option<String>,
    pub tags: Tags,
}

impl UserNotice {
    pub fn from_line(msg: &IrcMessage) -> Option<Self> {
        Some(Self {
            channel: msg.channel()?.to_string(),
            msg_id: msg.tags.get_non_empty("msg-id").map(str::to_string),
            message: msg.param(1).map(str::to_string),
            system_message: msg.tags.get_non_empty("system-msg").map(str::to_string),
            tags: msg.tags.clone(),
        })
    }
}

/// A CLEARCHAT: whole channel when `target` is `None`, otherwise one user.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearChat {
    pub channel: String,
    pub target: Option<String>,
    pub target_user_id: Option<String>,
    /// Timeout length; `None` with a target means a permanent ban.
    pub ban_duration_secs: Option<u64>,
}

impl ClearChat {
    pub fn from_line(msg: &IrcMessage) -> Option<Self> {
        Some(Self {
            channel: msg.channel()?.to_string(),
            target: msg.param(1).filter(|t| !t.is_empty()).map(str::to_string),
            target_user_id: msg.tags.get_non_empty("target-user-id").map(str::to_string),
            ban_duration_secs: msg.tags.get("ban-duration").and_then(|d| d.parse().ok()),
        })
    }

    pub fn is_channel_clear(&self) -> bool {
        self.target.is_none()
    }
}

/// A CLEARMSG: one message deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearMessage {
    pub channel: String,
    pub target_message_id: Option<String>,
    pub login: Option<String>,
    pub message: Option<String>,
}

impl ClearMessage {
    pub fn from_line(msg: &IrcMessage) -> Option<Self> {
        Some(Self {
            channel: msg.channel()?.to_string(),
            target_message_id: msg.tags.get_non_empty("target-msg-id").map(str::to_string),
            login: msg.tags.get_non_empty("login").map(str::to_string),
            message: msg.param(1).map(str::to_string),
        })
    }
}

/// A ROOMSTATE snapshot (or partial update) for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub channel: String,
    pub tags: Tags,
}

/// A USERSTATE for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct UserState {
    pub channel: String,
    pub tags: Tags,
}

/// A GLOBALUSERSTATE, sent once after login.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalUserState {
    pub tags: Tags,
}

/// Join or part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipKind {
    Join,
    Part,
}

/// A JOIN or PART confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipChange {
    pub kind: MembershipKind,
    pub channel: String,
    pub user: String,
}

impl MembershipChange {
    pub fn from_line(msg: &IrcMessage, kind: MembershipKind) -> Option<Self> {
        Some(Self {
            kind,
            channel: msg.channel()?.to_string(),
            user: msg.nick()?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> IrcMessage {
        IrcMessage::parse(line).unwrap()
    }

    #[test]
    fn test_privmsg_fields() {
        let msg = parse(
            "@badges=moderator/1,subscriber/12;color=#1E90FF;display-name=Alice;id=m1;\
             user-id=42;room-id=7;tmi-sent-ts=1700000000000 :alice!alice@alice PRIVMSG #foo :hi there",
        );
        let chat = ChatMessage::from_privmsg(&msg).unwrap();
        assert_eq!(chat.channel, "#foo");
        assert_eq!(chat.body, "hi there");
        assert_eq!(chat.display_name, "Alice");
        assert_eq!(chat.id.as_deref(), Some("m1"));
        assert_eq!(chat.color.as_deref(), Some("#1E90FF"));
        assert_eq!(chat.badges.len(), 2);
        assert!(chat.is_moderator());
        assert!(!chat.is_broadcaster());
        assert_eq!(chat.timestamp.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_action_decoding() {
        let msg = parse(":bob!bob@bob PRIVMSG #foo :\u{1}ACTION waves\u{1}");
        let chat = ChatMessage::from_privmsg(&msg).unwrap();
        assert!(chat.is_action);
        assert_eq!(chat.body, "waves");
        assert_eq!(chat.display_name, "bob");
    }

    #[test]
    fn test_broadcaster_detection() {
        let by_name = ChatMessage::from_privmsg(&parse(":foo!foo@foo PRIVMSG #foo :mine")).unwrap();
        assert!(by_name.is_broadcaster());

        let by_id = ChatMessage::from_privmsg(&parse(
            "@user-id=7;room-id=7 :renamed!renamed@renamed PRIVMSG #foo :mine",
        ))
        .unwrap();
        assert!(by_id.is_broadcaster());
    }

    #[test]
    fn test_notice_kinds() {
        let welcome = ServerNotice::from_line(&parse(":tmi.twitch.tv NOTICE * :Welcome, GLHF!"));
        assert_eq!(welcome.kind, NoticeKind::Welcome);
        assert!(welcome.channel.is_none());

        let failed = ServerNotice::from_line(&parse(":tmi.twitch.tv NOTICE * :Login authentication failed"));
        assert_eq!(failed.kind, NoticeKind::AuthFailed);

        let other = ServerNotice::from_line(&parse("@msg-id=slow_on :tmi.twitch.tv NOTICE #foo :Slow mode"));
        assert_eq!(other.kind, NoticeKind::Other);
        assert_eq!(other.msg_id.as_deref(), Some("slow_on"));
        assert_eq!(other.channel.as_deref(), Some("#foo"));
    }

    #[test]
    fn test_clearchat_variants() {
        let all = ClearChat::from_line(&parse(":tmi.twitch.tv CLEARCHAT #foo")).unwrap();
        assert!(all.is_channel_clear());

        let timeout = ClearChat::from_line(&parse(
            "@ban-duration=600;target-user-id=9 :tmi.twitch.tv CLEARCHAT #foo :spammer",
        ))
        .unwrap();
        assert_eq!(timeout.target.as_deref(), Some("spammer"));
        assert_eq!(timeout.ban_duration_secs, Some(600));

        let ban = ClearChat::from_line(&parse(":tmi.twitch.tv CLEARCHAT #foo :spammer")).unwrap();
        assert_eq!(ban.ban_duration_secs, None);
    }

    #[test]
    fn test_usernotice_keeps_tags() {
        let notice = UserNotice::from_line(&parse(
            r"@msg-id=raid;msg-param-viewerCount=12;system-msg=12\sraiders :tmi.twitch.tv USERNOTICE #foo",
        ))
        .unwrap();
        assert_eq!(notice.msg_id.as_deref(), Some("raid"));
        assert_eq!(notice.system_message.as_deref(), Some("12 raiders"));
        assert_eq!(notice.tags.get("msg-param-viewerCount"), Some("12"));
        assert!(notice.message.is_none());
    }
}
