//! Chat line codec: `[@tags ][:prefix ]COMMAND [params]*[ :trailing]`.

use std::fmt;

/// IRCv3 message tags, kept in first-seen order.
///
/// A repeated key overwrites the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    /// Parse the raw tag section (without the leading `@`).
    pub fn parse(raw: &str) -> Self {
        let mut tags = Self::default();
        for pair in raw.split(';') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, unescape_tag_value(value)),
                None => (pair, String::new()),
            };
            if !key.is_empty() {
                tags.insert(key, value);
            }
        }
        tags
    }

    /// Set `key`, replacing an existing value without moving it.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Value of `key` when present and non-empty.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: &Tags) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize with escaped values, without the leading `@`.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={}", escape_tag_value(v))
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::default();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// Undo IRCv3 tag-value escaping.
pub fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Apply IRCv3 tag-value escaping.
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => out.push_str("\\s"),
            ';' => out.push_str("\\:"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Message source: `name[!user][@host]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    /// Nick or server name.
    pub name: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    pub fn parse(raw: &str) -> Self {
        let (rest, host) = match raw.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (raw, None),
        };
        let (name, user) = match rest.split_once('!') {
            Some((name, user)) => (name.to_string(), Some(user.to_string())),
            None => (rest.to_string(), None),
        };
        Self { name, user, host }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// One parsed chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: Tags,
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse one line. Returns `None` when no command token can be found.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');

        let mut tags = Tags::default();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw, remainder) = stripped.split_once(' ')?;
            tags = Tags::parse(raw);
            rest = remainder.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, remainder) = stripped.split_once(' ')?;
            prefix = Some(Prefix::parse(raw));
            rest = remainder.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, remainder)) => (command, remainder),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, remainder)) => {
                    params.push(param.to_string());
                    rest = remainder;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Last parameter (the trailing one when present).
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// First parameter when it names a channel.
    pub fn channel(&self) -> Option<&str> {
        self.param(0).filter(|p| p.starts_with('#'))
    }

    /// Nick from the prefix.
    pub fn nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg_with_tags() {
        let msg = IrcMessage::parse("@id=123;user=foo :x!x@x PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.tags.get("id"), Some("123"));
        assert_eq!(msg.tags.get("user"), Some("foo"));
        assert_eq!(msg.tags.len(), 2);
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan".to_string(), "hello world".to_string()]);
        assert_eq!(
            msg.prefix,
            Some(Prefix { name: "x".into(), user: Some("x".into()), host: Some("x".into()) })
        );
        assert_eq!(msg.channel(), Some("#chan"));
    }

    #[test]
    fn test_parse_without_tags_or_prefix() {
        let msg = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert!(msg.tags.is_empty());
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_parse_numeric_with_middle_params() {
        let msg = IrcMessage::parse(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!\r\n").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["justinfan123".to_string(), "Welcome, GLHF!".to_string()]);
        assert_eq!(msg.nick(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_trailing_keeps_colons_and_spaces() {
        let msg = IrcMessage::parse(":a PRIVMSG #c ::) two  spaces").unwrap();
        assert_eq!(msg.trailing(), Some(":) two  spaces"));
    }

    #[test]
    fn test_duplicate_tags_last_wins_in_place() {
        let tags = Tags::parse("a=1;b=2;a=3");
        let collected: Vec<_> = tags.iter().collect();
        assert_eq!(collected, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_tag_value_escaping() {
        let tags = Tags::parse(r"system-msg=5\sgifts\:\snice\\;empty=;flag");
        assert_eq!(tags.get("system-msg"), Some(r"5 gifts; nice\"));
        assert_eq!(tags.get("empty"), Some(""));
        assert_eq!(tags.get("flag"), Some(""));
        assert_eq!(escape_tag_value("a b;c\\"), r"a\sb\:c\\");
        assert_eq!(unescape_tag_value(&escape_tag_value("line\r\nnext")), "line\r\nnext");
    }

    #[test]
    fn test_encode_tags() {
        let tags: Tags = [("reply-parent-msg-id", "abc"), ("reply-parent-msg-body", "hi there")]
            .into_iter()
            .collect();
        assert_eq!(tags.encode(), r"reply-parent-msg-id=abc;reply-parent-msg-body=hi\sthere");
    }

    #[test]
    fn test_unparseable_lines() {
        assert!(IrcMessage::parse("").is_none());
        assert!(IrcMessage::parse("   ").is_none());
        assert!(IrcMessage::parse("@only-tags").is_none());
        assert!(IrcMessage::parse(":prefix-only").is_none());
    }

    #[test]
    fn test_prefix_server_name() {
        let prefix = Prefix::parse("tmi.twitch.tv");
        assert_eq!(prefix.name, "tmi.twitch.tv");
        assert!(prefix.user.is_none());
        assert_eq!(Prefix::parse("n!u@h").to_string(), "n!u@h");
    }
}
