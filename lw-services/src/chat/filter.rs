//! Block list and muted-word filtering for chat messages.

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use lw_core::config::ChatConfig;

use super::events::ChatMessage;

enum MutedWord {
    Pattern(Regex),
    Substring(String),
}

impl MutedWord {
    fn matches(&self, body: &str, lowered: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(body),
            Self::Substring(word) => lowered.contains(word.as_str()),
        }
    }
}

/// Decides whether an inbound chat message is shown.
///
/// A blocked author is hidden unless they moderate or own the channel. Muted
/// words are checked independently of the author.
pub struct MessageFilter {
    blocked: HashSet<String>,
    muted: Vec<MutedWord>,
}

impl MessageFilter {
    pub fn new<B, M>(blocked_users: B, muted_words: M, whole_word: bool) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let blocked = blocked_users
            .into_iter()
            .map(|u| u.as_ref().trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .collect();

        let muted = muted_words
            .into_iter()
            .filter_map(|w| {
                let word = w.as_ref().trim();
                if word.is_empty() {
                    return None;
                }
                if !whole_word {
                    return Some(MutedWord::Substring(word.to_lowercase()));
                }
                let pattern = format!(r"(?i)(?:^|[^\w]){}(?:[^\w]|$)", regex::escape(word));
                match Regex::new(&pattern) {
                    Ok(re) => Some(MutedWord::Pattern(re)),
                    Err(e) => {
                        warn!("muted word {word:?} falls back to substring matching: {e}");
                        Some(MutedWord::Substring(word.to_lowercase()))
                    }
                }
            })
            .collect();

        Self { blocked, muted }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(&config.blocked_users, &config.muted_words, config.match_whole_word)
    }

    /// Whether `message` passes the filter.
    pub fn allows(&self, message: &ChatMessage) -> bool {
        !self.is_blocked(message) && !self.is_muted(&message.body)
    }

    fn is_blocked(&self, message: &ChatMessage) -> bool {
        if !self.blocked.contains(&message.user_login.to_lowercase()) {
            return false;
        }
        !(message.is_moderator() || message.is_broadcaster())
    }

    fn is_muted(&self, body: &str) -> bool {
        if self.muted.is_empty() {
            return false;
        }
        let lowered = body.to_lowercase();
        self.muted.iter().any(|w| w.matches(body, &lowered))
    }
}
