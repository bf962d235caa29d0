use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "grok-2-1212";
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";
pub const DEFAULT_WIDGET_PATH: &str = "/api/caya";

/// How replies are fetched from the chat endpoint.
///
/// A deployment picks one mode; the controller never switches mid-conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// `{model, stream: false, messages}` to the chat path, one JSON body back.
    #[default]
    Buffered,
    /// `{model, stream: true, messages}` to the chat path, raw text chunks back.
    Streamed,
    /// `{messages}` to the widget path, raw text chunks back.
    Widget,
}

impl ReplyMode {
    pub fn is_streamed(self) -> bool {
        !matches!(self, Self::Buffered)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Streamed => "streamed",
            Self::Widget => "widget",
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "streamed" | "stream" => Ok(Self::Streamed),
            "widget" => Ok(Self::Widget),
            other => Err(format!("unknown reply mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_mode_parses_aliases_case_insensitively() {
        assert_eq!("Buffered".parse::<ReplyMode>(), Ok(ReplyMode::Buffered));
        assert_eq!(" stream ".parse::<ReplyMode>(), Ok(ReplyMode::Streamed));
        assert_eq!("WIDGET".parse::<ReplyMode>(), Ok(ReplyMode::Widget));
        assert!("sse".parse::<ReplyMode>().is_err());
    }

    #[test]
    fn only_buffered_mode_is_not_streamed() {
        assert!(!ReplyMode::Buffered.is_streamed());
        assert!(ReplyMode::Streamed.is_streamed());
        assert!(ReplyMode::Widget.is_streamed());
    }
}
