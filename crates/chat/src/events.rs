use crate::message::{Role, TurnIndex};

/// Emitted whenever the transcript a view shows has changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    TurnAppended {
        index: TurnIndex,
        role: Role,
        content: String,
    },
    /// Streaming growth of an assistant turn; `content` is the full new text.
    TurnPatched { index: TurnIndex, content: String },
    ReactionsChanged { index: TurnIndex, chips: Vec<String> },
    BusyChanged { busy: bool },
}

impl TranscriptEvent {
    /// Whether the turn list itself (not just a flag) changed.
    pub fn changes_turns(&self) -> bool {
        !matches!(self, Self::BusyChanged { .. })
    }
}
