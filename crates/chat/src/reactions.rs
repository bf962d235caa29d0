use crate::message::{Conversation, TurnIndex};

/// Quick emoji set shared by the reaction picker and the compose field.
pub const QUICK_EMOJIS: [&str; 10] = ["👍", "✅", "😊", "🎉", "❤️", "🤔", "🔥", "👏", "👌", "🙌"];

/// Glyphs offered when reacting to a turn.
pub const REACTION_PICKER_SIZE: usize = 7;
/// Glyphs shown inline under the compose field.
pub const QUICK_ROW_SIZE: usize = 6;

pub fn reaction_picker_emojis() -> &'static [&'static str] {
    &QUICK_EMOJIS[..REACTION_PICKER_SIZE]
}

pub fn quick_row_emojis() -> &'static [&'static str] {
    &QUICK_EMOJIS[..QUICK_ROW_SIZE]
}

/// Increments `glyph` on one turn, creating the counter at 1.
pub fn add_reaction(conversation: &mut Conversation, index: TurnIndex, glyph: &str) -> Option<u32> {
    let count = conversation.attach_reaction(index, glyph);
    if count.is_none() {
        tracing::debug!(%index, glyph, "reaction ignored");
    }
    count
}

/// The single reaction picker, addressed by the turn it is open for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionPicker {
    open_for: Option<TurnIndex>,
}

impl ReactionPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_for(&self) -> Option<TurnIndex> {
        self.open_for
    }

    pub fn is_open_for(&self, index: TurnIndex) -> bool {
        self.open_for == Some(index)
    }

    /// Opens the picker on `index`, closing it wherever else it was open.
    pub fn open(&mut self, index: TurnIndex) {
        self.open_for = Some(index);
    }

    pub fn toggle(&mut self, index: TurnIndex) {
        if self.is_open_for(index) {
            self.close();
        } else {
            self.open(index);
        }
    }

    pub fn close(&mut self) {
        self.open_for = None;
    }

    /// Applies the selected glyph to the turn the picker is open for and closes it.
    pub fn select(&mut self, conversation: &mut Conversation, glyph: &str) -> Option<u32> {
        let index = self.open_for.take()?;
        add_reaction(conversation, index, glyph)
    }
}
