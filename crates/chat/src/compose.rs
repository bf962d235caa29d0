/// Caret selection in the compose field, as byte offsets into its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub const fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Splices `glyph` over the selected range and returns the new text and caret.
///
/// Without a selection the glyph is appended. Offsets past the end or inside a
/// multi-byte character are pulled back to the nearest character boundary, and a
/// reversed selection is treated as its mirror.
pub fn insert_at_caret(text: &str, selection: Option<Selection>, glyph: &str) -> (String, usize) {
    let (start, end) = match selection {
        Some(selection) => {
            let start = floor_char_boundary(text, selection.start);
            let end = floor_char_boundary(text, selection.end);
            (start.min(end), start.max(end))
        }
        None => (text.len(), text.len()),
    };

    let mut next = String::with_capacity(text.len() - (end - start) + glyph.len());
    next.push_str(&text[..start]);
    next.push_str(glyph);
    next.push_str(&text[end..]);
    (next, start + glyph.len())
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Draft text plus the state of the controls around it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeField {
    text: String,
    selection: Option<Selection>,
    emoji_picker_open: bool,
}

impl ComposeField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Replaces the draft; the caret moves to its end.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.selection = Some(Selection::caret(self.text.len()));
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    /// Forgets the caret, as when the field loses focus.
    pub fn blur(&mut self) {
        self.selection = None;
    }

    pub fn insert_emoji(&mut self, glyph: &str) {
        let (text, caret) = insert_at_caret(&self.text, self.selection, glyph);
        self.text = text;
        // An unfocused field stays unfocused after an append.
        if self.selection.is_some() {
            self.selection = Some(Selection::caret(caret));
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.selection = Some(Selection::caret(0));
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn is_emoji_picker_open(&self) -> bool {
        self.emoji_picker_open
    }

    pub fn toggle_emoji_picker(&mut self) -> bool {
        self.emoji_picker_open = !self.emoji_picker_open;
        self.emoji_picker_open
    }

    pub fn close_emoji_picker(&mut self) {
        self.emoji_picker_open = false;
    }
}
