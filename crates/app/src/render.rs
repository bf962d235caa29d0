use caya_chat::{ChatTurn, Conversation, Role, TranscriptEvent, TurnIndex};

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "caya",
        Role::System => "system",
    }
}

pub fn render_turn(index: TurnIndex, turn: &ChatTurn) -> String {
    let mut line = format!("[{index}] {}: {}", role_label(turn.role), turn.content);
    let chips = turn.reaction_chips();
    if !chips.is_empty() {
        line.push_str(&format!("\n    {}", chips.join("  ")));
    }
    line
}

pub fn render_transcript(conversation: &Conversation) -> String {
    conversation
        .turns()
        .iter()
        .enumerate()
        .filter(|(_, turn)| turn.is_rendered())
        .map(|(position, turn)| render_turn(TurnIndex::new(position), turn))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered glyph row, as offered by `/react` and `/emoji`.
pub fn render_picker(glyphs: &[&str]) -> String {
    glyphs
        .iter()
        .enumerate()
        .map(|(position, glyph)| format!("{}:{glyph}", position + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns transcript events into terminal output, printing streamed growth as suffixes.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    /// Turn whose line is still open, with the text already printed for it.
    open_line: Option<(TurnIndex, String)>,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output for one event; `None` when nothing needs printing.
    pub fn render(&mut self, event: &TranscriptEvent) -> Option<String> {
        match event {
            TranscriptEvent::TurnAppended {
                index,
                role,
                content,
            } => {
                let mut output = self.close_line();
                output.push_str(&format!("[{index}] {}: {content}", role_label(*role)));
                self.open_line = Some((*index, content.clone()));
                Some(output)
            }
            TranscriptEvent::TurnPatched { index, content } => {
                let suffix = match &self.open_line {
                    Some((open, printed)) if open == index => {
                        content.strip_prefix(printed.as_str()).map(str::to_string)
                    }
                    _ => None,
                };
                let output = match suffix {
                    Some(suffix) => suffix,
                    None => {
                        let mut output = self.close_line();
                        output.push_str(&format!("[{index}] caya: {content}"));
                        output
                    }
                };
                self.open_line = Some((*index, content.clone()));
                (!output.is_empty()).then_some(output)
            }
            TranscriptEvent::ReactionsChanged { index, chips } => {
                let mut output = self.close_line();
                output.push_str(&format!("    [{index}] {}\n", chips.join("  ")));
                Some(output)
            }
            TranscriptEvent::BusyChanged { busy: false } => {
                let output = self.close_line();
                (!output.is_empty()).then_some(output)
            }
            TranscriptEvent::BusyChanged { busy: true } => None,
        }
    }

    /// Ends any open line, as before a prompt or notice.
    pub fn close_line(&mut self) -> String {
        match self.open_line.take() {
            Some(_) => "\n".to_string(),
            None => String::new(),
        }
    }
}
