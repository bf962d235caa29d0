use std::borrow::Cow;

pub const PANEL_GREETING: &str = "Hi! I'm Caya. What would you like to set up first?";
pub const PANEL_APOLOGY: &str =
    "Sorry, I couldn't get a reply just now. Please try again in a moment.";
pub const WIDGET_GREETING: &str = "Hi! I'm Caya 🤖, your AI store companion. I can help you create a store from a menu, explain pricing, or fix a stuck generation. How can I help?";
pub const WIDGET_APOLOGY: &str = "Sorry, something went wrong.";
pub const SYSTEM_PREAMBLE: &str = "You are Caya, Cardbey's helpful AI assistant.";

/// Fixed copy an assistant surface speaks with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub greeting: Cow<'static, str>,
    /// Sent first in every request, never stored as a turn.
    pub system_preamble: Cow<'static, str>,
    pub apology: Cow<'static, str>,
}

impl Persona {
    /// The in-page assistant panel.
    pub fn panel() -> Self {
        Self {
            greeting: Cow::Borrowed(PANEL_GREETING),
            system_preamble: Cow::Borrowed(SYSTEM_PREAMBLE),
            apology: Cow::Borrowed(PANEL_APOLOGY),
        }
    }

    /// The floating store-companion widget.
    pub fn widget() -> Self {
        Self {
            greeting: Cow::Borrowed(WIDGET_GREETING),
            system_preamble: Cow::Borrowed(SYSTEM_PREAMBLE),
            apology: Cow::Borrowed(WIDGET_APOLOGY),
        }
    }

    pub fn with_greeting(mut self, greeting: impl Into<Cow<'static, str>>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Assistant turn shown in place of a reply that could not be produced.
    pub fn apology_turn(&self, error: &str) -> String {
        let error = error.trim();
        if error.is_empty() {
            return self.apology.to_string();
        }
        format!("{}\n\n({error})", self.apology)
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::panel()
    }
}
