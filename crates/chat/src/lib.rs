#![deny(unsafe_code)]

//! Conversation core for the Caya assistant.
//!
//! Holds the turn store, the reply state machine and the small pieces of view state
//! (compose field, reaction picker, scroll follow) a front end renders from.
pub mod compose;
/// Transcript change notifications for front ends.
pub mod events;
/// Turn store and reply lifecycle.
pub mod message;
pub mod persona;
pub mod reactions;
pub mod scroll_manager;

mod controller;

pub use compose::{ComposeField, Selection, insert_at_caret};
pub use controller::ChatController;
pub use events::TranscriptEvent;
pub use message::{
    ChatTurn, Conversation, Reactions, ReplyState, ReplyTransition, ReplyTransitionRejection,
    ReplyTransitionResult, Role, TurnIndex,
};
pub use persona::Persona;
pub use reactions::{
    QUICK_EMOJIS, QUICK_ROW_SIZE, REACTION_PICKER_SIZE, ReactionPicker, add_reaction,
    quick_row_emojis, reaction_picker_emojis,
};
pub use scroll_manager::ScrollManager;
