#![deny(unsafe_code)]

//! Terminal front end for the Caya assistant.
pub mod cli;
pub mod command;
pub mod error;
pub mod render;
pub mod session;
/// Layered settings and their persistence.
pub mod settings;
/// First-run welcome state.
pub mod welcome;

pub use command::{Command, CommandError};
pub use error::{AppError, AppResult};
pub use session::{Flow, Session};
pub use settings::{ChatSettings, PersonaKind, SettingsError, SettingsStore};
pub use welcome::{WELCOME_TEXT, WelcomeError, WelcomeGate};
