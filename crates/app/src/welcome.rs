use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use snafu::{ResultExt, Snafu};

pub const WELCOME_TEXT: &str = "Hi, I'm Caya. Welcome to Cardbey! How can I help you today?";
pub const WELCOME_MARKER_FILE: &str = "welcomed";
/// Set to `force` to show the welcome again.
pub const WELCOME_ENV: &str = "CAYA_WELCOME";

static WELCOME_GATE: OnceLock<WelcomeGate> = OnceLock::new();

pub type WelcomeResult<T> = Result<T, WelcomeError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WelcomeError {
    #[snafu(display("failed to create welcome marker directory at {path:?} on `{stage}`: {source}"))]
    CreateMarkerDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write welcome marker at {path:?} on `{stage}`: {source}"))]
    WriteMarker {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to clear welcome marker at {path:?} on `{stage}`: {source}"))]
    ClearMarker {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Whether this user still has to be greeted, backed by a marker file.
#[derive(Debug)]
pub struct WelcomeGate {
    marker_path: PathBuf,
    due: AtomicBool,
}

impl WelcomeGate {
    /// Reads the marker once. `force` removes it first so the welcome shows again.
    pub fn open(marker_path: PathBuf, force: bool) -> WelcomeResult<Self> {
        if force {
            match std::fs::remove_file(&marker_path) {
                Ok(()) => tracing::info!(path = ?marker_path, "welcome marker cleared"),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(error).context(ClearMarkerSnafu {
                        stage: "force-welcome",
                        path: marker_path,
                    });
                }
            }
        }

        let due = !marker_path.exists();
        Ok(Self {
            marker_path,
            due: AtomicBool::new(due),
        })
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn is_due(&self) -> bool {
        self.due.load(Ordering::SeqCst)
    }

    pub fn mark_welcomed(&self) -> WelcomeResult<()> {
        if let Some(parent) = self.marker_path.parent() {
            std::fs::create_dir_all(parent).context(CreateMarkerDirSnafu {
                stage: "mark-welcomed",
                path: parent.to_path_buf(),
            })?;
        }
        std::fs::write(&self.marker_path, b"1").context(WriteMarkerSnafu {
            stage: "mark-welcomed",
            path: self.marker_path.clone(),
        })?;
        self.due.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the welcome text once, recording that it was shown.
    pub fn take_welcome(&self) -> WelcomeResult<Option<&'static str>> {
        if !self.due.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        if let Err(error) = self.mark_welcomed() {
            self.due.store(true, Ordering::SeqCst);
            return Err(error);
        }
        Ok(Some(WELCOME_TEXT))
    }
}

pub fn default_marker_path(config_dir: &Path) -> PathBuf {
    config_dir.join(WELCOME_MARKER_FILE)
}

/// `--welcome` or `CAYA_WELCOME=force`.
pub fn force_requested(flag: bool, env_value: Option<&str>) -> bool {
    flag || env_value.is_some_and(|value| value.trim().eq_ignore_ascii_case("force"))
}

/// Initializes the process-wide gate. Later calls return the first gate unchanged.
pub fn init_welcome_gate(marker_path: PathBuf, force: bool) -> WelcomeResult<&'static WelcomeGate> {
    if let Some(gate) = WELCOME_GATE.get() {
        tracing::debug!("welcome gate already initialized");
        return Ok(gate);
    }
    let gate = WelcomeGate::open(marker_path, force)?;
    Ok(WELCOME_GATE.get_or_init(|| gate))
}

pub fn welcome_gate() -> Option<&'static WelcomeGate> {
    WELCOME_GATE.get()
}
