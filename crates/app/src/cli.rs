use std::path::{Path, PathBuf};

use caya_chat::ChatController;
use caya_llm::create_provider;
use clap::Parser;
use snafu::{ResultExt, ensure};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::command::Command;
use crate::error::{
    AppResult, EmptyPromptSnafu, ProviderSnafu, ReadInputSnafu, ReplyFailedSnafu, WriteOutputSnafu,
};
use crate::session::{Flow, Session};
use crate::settings::SettingsStore;
use crate::welcome::{WELCOME_ENV, default_marker_path, force_requested, init_welcome_gate};

#[derive(Debug, Parser)]
#[command(name = "caya", about = "Chat with Caya from the terminal")]
pub struct Args {
    /// Show the first-run welcome again
    #[arg(long)]
    pub welcome: bool,

    /// Settings file (defaults to <config dir>/caya/settings.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Send one message, print the reply and exit
    #[arg(short = 'p', long = "print")]
    pub print: Option<String>,
}

pub async fn run(args: Args) -> AppResult<()> {
    let store = match args.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = store.settings();
    tracing::debug!(
        api_base = settings.effective_api_base(),
        mode = %settings.mode,
        model = %settings.model,
        "loaded settings"
    );

    let provider = create_provider(settings.to_provider_config()).context(ProviderSnafu {
        stage: "create-provider",
    })?;

    let mut persona = settings.persona();
    if args.print.is_none() {
        let config_dir = store
            .config_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(SettingsStore::default_config_dir);
        let force = force_requested(args.welcome, std::env::var(WELCOME_ENV).ok().as_deref());
        match init_welcome_gate(default_marker_path(&config_dir), force)
            .and_then(|gate| gate.take_welcome())
        {
            Ok(Some(welcome)) => persona = persona.with_greeting(welcome),
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "welcome state unavailable"),
        }
    }

    let mut session = Session::new(ChatController::new(persona), provider, store);
    match args.print {
        Some(prompt) => print_once(&mut session, prompt, &mut tokio::io::stdout()).await,
        None => interactive(&mut session).await,
    }
}

async fn print_once<W: AsyncWrite + Unpin>(
    session: &mut Session,
    prompt: String,
    out: &mut W,
) -> AppResult<()> {
    ensure!(
        !prompt.trim().is_empty(),
        EmptyPromptSnafu {
            stage: "print-prompt"
        }
    );

    let turns_before = session.controller().conversation().len();
    session.handle(Command::Submit(prompt));
    session.finish_reply().await;

    // Anything past the submitted turn is the reply or its apology.
    let reply = session
        .controller()
        .conversation()
        .turns()
        .get(turns_before + 1..)
        .and_then(|turns| turns.last())
        .map(|turn| turn.content.clone())
        .unwrap_or_default();
    write_out(out, &format!("{reply}\n")).await?;

    let failure = session.controller().last_failure();
    ensure!(
        failure.is_none(),
        ReplyFailedSnafu {
            stage: "print-reply",
            message: failure.map(|failure| failure.message.clone()).unwrap_or_default(),
        }
    );
    Ok(())
}

async fn interactive(session: &mut Session) -> AppResult<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    session.show_transcript();
    session.notice("type a message, or /help");
    write_out(&mut stdout, &session.take_output()).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context(ReadInputSnafu { stage: "read-stdin" })?;
                let Some(line) = line else {
                    // Piped input ends before the last reply does.
                    session.finish_reply().await;
                    session.close_line();
                    write_out(&mut stdout, &session.take_output()).await?;
                    break;
                };
                match Command::parse(&line) {
                    Ok(command) => {
                        if session.handle(command) == Flow::Quit {
                            break;
                        }
                    }
                    Err(error) => session.notice(&error.to_string()),
                }
            }
            event = session.next_reply_event() => session.on_reply_event(event),
        }
        write_out(&mut stdout, &session.take_output()).await?;
    }

    Ok(())
}

async fn write_out<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> AppResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    writer
        .write_all(text.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "write-stdout",
        })?;
    writer.flush().await.context(WriteOutputSnafu {
        stage: "flush-stdout",
    })
}
