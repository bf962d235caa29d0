use std::sync::Arc;

use caya_chat::{
    ChatController, QUICK_EMOJIS, TranscriptEvent, quick_row_emojis, reaction_picker_emojis,
};
use caya_llm::{
    ChatRequest, LlmProvider, ProviderEventStream, ReplyEvent, RequestId, create_provider,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::{Command, HELP_TEXT};
use crate::render::{TranscriptPrinter, render_picker, render_transcript};
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Reply currently being fed into the controller.
struct ActiveReply {
    request_id: RequestId,
    stream: ProviderEventStream,
    worker: JoinHandle<()>,
}

/// Terminal front end state: the controller, the provider and what has been printed.
pub struct Session {
    controller: ChatController,
    provider: Arc<dyn LlmProvider>,
    settings: SettingsStore,
    transcript_rx: mpsc::UnboundedReceiver<TranscriptEvent>,
    printer: TranscriptPrinter,
    active: Option<ActiveReply>,
    output: String,
}

impl Session {
    pub fn new(
        mut controller: ChatController,
        provider: Arc<dyn LlmProvider>,
        settings: SettingsStore,
    ) -> Self {
        let transcript_rx = controller.subscribe();
        Self {
            controller,
            provider,
            settings,
            transcript_rx,
            printer: TranscriptPrinter::new(),
            active: None,
            output: String::new(),
        }
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn has_active_reply(&self) -> bool {
        self.active.is_some()
    }

    /// Renders the whole visible transcript, as on start and on `/open`.
    pub fn show_transcript(&mut self) {
        let transcript = render_transcript(self.controller.conversation());
        self.notice(&transcript);
    }

    pub fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Submit(text) => {
                let request = self.controller.submit(&text);
                self.start(request);
            }
            Command::Send => {
                let request = self.controller.submit_compose();
                self.start(request);
            }
            Command::React { index, glyph } => {
                if self.controller.react(index, &glyph).is_none() {
                    self.notice(&format!("no turn [{index}] to react to"));
                }
            }
            Command::Draft(text) => {
                self.controller.compose_mut().set_text(text);
                self.show_compose();
            }
            Command::Caret(selection) => {
                self.controller.compose_mut().set_selection(selection);
                self.show_compose();
            }
            Command::Emoji(glyph) => {
                self.controller.insert_emoji(&glyph);
                self.show_compose();
            }
            Command::TogglePicker => {
                let picker = if self.controller.compose_mut().toggle_emoji_picker() {
                    render_picker(&QUICK_EMOJIS)
                } else {
                    "emoji picker closed".to_string()
                };
                self.notice(&picker);
            }
            Command::Model(model) => self.switch_model(&model),
            Command::Open => {
                self.controller.open_view();
                self.drain_transcript();
                self.show_transcript();
            }
            Command::Close => {
                self.controller.close_view();
                self.notice("conversation hidden, /open to show it again");
            }
            Command::Help => {
                let help = format!(
                    "{HELP_TEXT}\nreactions: {}\nquick row: {}",
                    render_picker(reaction_picker_emojis()),
                    render_picker(quick_row_emojis())
                );
                self.notice(&help);
            }
            Command::Quit => return Flow::Quit,
        }
        self.drain_transcript();
        Flow::Continue
    }

    /// Next event of the reply in flight. Pending forever when there is none.
    pub async fn next_reply_event(&mut self) -> Option<ReplyEvent> {
        match self.active.as_mut() {
            Some(active) => active.stream.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Applies what [`Session::next_reply_event`] produced; `None` means the stream closed.
    pub fn on_reply_event(&mut self, event: Option<ReplyEvent>) {
        match event {
            Some(event) => {
                let terminal = event.is_terminal();
                self.controller.apply_event(event);
                if terminal {
                    self.active = None;
                }
            }
            None => {
                if let Some(active) = self.active.take() {
                    self.controller.stream_closed(active.request_id);
                }
            }
        }
        self.drain_transcript();
    }

    /// Waits for the reply in flight, if any, to resolve.
    pub async fn finish_reply(&mut self) {
        while self.active.is_some() {
            let event = self.next_reply_event().await;
            self.on_reply_event(event);
        }
    }

    /// Output accumulated since the last call.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Ends any streamed line so a prompt can follow.
    pub fn close_line(&mut self) {
        let newline = self.printer.close_line();
        self.output.push_str(&newline);
    }

    fn start(&mut self, request: Option<ChatRequest>) {
        let Some(request) = request else {
            if self.controller.is_busy() {
                self.notice("still waiting for the last reply");
            }
            return;
        };

        let request_id = request.id;
        if let Some(handle) = self.controller.start_reply(self.provider.as_ref(), request) {
            let worker = tokio::spawn(handle.worker);
            self.active = Some(ActiveReply {
                request_id,
                stream: handle.stream,
                worker,
            });
        }
    }

    fn switch_model(&mut self, model: &str) {
        let settings = match self.settings.update_model(model) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(%error, "failed to save model change");
                self.notice(&format!("could not save settings: {error}"));
                return;
            }
        };

        match create_provider(settings.to_provider_config()) {
            Ok(provider) => {
                self.provider = provider;
                self.notice(&format!("model set to {}", settings.model));
            }
            Err(error) => {
                tracing::warn!(%error, "failed to rebuild provider");
                self.notice(&format!("could not switch model: {error}"));
            }
        }
    }

    fn show_compose(&mut self) {
        let compose = self.controller.compose();
        let caret = compose
            .selection()
            .map(|selection| format!(" (caret {}..{})", selection.start, selection.end))
            .unwrap_or_default();
        let line = format!("draft: {}{caret}", compose.text());
        self.notice(&line);
    }

    fn drain_transcript(&mut self) {
        while let Ok(event) = self.transcript_rx.try_recv() {
            if !self.controller.is_open() && event.changes_turns() {
                continue;
            }
            if let Some(text) = self.printer.render(&event) {
                self.output.push_str(&text);
            }
        }
    }

    /// Prints one line outside the transcript.
    pub fn notice(&mut self, text: &str) {
        self.close_line();
        self.output.push_str(text);
        self.output.push('\n');
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            // Dropping the stream cancels the worker; abort covers a worker stuck in IO.
            active.worker.abort();
        }
    }
}
