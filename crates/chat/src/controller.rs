use caya_llm::{
    ChatRequest, FailureKind, LlmProvider, ProviderError, ProviderStreamHandle, ReplyEvent,
    ReplyEventPayload, ReplyFailure, RequestId,
};
use tokio::sync::mpsc;

use crate::compose::ComposeField;
use crate::events::TranscriptEvent;
use crate::message::{ChatTurn, Conversation, ReplyState, ReplyTransition, Role, TurnIndex};
use crate::persona::Persona;
use crate::reactions::{ReactionPicker, add_reaction};
use crate::scroll_manager::ScrollManager;

/// Bookkeeping for the reply currently being assembled.
#[derive(Debug, Clone)]
struct ActiveReply {
    request_id: RequestId,
    assistant_index: Option<TurnIndex>,
    accumulated: String,
}

/// Drives one conversation: submission guard, reply assembly and failure recovery.
///
/// Everything here is synchronous except [`ChatController::await_reply`] and
/// [`ChatController::send`], which only suspend while the provider is working.
pub struct ChatController {
    persona: Persona,
    conversation: Conversation,
    reply_state: ReplyState,
    active_reply: Option<ActiveReply>,
    next_request_id: u64,
    compose: ComposeField,
    reaction_picker: ReactionPicker,
    scroll: ScrollManager,
    open: bool,
    last_failure: Option<ReplyFailure>,
    transcript_tx: Option<mpsc::UnboundedSender<TranscriptEvent>>,
}

impl ChatController {
    /// Starts a conversation seeded with the persona's greeting.
    pub fn new(persona: Persona) -> Self {
        let conversation = Conversation::seeded(persona.greeting.clone());
        Self::with_conversation(persona, conversation)
    }

    pub fn with_conversation(persona: Persona, conversation: Conversation) -> Self {
        Self {
            persona,
            conversation,
            reply_state: ReplyState::Idle,
            active_reply: None,
            next_request_id: 1,
            compose: ComposeField::new(),
            reaction_picker: ReactionPicker::new(),
            scroll: ScrollManager::new(),
            open: true,
            last_failure: None,
            transcript_tx: None,
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn reply_state(&self) -> ReplyState {
        self.reply_state
    }

    pub fn is_busy(&self) -> bool {
        self.reply_state.is_awaiting()
    }

    pub fn compose(&self) -> &ComposeField {
        &self.compose
    }

    pub fn compose_mut(&mut self) -> &mut ComposeField {
        &mut self.compose
    }

    pub fn reaction_picker(&self) -> ReactionPicker {
        self.reaction_picker
    }

    pub fn scroll(&self) -> &ScrollManager {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollManager {
        &mut self.scroll
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Failure behind the most recent apology turn, if any.
    pub fn last_failure(&self) -> Option<&ReplyFailure> {
        self.last_failure.as_ref()
    }

    /// Routes transcript changes to a new receiver, replacing any earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptEvent> {
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        self.transcript_tx = Some(transcript_tx);
        transcript_rx
    }

    /// Accepts `input` as the next user turn and returns the request to send.
    ///
    /// Blank input, or input arriving while a reply is outstanding, is ignored.
    pub fn submit(&mut self, input: &str) -> Option<ChatRequest> {
        let content = input.trim();
        if content.is_empty() {
            return None;
        }

        let request_id = RequestId::new(self.next_request_id);
        let next_state = match self.reply_state.apply(ReplyTransition::Start(request_id)) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(?rejection, "submit ignored while a reply is outstanding");
                return None;
            }
        };
        self.next_request_id = self.next_request_id.saturating_add(1);

        self.compose.clear();
        self.compose.close_emoji_picker();
        self.append_turn(ChatTurn::user(content));

        self.reply_state = next_state;
        self.active_reply = Some(ActiveReply {
            request_id,
            assistant_index: None,
            accumulated: String::new(),
        });
        self.emit(TranscriptEvent::BusyChanged { busy: true });
        tracing::debug!(%request_id, turns = self.conversation.len(), "reply requested");

        Some(ChatRequest::new(
            request_id,
            self.conversation.request_messages(&self.persona.system_preamble),
        ))
    }

    /// Submits the compose field's draft. The draft is kept if the submit is ignored.
    pub fn submit_compose(&mut self) -> Option<ChatRequest> {
        let draft = self.compose.text().to_string();
        self.submit(&draft)
    }

    /// Asks `provider` for the reply to `request`.
    ///
    /// A provider that refuses the request resolves it as a failure immediately.
    pub fn start_reply(
        &mut self,
        provider: &dyn LlmProvider,
        request: ChatRequest,
    ) -> Option<ProviderStreamHandle> {
        let request_id = request.id;
        match provider.open_reply(request) {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::warn!(
                    %request_id,
                    provider_id = provider.id(),
                    error = %error,
                    "failed to open reply"
                );
                self.fail_request(request_id, ReplyFailure::from(&error));
                None
            }
        }
    }

    /// Applies one provider event. Returns `false` for events of a request that is no
    /// longer outstanding.
    pub fn apply_event(&mut self, event: ReplyEvent) -> bool {
        if !self.reply_state.accepts_event(event.request_id) {
            tracing::debug!(request_id = %event.request_id, "ignoring stale reply event");
            return false;
        }

        match event.payload {
            ReplyEventPayload::Delta(text) => {
                if !text.is_empty() {
                    self.grow_reply(|accumulated| accumulated.push_str(&text));
                }
            }
            ReplyEventPayload::Reply(text) => {
                self.grow_reply(|accumulated| *accumulated = text);
            }
            ReplyEventPayload::Done => self.finish_reply(event.request_id),
            ReplyEventPayload::Error(failure) => {
                self.fail_request(event.request_id, failure);
            }
        }
        true
    }

    /// Resolves an outstanding request as failed with a single apology turn.
    ///
    /// Text already streamed for the request stays ahead of the apology in the same turn.
    pub fn fail_request(&mut self, request_id: RequestId, failure: ReplyFailure) -> bool {
        let next_state = match self.reply_state.apply(ReplyTransition::Fail {
            request_id,
            message: failure.message.clone(),
        }) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(%request_id, ?rejection, "failure for an inactive request ignored");
                return false;
            }
        };

        tracing::warn!(%request_id, kind = ?failure.kind, error = %failure.message, "reply failed");
        let apology = self.persona.apology_turn(&failure.message);
        // Streamed text is rewritten in place; a failure adds one assistant turn at most.
        let partial = self.active_reply.as_ref().and_then(|active| {
            let index = active.assistant_index?;
            let kept = active.accumulated.trim_end();
            Some((index, kept.to_string()))
        });
        match partial {
            Some((index, kept)) if kept.trim().is_empty() => self.patch_turn(index, apology),
            Some((index, kept)) => self.patch_turn(index, format!("{kept}\n\n{apology}")),
            None => {
                self.append_turn(ChatTurn::assistant(apology));
            }
        }

        self.reply_state = next_state;
        self.active_reply = None;
        self.last_failure = Some(failure);
        self.emit(TranscriptEvent::BusyChanged { busy: false });
        true
    }

    /// Handles an event stream that ended without a terminal event.
    pub fn stream_closed(&mut self, request_id: RequestId) -> bool {
        if !self.reply_state.accepts_event(request_id) {
            return false;
        }
        let error = ProviderError::StreamClosed {
            stage: "await-reply",
            request_id,
        };
        self.fail_request(request_id, ReplyFailure::from(&error))
    }

    /// Drives the provider worker and applies its events until the request resolves.
    ///
    /// The controller is never left awaiting once this returns.
    pub async fn await_reply(&mut self, handle: ProviderStreamHandle) {
        let ProviderStreamHandle { mut stream, worker } = handle;
        let request_id = stream.request_id();

        let consume = async {
            while let Some(event) = stream.recv().await {
                let terminal = event.is_terminal();
                self.apply_event(event);
                if terminal {
                    break;
                }
            }
        };
        futures::join!(worker, consume);

        self.stream_closed(request_id);
    }

    /// Submits `input` and waits for the reply. Returns whether a request went out.
    pub async fn send(&mut self, provider: &dyn LlmProvider, input: &str) -> bool {
        let Some(request) = self.submit(input) else {
            return false;
        };
        if let Some(handle) = self.start_reply(provider, request) {
            self.await_reply(handle).await;
        }
        true
    }

    /// Reacts to a turn directly, closing any open reaction picker.
    pub fn react(&mut self, index: TurnIndex, glyph: &str) -> Option<u32> {
        self.reaction_picker.close();
        let count = add_reaction(&mut self.conversation, index, glyph)?;
        self.emit_reactions(index);
        Some(count)
    }

    pub fn toggle_reaction_picker(&mut self, index: TurnIndex) {
        if self.conversation.get(index).is_some() {
            self.reaction_picker.toggle(index);
        }
    }

    /// Applies `glyph` through the open reaction picker.
    pub fn select_reaction(&mut self, glyph: &str) -> Option<u32> {
        let index = self.reaction_picker.open_for()?;
        let count = self.reaction_picker.select(&mut self.conversation, glyph)?;
        self.emit_reactions(index);
        Some(count)
    }

    pub fn insert_emoji(&mut self, glyph: &str) {
        self.compose.insert_emoji(glyph);
    }

    pub fn open_view(&mut self) {
        self.open = true;
        self.scroll.request_scroll_to_bottom();
    }

    /// Hides the view. An outstanding reply keeps landing in the conversation.
    pub fn close_view(&mut self) {
        self.open = false;
        self.reaction_picker.close();
        self.compose.close_emoji_picker();
    }

    fn grow_reply(&mut self, update: impl FnOnce(&mut String)) {
        let Some(active) = self.active_reply.as_mut() else {
            return;
        };
        update(&mut active.accumulated);
        let content = active.accumulated.clone();
        let assistant_index = active.assistant_index;

        match assistant_index {
            Some(index) => self.patch_turn(index, content),
            None => {
                let index = self.append_turn(ChatTurn::assistant(content));
                if let Some(active) = self.active_reply.as_mut() {
                    active.assistant_index = Some(index);
                }
            }
        }
    }

    fn finish_reply(&mut self, request_id: RequestId) {
        let received = self
            .active_reply
            .as_ref()
            .is_some_and(|active| !active.accumulated.trim().is_empty());
        if !received {
            let error = ProviderError::NoReplyExtracted {
                stage: "finish-reply",
            };
            let failure = ReplyFailure {
                kind: FailureKind::NoReply,
                message: error.to_string(),
            };
            self.fail_request(request_id, failure);
            return;
        }

        match self.reply_state.apply(ReplyTransition::Complete(request_id)) {
            Ok(state) => {
                self.reply_state = state;
                self.active_reply = None;
                self.emit(TranscriptEvent::BusyChanged { busy: false });
                tracing::debug!(%request_id, turns = self.conversation.len(), "reply completed");
            }
            Err(rejection) => {
                tracing::debug!(
                    %request_id,
                    ?rejection,
                    "completion for an inactive request ignored"
                );
            }
        }
    }

    fn append_turn(&mut self, turn: ChatTurn) -> TurnIndex {
        let role: Role = turn.role;
        let content = turn.content.clone();
        let index = self.conversation.append(turn);
        self.scroll.request_scroll_to_bottom();
        self.emit(TranscriptEvent::TurnAppended {
            index,
            role,
            content,
        });
        index
    }

    fn patch_turn(&mut self, index: TurnIndex, content: String) {
        if self.conversation.patch(index, content.clone()) {
            self.scroll.request_scroll_to_bottom_if_following();
            self.emit(TranscriptEvent::TurnPatched { index, content });
        }
    }

    fn emit_reactions(&mut self, index: TurnIndex) {
        let chips = self
            .conversation
            .get(index)
            .map(ChatTurn::reaction_chips)
            .unwrap_or_default();
        self.emit(TranscriptEvent::ReactionsChanged { index, chips });
    }

    fn emit(&mut self, event: TranscriptEvent) {
        let Some(transcript_tx) = self.transcript_tx.as_ref() else {
            return;
        };
        if transcript_tx.send(event).is_err() {
            // Subscriber went away; stop publishing.
            self.transcript_tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use caya_llm::{ProviderResult, ProviderWorker, ReplyMode, make_event_stream};

    use super::*;
    use crate::compose::Selection;
    use crate::persona::{PANEL_APOLOGY, PANEL_GREETING};

    enum Script {
        Events(Vec<ReplyEventPayload>),
        Refuse,
    }

    /// Replays scripted payloads, one script per request.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn replying(payloads: Vec<ReplyEventPayload>) -> Self {
            Self::new(vec![Script::Events(payloads)])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn mode(&self) -> ReplyMode {
            ReplyMode::Streamed
        }

        fn open_reply(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let request_id = request.id;
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }

            let script = self
                .scripts
                .lock()
                .ok()
                .and_then(|mut scripts| scripts.pop_front())
                .unwrap_or(Script::Events(Vec::new()));
            let payloads = match script {
                Script::Events(payloads) => payloads,
                Script::Refuse => {
                    return Err(ProviderError::EmptyMessageSet {
                        stage: "scripted",
                        request_id,
                    });
                }
            };

            let (event_tx, stream, _cancel_rx) = make_event_stream(request_id);
            let worker: ProviderWorker = Box::pin(async move {
                for payload in payloads {
                    let _ = event_tx.send(ReplyEvent::new(request_id, payload));
                }
            });
            Ok(ProviderStreamHandle { stream, worker })
        }
    }

    fn delta(text: &str) -> ReplyEventPayload {
        ReplyEventPayload::Delta(text.to_string())
    }

    fn contents(controller: &ChatController) -> Vec<(Role, String)> {
        controller
            .conversation()
            .turns()
            .iter()
            .map(|turn| (turn.role, turn.content.clone()))
            .collect()
    }

    fn seeded() -> ChatController {
        ChatController::with_conversation(Persona::panel(), Conversation::seeded("Hi!"))
    }

    #[test]
    fn new_controller_starts_with_the_greeting() {
        let controller = ChatController::new(Persona::panel());
        assert_eq!(
            contents(&controller),
            vec![(Role::Assistant, PANEL_GREETING.to_string())]
        );
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_provider() {
        let provider = ScriptedProvider::replying(vec![delta("x"), ReplyEventPayload::Done]);
        let mut controller = seeded();

        assert!(!controller.send(&provider, "").await);
        assert!(!controller.send(&provider, "   \n\t").await);
        assert_eq!(controller.conversation().len(), 1);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn submit_while_awaiting_issues_no_second_request() {
        let provider = ScriptedProvider::new(vec![
            Script::Events(vec![delta("$5"), ReplyEventPayload::Done]),
            Script::Events(vec![delta("unused"), ReplyEventPayload::Done]),
        ]);
        let mut controller = seeded();
        let Some(request) = controller.submit("price?") else {
            panic!("first submit should go out");
        };
        let Some(handle) = controller.start_reply(&provider, request) else {
            panic!("provider should accept the request");
        };
        assert!(controller.is_busy());

        let len = controller.conversation().len();
        assert!(controller.submit("again?").is_none());
        assert!(!controller.send(&provider, "again?").await);
        assert_eq!(controller.conversation().len(), len);
        assert_eq!(provider.calls(), 1);

        controller.await_reply(handle).await;
        assert!(!controller.is_busy());
        assert_eq!(controller.conversation().turns()[2].content, "$5");
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn submit_builds_request_with_preamble_and_clears_compose() {
        let mut controller = seeded();
        controller.compose_mut().set_text("  price?  ");
        controller.compose_mut().toggle_emoji_picker();

        let Some(request) = controller.submit_compose() else {
            panic!("compose draft should submit");
        };
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[2].content, "price?");
        assert_eq!(controller.compose().text(), "");
        assert!(!controller.compose().is_emoji_picker_open());
        assert_eq!(
            controller.reply_state(),
            ReplyState::AwaitingReply(request.id)
        );
    }

    #[test]
    fn ignored_compose_submit_keeps_the_draft() {
        let mut controller = seeded();
        controller.submit("first");
        controller.compose_mut().set_text("second");

        assert!(controller.submit_compose().is_none());
        assert_eq!(controller.compose().text(), "second");
    }

    #[tokio::test]
    async fn buffered_reply_appends_one_assistant_turn() {
        let provider = ScriptedProvider::replying(vec![
            ReplyEventPayload::Reply("It's $49.90/mo.".to_string()),
            ReplyEventPayload::Done,
        ]);
        let mut controller = seeded();

        assert!(controller.send(&provider, "price?").await);
        assert_eq!(
            contents(&controller),
            vec![
                (Role::Assistant, "Hi!".to_string()),
                (Role::User, "price?".to_string()),
                (Role::Assistant, "It's $49.90/mo.".to_string()),
            ]
        );
        assert!(!controller.is_busy());
        assert!(controller.last_failure().is_none());
    }

    #[tokio::test]
    async fn streamed_chunks_patch_the_turn_in_order() {
        let provider = ScriptedProvider::replying(vec![
            delta("Hel"),
            delta("lo "),
            delta("world"),
            ReplyEventPayload::Done,
        ]);
        let mut controller = seeded();
        let mut transcript = controller.subscribe();

        controller.send(&provider, "greet me").await;

        let mut assistant_views = Vec::new();
        while let Ok(event) = transcript.try_recv() {
            match event {
                TranscriptEvent::TurnAppended {
                    role: Role::Assistant,
                    content,
                    ..
                }
                | TranscriptEvent::TurnPatched { content, .. } => assistant_views.push(content),
                _ => {}
            }
        }
        assert_eq!(assistant_views, vec!["Hel", "Hello ", "Hello world"]);
        assert_eq!(controller.conversation().len(), 3);
        assert_eq!(
            controller.conversation().last().map(|turn| turn.content.as_str()),
            Some("Hello world")
        );
    }

    #[tokio::test]
    async fn transport_failure_appends_exactly_one_apology() {
        let provider = ScriptedProvider::replying(vec![ReplyEventPayload::Error(
            ReplyFailure::transport("HTTP 500: server error"),
        )]);
        let mut controller = seeded();
        let mut transcript = controller.subscribe();

        controller.send(&provider, "price?").await;

        assert_eq!(controller.conversation().len(), 3);
        let apology = &controller.conversation().turns()[2];
        assert_eq!(apology.role, Role::Assistant);
        assert!(apology.content.starts_with(PANEL_APOLOGY));
        assert!(apology.content.contains("server error"));
        assert!(!controller.is_busy());

        let mut busy_flags = Vec::new();
        while let Ok(event) = transcript.try_recv() {
            if let TranscriptEvent::BusyChanged { busy } = event {
                busy_flags.push(busy);
            }
        }
        assert_eq!(busy_flags, vec![true, false]);
    }

    #[tokio::test]
    async fn empty_reply_becomes_a_no_reply_apology() {
        let provider = ScriptedProvider::replying(vec![ReplyEventPayload::Done]);
        let mut controller = seeded();

        controller.send(&provider, "hello?").await;

        let last = controller.conversation().last().map(|turn| turn.content.clone());
        assert!(last.is_some_and(|content| content.contains("Empty reply from server")));
        assert_eq!(
            controller.last_failure().map(|failure| failure.kind),
            Some(FailureKind::NoReply)
        );
        assert_eq!(controller.conversation().len(), 3);
    }

    #[tokio::test]
    async fn blank_streamed_reply_is_replaced_by_the_apology() {
        let provider = ScriptedProvider::replying(vec![delta("  "), ReplyEventPayload::Done]);
        let mut controller = seeded();

        controller.send(&provider, "hello?").await;

        assert_eq!(controller.conversation().len(), 3);
        assert!(controller.conversation().turns()[2].content.starts_with(PANEL_APOLOGY));
    }

    #[tokio::test]
    async fn failure_after_partial_content_becomes_one_apology_turn() {
        let provider = ScriptedProvider::replying(vec![
            delta("Half an ans"),
            ReplyEventPayload::Error(ReplyFailure::transport("connection reset")),
        ]);
        let mut controller = seeded();
        let mut transcript = controller.subscribe();

        controller.send(&provider, "explain").await;

        let turns = controller.conversation().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].role, Role::Assistant);
        assert!(turns[2].content.starts_with("Half an ans\n\n"));
        assert!(turns[2].content.contains(PANEL_APOLOGY));
        assert!(turns[2].content.ends_with("(connection reset)"));
        assert!(!controller.is_busy());

        let mut assistant_appends = 0;
        while let Ok(event) = transcript.try_recv() {
            if let TranscriptEvent::TurnAppended {
                role: Role::Assistant,
                ..
            } = event
            {
                assistant_appends += 1;
            }
        }
        assert_eq!(assistant_appends, 1);
    }

    #[tokio::test]
    async fn stream_without_terminal_event_releases_busy() {
        let provider = ScriptedProvider::replying(vec![delta("dangling")]);
        let mut controller = seeded();

        controller.send(&provider, "hi").await;

        assert!(!controller.is_busy());
        let turns = controller.conversation().turns();
        assert_eq!(turns.len(), 3);
        assert!(turns[2].content.starts_with("dangling\n\n"));
        assert!(turns[2].content.contains(PANEL_APOLOGY));
        assert_eq!(
            controller.last_failure().map(|failure| failure.kind),
            Some(FailureKind::Transport)
        );
    }

    #[tokio::test]
    async fn refused_request_resolves_as_failure() {
        let provider = ScriptedProvider::new(vec![Script::Refuse]);
        let mut controller = seeded();

        assert!(controller.send(&provider, "hi").await);
        assert_eq!(provider.calls(), 1);
        assert_eq!(controller.conversation().len(), 3);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn follow_up_request_carries_the_whole_history() {
        let provider = ScriptedProvider::new(vec![
            Script::Events(vec![delta("first answer"), ReplyEventPayload::Done]),
            Script::Events(vec![delta("second answer"), ReplyEventPayload::Done]),
        ]);
        let mut controller = seeded();

        controller.send(&provider, "one").await;
        controller.send(&provider, "two").await;

        let requests = provider.requests.lock().map(|requests| requests.clone());
        let Ok(requests) = requests else {
            panic!("request log poisoned");
        };
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].id, requests[1].id);
        let second: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(
            second,
            vec![
                crate::persona::SYSTEM_PREAMBLE,
                "Hi!",
                "one",
                "first answer",
                "two"
            ]
        );
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut controller = seeded();
        let Some(request) = controller.submit("hi") else {
            panic!("submit should be accepted");
        };
        let stale = RequestId::new(request.id.0 + 40);

        assert!(!controller.apply_event(ReplyEvent::new(stale, delta("nope"))));
        assert!(controller.apply_event(ReplyEvent::new(request.id, delta("yes"))));
        assert!(controller.apply_event(ReplyEvent::new(request.id, ReplyEventPayload::Done)));
        assert!(!controller.apply_event(ReplyEvent::new(request.id, ReplyEventPayload::Done)));
        assert_eq!(
            controller.conversation().last().map(|turn| turn.content.as_str()),
            Some("yes")
        );
    }

    #[test]
    fn reply_lands_while_the_view_is_closed() {
        let mut controller = seeded();
        let Some(request) = controller.submit("hi") else {
            panic!("submit should be accepted");
        };

        controller.close_view();
        controller.apply_event(ReplyEvent::new(request.id, delta("still here")));
        controller.apply_event(ReplyEvent::new(request.id, ReplyEventPayload::Done));
        assert!(!controller.is_open());

        controller.open_view();
        assert!(controller.scroll_mut().take_pending_scroll());
        assert_eq!(
            controller.conversation().last().map(|turn| turn.content.as_str()),
            Some("still here")
        );
    }

    #[test]
    fn appended_turns_request_a_scroll() {
        let mut controller = seeded();
        controller.scroll_mut().observe_viewport(0.0, 100.0);
        controller.scroll_mut().observe_viewport(0.0, 100.0);
        assert!(controller.scroll_mut().take_pending_scroll());

        controller.submit("hi");
        assert!(controller.scroll().has_pending_scroll());
    }

    #[test]
    fn reactions_go_through_the_picker() {
        let mut controller = seeded();
        let mut transcript = controller.subscribe();

        controller.toggle_reaction_picker(TurnIndex::new(0));
        assert_eq!(controller.select_reaction("👍"), Some(1));
        assert_eq!(controller.reaction_picker().open_for(), None);
        assert_eq!(controller.react(TurnIndex::new(0), "👍"), Some(2));
        assert_eq!(controller.react(TurnIndex::new(9), "👍"), None);

        controller.toggle_reaction_picker(TurnIndex::new(9));
        assert_eq!(controller.reaction_picker().open_for(), None);

        let mut chips = Vec::new();
        while let Ok(event) = transcript.try_recv() {
            if let TranscriptEvent::ReactionsChanged { chips: next, .. } = event {
                chips.push(next);
            }
        }
        assert_eq!(chips, vec![vec!["👍".to_string()], vec!["👍 2".to_string()]]);
    }

    #[test]
    fn emoji_lands_at_the_compose_caret() {
        let mut controller = seeded();
        controller.compose_mut().set_text("abcdef");
        controller.compose_mut().set_selection(Selection::caret(3));
        controller.insert_emoji("🎉");

        assert_eq!(controller.compose().text(), "abc🎉def");
        assert_eq!(
            controller.compose().selection(),
            Some(Selection::caret(3 + "🎉".len()))
        );
    }
}
