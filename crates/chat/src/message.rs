use std::collections::BTreeMap;
use std::fmt;

pub use caya_llm::Role;
use caya_llm::{ProviderMessage, RequestId};

/// Position of one turn in the conversation.
///
/// Turns are never removed, so an index stays valid for the whole session and is the
/// identity used by reactions and streaming patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnIndex(pub usize);

impl TurnIndex {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TurnIndex {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Emoji glyph to a positive count.
pub type Reactions = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    /// `None` until the first reaction lands.
    pub reactions: Option<Reactions>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reactions: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// System turns are synthetic and never shown.
    pub fn is_rendered(&self) -> bool {
        !matches!(self.role, Role::System)
    }

    pub fn reaction_count(&self, glyph: &str) -> u32 {
        self.reactions
            .as_ref()
            .and_then(|reactions| reactions.get(glyph).copied())
            .unwrap_or(0)
    }

    /// Display chips: the glyph alone for a single reaction, `glyph count` otherwise.
    pub fn reaction_chips(&self) -> Vec<String> {
        self.reactions
            .iter()
            .flatten()
            .map(|(glyph, count)| {
                if *count > 1 {
                    format!("{glyph} {count}")
                } else {
                    glyph.clone()
                }
            })
            .collect()
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        ProviderMessage::new(self.role, self.content.clone())
    }
}

/// Ordered, append-only turn list for the active session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation holding one assistant greeting.
    pub fn seeded(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::assistant(greeting)],
        }
    }

    pub fn append(&mut self, turn: ChatTurn) -> TurnIndex {
        self.turns.push(turn);
        TurnIndex::new(self.turns.len() - 1)
    }

    /// Replaces the content of the final turn.
    pub fn patch_last(&mut self, content: impl Into<String>) -> Option<TurnIndex> {
        let index = self.turns.len().checked_sub(1)?;
        self.turns[index].content = content.into();
        Some(TurnIndex::new(index))
    }

    /// Replaces the content of one turn. Out-of-range indices leave the store untouched.
    pub fn patch(&mut self, index: TurnIndex, content: impl Into<String>) -> bool {
        match self.turns.get_mut(index.0) {
            Some(turn) => {
                turn.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Increments `glyph` on one turn and returns the new count.
    ///
    /// Out-of-range indices and blank glyphs are no-ops returning `None`.
    pub fn attach_reaction(&mut self, index: TurnIndex, glyph: &str) -> Option<u32> {
        let glyph = glyph.trim();
        if glyph.is_empty() {
            return None;
        }

        let turn = self.turns.get_mut(index.0)?;
        let count = turn
            .reactions
            .get_or_insert_with(Reactions::new)
            .entry(glyph.to_string())
            .or_insert(0);
        *count = count.saturating_add(1);
        Some(*count)
    }

    pub fn get(&self, index: TurnIndex) -> Option<&ChatTurn> {
        self.turns.get(index.0)
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Upstream payload: the preamble first, then every stored turn in order.
    ///
    /// The preamble is never stored; it only exists in the outgoing request.
    pub fn request_messages(&self, system_preamble: &str) -> Vec<ProviderMessage> {
        std::iter::once(ProviderMessage::new(Role::System, system_preamble))
            .chain(self.turns.iter().map(ChatTurn::to_provider_message))
            .collect()
    }
}

/// Reply lifecycle for the conversation. At most one request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    Idle,
    AwaitingReply(RequestId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTransition {
    Start(RequestId),
    Complete(RequestId),
    Fail { request_id: RequestId, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTransitionRejection {
    AlreadyAwaiting {
        active: RequestId,
        attempted: RequestId,
    },
    NoActiveRequest,
    RequestMismatch {
        active: RequestId,
        attempted: RequestId,
    },
}

pub type ReplyTransitionResult = Result<ReplyState, ReplyTransitionRejection>;

impl ReplyState {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitingReply(_))
    }

    pub fn active_request(&self) -> Option<RequestId> {
        match self {
            Self::AwaitingReply(request_id) => Some(*request_id),
            Self::Idle => None,
        }
    }

    /// True when an incoming event belongs to the outstanding request.
    pub fn accepts_event(&self, request_id: RequestId) -> bool {
        matches!(self, Self::AwaitingReply(active) if *active == request_id)
    }

    pub fn apply(&self, transition: ReplyTransition) -> ReplyTransitionResult {
        match transition {
            ReplyTransition::Start(request_id) => match self {
                Self::AwaitingReply(active) => Err(ReplyTransitionRejection::AlreadyAwaiting {
                    active: *active,
                    attempted: request_id,
                }),
                Self::Idle => Ok(Self::AwaitingReply(request_id)),
            },
            ReplyTransition::Complete(request_id)
            | ReplyTransition::Fail { request_id, .. } => match self {
                Self::AwaitingReply(active) if *active == request_id => Ok(Self::Idle),
                Self::AwaitingReply(active) => Err(ReplyTransitionRejection::RequestMismatch {
                    active: *active,
                    attempted: request_id,
                }),
                Self::Idle => Err(ReplyTransitionRejection::NoActiveRequest),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_stable_indices() {
        let mut conversation = Conversation::seeded("Hi!");
        assert_eq!(conversation.append(ChatTurn::user("one")), TurnIndex::new(1));
        assert_eq!(conversation.append(ChatTurn::assistant("two")), TurnIndex::new(2));
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.turns()[0], ChatTurn::assistant("Hi!"));
    }

    #[test]
    fn patch_last_replaces_final_content_only() {
        let mut conversation = Conversation::seeded("Hi!");
        conversation.append(ChatTurn::assistant("Hel"));

        assert_eq!(conversation.patch_last("Hello"), Some(TurnIndex::new(1)));
        assert_eq!(conversation.turns()[0].content, "Hi!");
        assert_eq!(conversation.turns()[1].content, "Hello");
        assert_eq!(Conversation::new().patch_last("x"), None);
    }

    #[test]
    fn same_glyph_twice_counts_two() {
        let mut conversation = Conversation::seeded("Hi!");
        assert_eq!(conversation.attach_reaction(TurnIndex::new(0), "👍"), Some(1));
        assert_eq!(conversation.attach_reaction(TurnIndex::new(0), "👍"), Some(2));
        assert_eq!(conversation.turns()[0].reaction_count("👍"), 2);
    }

    #[test]
    fn different_glyphs_keep_independent_counters() {
        let mut conversation = Conversation::seeded("Hi!");
        conversation.attach_reaction(TurnIndex::new(0), "👍");
        conversation.attach_reaction(TurnIndex::new(0), "🎉");

        let turn = &conversation.turns()[0];
        assert_eq!(turn.reaction_count("👍"), 1);
        assert_eq!(turn.reaction_count("🎉"), 1);
        assert_eq!(turn.reactions.as_ref().map(Reactions::len), Some(2));
    }

    #[test]
    fn out_of_range_reaction_is_a_no_op() {
        let mut conversation = Conversation::seeded("Hi!");
        let before = conversation.clone();

        assert_eq!(conversation.attach_reaction(TurnIndex::new(5), "👍"), None);
        assert_eq!(conversation.attach_reaction(TurnIndex::new(0), "  "), None);
        assert_eq!(conversation, before);
        assert!(conversation.turns()[0].reactions.is_none());
    }

    #[test]
    fn reaction_chips_hide_single_counts() {
        let mut turn = ChatTurn::assistant("ok");
        let mut reactions = Reactions::new();
        reactions.insert("👍".to_string(), 1);
        reactions.insert("🔥".to_string(), 3);
        turn.reactions = Some(reactions);

        assert_eq!(turn.reaction_chips(), vec!["👍".to_string(), "🔥 3".to_string()]);
    }

    #[test]
    fn request_messages_prepend_preamble_without_storing_it() {
        let mut conversation = Conversation::seeded("Hi!");
        conversation.append(ChatTurn::user("price?"));

        let messages = conversation.request_messages("You are Caya.");
        assert_eq!(
            messages,
            vec![
                ProviderMessage::new(Role::System, "You are Caya."),
                ProviderMessage::new(Role::Assistant, "Hi!"),
                ProviderMessage::new(Role::User, "price?"),
            ]
        );
        assert!(conversation.turns().iter().all(ChatTurn::is_rendered));
    }

    #[test]
    fn reply_state_rejects_second_start_and_foreign_completion() {
        let first = RequestId::new(1);
        let second = RequestId::new(2);
        let awaiting = ReplyState::Idle
            .apply(ReplyTransition::Start(first))
            .unwrap_or_default();

        assert_eq!(awaiting, ReplyState::AwaitingReply(first));
        assert_eq!(
            awaiting.apply(ReplyTransition::Start(second)),
            Err(ReplyTransitionRejection::AlreadyAwaiting {
                active: first,
                attempted: second,
            })
        );
        assert_eq!(
            awaiting.apply(ReplyTransition::Complete(second)),
            Err(ReplyTransitionRejection::RequestMismatch {
                active: first,
                attempted: second,
            })
        );
        assert_eq!(
            awaiting.apply(ReplyTransition::Fail {
                request_id: first,
                message: "boom".to_string(),
            }),
            Ok(ReplyState::Idle)
        );
        assert_eq!(
            ReplyState::Idle.apply(ReplyTransition::Complete(first)),
            Err(ReplyTransitionRejection::NoActiveRequest)
        );
    }
}
