//! Streaming conversation engine
//!
//! Drives one turn at a time: send history plus the new user message, consume
//! the stream, and when the model requests tool calls, dispatch them and
//! resume with a follow-up stream carrying the results. The loop is bounded
//! by [`MAX_TOOL_ROUNDS`]; a turn always ends in `Done`, `Failed`, or
//! `Cancelled`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatToolCall, ChatToolCallFunction};
use crate::core::article::ArticleIndex;
use crate::core::chat_stream::{ChatTransport, StreamMessage, ToolCallDelta};
use crate::core::prompt::system_instruction;
use crate::core::store::{Role, SourceRef, StoredMessage};
use crate::core::tools::{tool_definitions, ToolDispatcher};

/// Hard bound on tool-call round trips per turn. The model deciding to call
/// tools forever must not hang the client.
pub const MAX_TOOL_ROUNDS: usize = 4;

/// Prior messages sent with each turn, newest last.
pub const HISTORY_WINDOW: usize = 10;

/// Interim cue emitted while tool calls are being dispatched.
pub const TOOL_MARKER: &str = "\n\n*Checking local records...*\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    MissingCredential,
    ToolLoopExceeded { rounds: usize },
    Transport(String),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::MissingCredential => write!(
                f,
                "No API credential configured. Set OPENAI_API_KEY or add api_key to the config file."
            ),
            TurnError::ToolLoopExceeded { rounds } => {
                write!(f, "The model kept requesting tools; gave up after {rounds} rounds.")
            }
            TurnError::Transport(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TurnError {}

/// One unit of turn output. Text accumulates by concatenation; sources by
/// uri-keyed union. `Done`, `Failed`, and `Cancelled` are terminal.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Delta {
        text: String,
        sources: Vec<SourceRef>,
    },
    Done,
    Failed(TurnError),
    Cancelled,
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnEvent::Delta { .. })
    }
}

pub struct TurnHandle {
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    pub cancel: CancellationToken,
}

pub struct ChatEngine {
    transport: Arc<dyn ChatTransport>,
    index: Arc<ArticleIndex>,
    model: String,
    credential_present: bool,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

struct CompletedToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ChatEngine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        index: Arc<ArticleIndex>,
        model: impl Into<String>,
        credential_present: bool,
    ) -> Self {
        Self {
            transport,
            index,
            model: model.into(),
            credential_present,
        }
    }

    pub fn submit(&self, history: &[StoredMessage], user_text: &str) -> TurnHandle {
        self.submit_with_token(history, user_text, CancellationToken::new())
    }

    /// Start a turn with a caller-owned cancellation token. The token is
    /// honored at every suspension point.
    pub fn submit_with_token(
        &self,
        history: &[StoredMessage],
        user_text: &str,
        cancel: CancellationToken,
    ) -> TurnHandle {
        let (tx, events) = mpsc::unbounded_channel();

        if !self.credential_present {
            // Detected before any network activity; the turn ends with this
            // single terminal event.
            let _ = tx.send(TurnEvent::Failed(TurnError::MissingCredential));
            return TurnHandle { events, cancel };
        }

        let messages = build_initial_messages(&self.index, history, user_text);
        let transport = Arc::clone(&self.transport);
        let index = Arc::clone(&self.index);
        let model = self.model.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            run_turn(transport, index, model, messages, tx, task_cancel).await;
        });

        TurnHandle { events, cancel }
    }
}

fn build_initial_messages(
    index: &ArticleIndex,
    history: &[StoredMessage],
    user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);
    messages.push(ChatMessage::system(system_instruction(index)));

    let window_start = history.len().saturating_sub(HISTORY_WINDOW);
    for stored in &history[window_start..] {
        let content = if stored.text.is_empty() {
            " ".to_string()
        } else {
            stored.text.clone()
        };
        messages.push(match stored.role {
            Role::User => ChatMessage::user(content),
            Role::Model => ChatMessage::assistant(content),
        });
    }

    messages.push(ChatMessage::user(user_text));
    messages
}

async fn run_turn(
    transport: Arc<dyn ChatTransport>,
    index: Arc<ArticleIndex>,
    model: String,
    mut messages: Vec<ChatMessage>,
    tx: mpsc::UnboundedSender<TurnEvent>,
    cancel: CancellationToken,
) {
    let tools = tool_definitions();
    let mut rounds_executed = 0usize;

    loop {
        if cancel.is_cancelled() {
            let _ = tx.send(TurnEvent::Cancelled);
            return;
        }

        let request = ChatRequest {
            model: model.clone(),
            messages: messages.clone(),
            stream: true,
            tools: Some(tools.clone()),
        };
        let mut rx = transport.open(request, cancel.clone()).await;

        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        let mut stream_error: Option<String> = None;

        while let Some(message) = rx.recv().await {
            if cancel.is_cancelled() {
                let _ = tx.send(TurnEvent::Cancelled);
                return;
            }
            match message {
                StreamMessage::Chunk(text) => {
                    let _ = tx.send(TurnEvent::Delta {
                        text,
                        sources: Vec::new(),
                    });
                }
                StreamMessage::Sources(annotations) => {
                    let sources = annotations
                        .into_iter()
                        .map(|s| SourceRef {
                            uri: s.uri,
                            title: s.title.unwrap_or_default(),
                        })
                        .collect();
                    let _ = tx.send(TurnEvent::Delta {
                        text: String::new(),
                        sources,
                    });
                }
                StreamMessage::ToolCall(delta) => accumulate_tool_call(&mut pending, delta),
                StreamMessage::Error(message) => stream_error = Some(message),
                StreamMessage::End => break,
            }
        }

        if cancel.is_cancelled() {
            let _ = tx.send(TurnEvent::Cancelled);
            return;
        }

        if let Some(message) = stream_error {
            // Partial text already emitted stays with the caller.
            let _ = tx.send(TurnEvent::Failed(TurnError::Transport(message)));
            return;
        }

        let calls = completed_tool_calls(pending);
        if calls.is_empty() {
            let _ = tx.send(TurnEvent::Done);
            return;
        }

        if rounds_executed == MAX_TOOL_ROUNDS {
            debug!(rounds = rounds_executed, "Tool loop bound reached");
            let _ = tx.send(TurnEvent::Failed(TurnError::ToolLoopExceeded {
                rounds: rounds_executed,
            }));
            return;
        }
        rounds_executed += 1;

        let _ = tx.send(TurnEvent::Delta {
            text: TOOL_MARKER.to_string(),
            sources: Vec::new(),
        });

        // Echo the calls back as the assistant message, then answer each one.
        messages.push(ChatMessage {
            role: "assistant".to_string(),
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(
                calls
                    .iter()
                    .map(|call| ChatToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: ChatToolCallFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect(),
            ),
        });

        let dispatcher = ToolDispatcher::new(&index);
        for call in &calls {
            debug!(tool = %call.name, id = %call.id, "Executing tool call");
            let payload = dispatcher.dispatch(&call.name, &call.arguments);
            messages.push(ChatMessage::tool_response(&call.id, payload.to_string()));
        }
    }
}

/// Fold one streamed delta into the pending call for its index. Ids and
/// names are set once; argument fragments concatenate.
fn accumulate_tool_call(pending: &mut BTreeMap<u32, PendingToolCall>, delta: ToolCallDelta) {
    let entry = pending.entry(delta.index).or_default();
    if delta.id.is_some() {
        entry.id = delta.id;
    }
    if delta.name.is_some() {
        entry.name = delta.name;
    }
    if let Some(arguments) = delta.arguments {
        entry.arguments.push_str(&arguments);
    }
}

fn completed_tool_calls(pending: BTreeMap<u32, PendingToolCall>) -> Vec<CompletedToolCall> {
    pending
        .into_iter()
        .filter_map(|(index, call)| {
            let Some(name) = call.name else {
                debug!(index, "Dropping tool call delta without a name");
                return None;
            };
            Some(CompletedToolCall {
                id: call.id.unwrap_or_else(|| format!("call-{index}")),
                name,
                arguments: call.arguments,
            })
        })
        .collect()
}
