use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use log::{ info, warn };
use uuid::Uuid;

use super::cooldown::{ CooldownGate, GateDecision };
use super::store::KeyValueStore;
use super::transport::RelayTransport;
use crate::error::Result;
use crate::models::chat::{ ChatMessage, Conversation, MessagePart };
use crate::models::stream::UiStreamChunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatStatus {
    Idle,
    Submitted,
    Streaming,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Still cooling down; nothing was sent.
    Blocked { remaining_secs: u64 },
    /// A response is already in flight.
    Busy,
    /// Blank input; nothing was sent.
    Empty,
    Sent { text: String, error: Option<String> },
}

/// Prefixes the message with the service endpoint annotation when one is
/// given.
pub fn compose_message(input: &str, service: &str) -> String {
    let service = service.trim();
    if service.is_empty() {
        input.to_string()
    } else {
        format!("[Service: {}]\n\n{}", service, input)
    }
}

pub type SharedGate<S> = Arc<Mutex<CooldownGate<S>>>;

pub struct ChatSession<S, T> {
    conversation: Conversation,
    status: ChatStatus,
    gate: SharedGate<S>,
    transport: T,
    last_error: Option<String>,
}

impl<S, T> ChatSession<S, T>
where
    S: KeyValueStore,
    T: RelayTransport,
{
    pub fn new(gate: SharedGate<S>, transport: T) -> Self {
        Self {
            conversation: Conversation::new(),
            status: ChatStatus::Idle,
            gate,
            transport,
            last_error: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn gate(&self) -> &SharedGate<S> {
        &self.gate
    }

    pub async fn input_enabled(&self) -> bool {
        self.status == ChatStatus::Idle && self.gate.lock().await.remaining_secs() == 0
    }

    /// Runs one submission end to end. `on_delta` sees each text fragment as
    /// it arrives.
    pub async fn submit<F>(
        &mut self,
        now_ms: i64,
        input: &str,
        service: &str,
        mut on_delta: F
    ) -> Result<SubmitOutcome>
    where
        F: FnMut(&str) + Send,
    {
        if self.status != ChatStatus::Idle {
            return Ok(SubmitOutcome::Busy);
        }

        let text = {
            let mut gate = self.gate.lock().await;
            if let GateDecision::Blocked { remaining_secs } = gate.check(now_ms) {
                info!("Submission blocked, {}s of cooldown left", remaining_secs);
                return Ok(SubmitOutcome::Blocked { remaining_secs });
            }
            if input.trim().is_empty() {
                return Ok(SubmitOutcome::Empty);
            }
            let text = compose_message(input, service);
            gate.record(now_ms)?;
            text
        };

        self.conversation.push(ChatMessage::user(text.clone()));
        self.status = ChatStatus::Submitted;
        self.last_error = None;

        let mut chunks = match self.transport.send(&self.conversation.to_request()).await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.status = ChatStatus::Idle;
                return Err(e);
            }
        };

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(delta) = self.apply_chunk(chunk) {
                        on_delta(&delta);
                    }
                }
                Err(e) => {
                    warn!("Relay stream failed: {}", e);
                    self.last_error = Some(e.to_string());
                    break;
                }
            }
        }
        self.status = ChatStatus::Idle;

        Ok(SubmitOutcome::Sent { text, error: self.last_error.clone() })
    }

    /// Folds one stream frame into the conversation, returning the text it
    /// added, if any.
    pub fn apply_chunk(&mut self, chunk: UiStreamChunk) -> Option<String> {
        match chunk {
            UiStreamChunk::Start { message_id } => {
                let id = message_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                self.conversation.push(ChatMessage::assistant(id));
                self.status = ChatStatus::Streaming;
                None
            }
            UiStreamChunk::TextDelta { delta, .. } => {
                self.assistant_message().append_text(&delta);
                self.status = ChatStatus::Streaming;
                Some(delta)
            }
            UiStreamChunk::SourceUrl { source_id, url, title } => {
                self.assistant_message().parts.push(MessagePart::SourceUrl { source_id, url, title });
                None
            }
            UiStreamChunk::Error { error_text } => {
                self.last_error = Some(error_text);
                self.status = ChatStatus::Idle;
                None
            }
            UiStreamChunk::Finish => {
                self.status = ChatStatus::Idle;
                None
            }
            _ => None,
        }
    }

    fn assistant_message(&mut self) -> &mut ChatMessage {
        self.conversation.last_assistant_or_insert()
    }
}
