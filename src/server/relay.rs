use futures::{ Stream, StreamExt };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{ self, error::SendError };
use tokio::time::{ timeout_at, Instant };
use tokio_stream::wrappers::ReceiverStream;
use log::{ debug, error, info, warn };
use uuid::Uuid;

use crate::config::model::ModelRequestConfig;
use crate::llm::{ ChatClient, ModelEvent, ModelMessage, ModelRequest, ModelRole };
use crate::models::chat::{ ChatMessage, Role };
use crate::models::stream::UiStreamChunk;

/// Text sent to the caller for any upstream failure. Details stay in the log.
pub const GENERIC_ERROR_TEXT: &str = "An error occurred.";
pub const TIMEOUT_ERROR_TEXT: &str = "Response exceeded the maximum duration.";

pub fn convert_to_model_messages(messages: &[ChatMessage]) -> Vec<ModelMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let text = m.text();
            if text.is_empty() {
                return None;
            }
            let role = match m.role {
                Role::User => ModelRole::User,
                Role::Assistant => ModelRole::Model,
            };
            Some(ModelMessage { role, text })
        })
        .collect()
}

pub fn build_model_request(config: Arc<ModelRequestConfig>, messages: &[ChatMessage]) -> ModelRequest {
    ModelRequest {
        config,
        contents: convert_to_model_messages(messages),
    }
}

/// Runs one upstream generation and re-frames it as UI stream chunks.
/// The producer task ends as soon as the receiver is dropped, even while
/// waiting on the upstream, taking the upstream request with it.
pub fn relay_stream(
    client: Arc<dyn ChatClient>,
    request: ModelRequest,
    max_duration: Duration
) -> impl Stream<Item = UiStreamChunk> + Send + 'static {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let deadline = Instant::now() + max_duration;
        let disconnected = tokio::select! {
            sent = pump(&tx, client, request, deadline) => sent.is_err(),
            _ = tx.closed() => true,
        };
        if disconnected {
            info!("Caller disconnected, dropping upstream stream");
        }
    });

    ReceiverStream::new(rx)
}

async fn pump(
    tx: &mpsc::Sender<UiStreamChunk>,
    client: Arc<dyn ChatClient>,
    request: ModelRequest,
    deadline: Instant
) -> Result<(), SendError<UiStreamChunk>> {
    let message_id = Uuid::new_v4().to_string();
    tx.send(UiStreamChunk::Start { message_id: Some(message_id) }).await?;
    tx.send(UiStreamChunk::StartStep).await?;

    let mut upstream = match timeout_at(deadline, client.stream_generate(&request)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!("Upstream request failed: {}", e);
            return tx.send(error_chunk(GENERIC_ERROR_TEXT)).await;
        }
        Err(_) => {
            warn!("Upstream request did not start before the deadline");
            return tx.send(error_chunk(TIMEOUT_ERROR_TEXT)).await;
        }
    };

    let text_id = Uuid::new_v4().simple().to_string();
    let mut text_open = false;

    loop {
        let event = match timeout_at(deadline, upstream.next()).await {
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(e))) => {
                error!("Upstream stream failed: {}", e);
                return tx.send(error_chunk(GENERIC_ERROR_TEXT)).await;
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Relay stream exceeded maximum duration");
                return tx.send(error_chunk(TIMEOUT_ERROR_TEXT)).await;
            }
        };

        match event {
            ModelEvent::TextDelta(delta) => {
                if !text_open {
                    tx.send(UiStreamChunk::TextStart { id: text_id.clone() }).await?;
                    text_open = true;
                }
                tx.send(UiStreamChunk::TextDelta { id: text_id.clone(), delta }).await?;
            }
            ModelEvent::Source { url, title } => {
                tx.send(UiStreamChunk::SourceUrl {
                    source_id: Uuid::new_v4().simple().to_string(),
                    url,
                    title,
                }).await?;
            }
            ModelEvent::Finish { reason } => {
                debug!("Upstream finished: {:?}", reason);
            }
        }
    }

    if text_open {
        tx.send(UiStreamChunk::TextEnd { id: text_id }).await?;
    }
    tx.send(UiStreamChunk::FinishStep).await?;
    tx.send(UiStreamChunk::Finish).await
}

fn error_chunk(text: &str) -> UiStreamChunk {
    UiStreamChunk::Error { error_text: text.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::MessagePart;

    #[test]
    fn converts_roles_and_drops_empty_messages() {
        let mut assistant = ChatMessage::assistant("a1");
        assistant.append_text("Hi! ");
        assistant.parts.push(MessagePart::Other);
        assistant.append_text("How can I help?");

        let empty = ChatMessage { id: "e".into(), role: Role::User, parts: vec![MessagePart::Other] };
        let messages = vec![ChatMessage::user("hello"), assistant, empty];

        let converted = convert_to_model_messages(&messages);
        assert_eq!(converted, vec![
            ModelMessage { role: ModelRole::User, text: "hello".into() },
            ModelMessage { role: ModelRole::Model, text: "Hi! How can I help?".into() }
        ]);
    }

    #[test]
    fn request_shares_fixed_config() {
        let config = Arc::new(ModelRequestConfig::default());
        let request = build_model_request(config.clone(), &[ChatMessage::user("hi")]);
        assert!(Arc::ptr_eq(&request.config, &config));
        assert_eq!(request.contents.len(), 1);
    }
}
