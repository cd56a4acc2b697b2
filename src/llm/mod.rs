pub mod gemini;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::{ debug, error };

use crate::config::model::ModelRequestConfig;
use crate::error::{ Error, Result };
use crate::models::stream::{ SseDecoder, SseEvent };
use self::gemini::GeminiChatClient;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub text: String,
}

/// Everything the upstream call needs: the fixed configuration plus the
/// conversation supplied by the caller.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub config: Arc<ModelRequestConfig>,
    pub contents: Vec<ModelMessage>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    Source {
        url: String,
        title: Option<String>,
    },
    Finish {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_generate(&self, request: &ModelRequest) -> Result<EventStream>;

    fn get_model_endpoint(&self, model: &str) -> String;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> EventStream
where
    F: FnOnce(mpsc::Sender<Result<ModelEvent>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>> {
    let client = GeminiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// POSTs `payload` and turns the server-sent event body into model events.
/// Non-2xx responses fail before any event is produced; failures after that
/// arrive as the last item of the stream.
pub async fn http_stream_generate<P>(
    client: &reqwest::Client,
    url: &str,
    payload: &(impl Serialize + Sync),
    headers: Vec<(String, String)>,
    mut event_parser: P
) -> Result<EventStream>
where
    P: FnMut(&str) -> Result<Vec<ModelEvent>> + Send + 'static,
{
    let mut req = client.post(url).json(payload);
    for (name, value) in headers {
        req = req.header(name, value);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        error!("Upstream request failed with {}: {}", status, message);
        return Err(Error::Upstream { status: status.as_u16(), message });
    }

    let stream = create_streaming_response(move |tx| async move {
        let mut bytes = resp.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            let buf = match chunk {
                Ok(buf) => buf,
                Err(e) => {
                    let _ = tx.send(Err(Error::Http(e))).await;
                    return;
                }
            };
            let events = match decoder.push(&buf) {
                Ok(events) => events,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for event in events {
                if !forward_event(&tx, &mut event_parser, event).await {
                    return;
                }
            }
        }
        match decoder.finish() {
            Ok(Some(event)) => {
                forward_event(&tx, &mut event_parser, event).await;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
        debug!("Upstream stream closed");
    });

    Ok(stream)
}

/// Returns false once the stream should stop: the receiver is gone or the
/// payload could not be parsed.
async fn forward_event<P>(
    tx: &mpsc::Sender<Result<ModelEvent>>,
    event_parser: &mut P,
    event: SseEvent
) -> bool
where
    P: FnMut(&str) -> Result<Vec<ModelEvent>>,
{
    let payload = match event {
        SseEvent::Data(payload) => payload,
        SseEvent::Done => return true,
    };
    match event_parser(&payload) {
        Ok(events) => {
            for ev in events {
                if tx.send(Ok(ev)).await.is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
