use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;
use log::{ debug, info };

use crate::error::{ Error, Result };
use crate::models::chat::ChatRequest;
use crate::models::stream::{ SseDecoder, SseEvent, UiStreamChunk };

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UiStreamChunk>> + Send>>;

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChunkStream>;
}

pub struct HttpRelay {
    http: reqwest::Client,
    url: Url,
}

impl HttpRelay {
    pub fn new(relay_url: &str) -> Result<Self> {
        let url = Url::parse(relay_url).map_err(|source| Error::Url {
            url: relay_url.to_string(),
            source,
        })?;
        Ok(Self { http: reqwest::Client::new(), url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn send(&self, request: &ChatRequest) -> Result<ChunkStream> {
        info!("Posting {} messages to {}", request.messages.len(), self.url);
        let resp = self.http.post(self.url.clone()).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Relay { status: status.as_u16(), message });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
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
                    let payload = match event {
                        SseEvent::Data(payload) => payload,
                        SseEvent::Done => {
                            debug!("Relay stream done");
                            return;
                        }
                    };
                    let parsed = serde_json::from_str::<UiStreamChunk>(&payload).map_err(Error::from);
                    if tx.send(parsed).await.is_err() {
                        return;
                    }
                }
            }
            match decoder.finish() {
                Ok(Some(SseEvent::Done)) => return,
                Ok(_) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            let _ = tx.send(Err(Error::Stream("relay closed the stream before [DONE]".to_string()))).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
