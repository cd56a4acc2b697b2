use serde::{ Serialize, Deserialize };

use crate::error::{ Error, Result };

/// Header value the chat UI checks before consuming a message stream.
pub const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_STREAM_VERSION: &str = "v1";
pub const DONE_MARKER: &str = "[DONE]";

/// One frame of the UI message stream protocol. Each frame travels as the
/// JSON payload of a single server-sent event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiStreamChunk {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    FinishStep,
    Finish,
    #[serde(rename_all = "camelCase")]
    Error {
        error_text: String,
    },
    #[serde(other)]
    Unknown,
}

/// A decoded server-sent event payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental line decoder for `data:` events. Network chunks can split a
/// line anywhere, including inside a multi-byte character, so raw bytes are
/// buffered and only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk. A complete line that is not valid UTF-8 is a
    /// stream error.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = decode_line(&raw[..pos])?;
            if let Some(event) = parse_data_line(&line) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        let raw = std::mem::take(&mut self.buffer);
        let line = decode_line(&raw)?;
        Ok(parse_data_line(&line))
    }
}

fn decode_line(raw: &[u8]) -> Result<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8(raw.to_vec()).map_err(|e| Error::Stream(format!("invalid UTF-8 in event stream: {}", e)))
}

fn parse_data_line(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_MARKER {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_wire_names() {
        let delta = UiStreamChunk::TextDelta { id: "t0".into(), delta: "Hi".into() };
        assert_eq!(
            serde_json::to_string(&delta).unwrap(),
            r#"{"type":"text-delta","id":"t0","delta":"Hi"}"#
        );

        let start = UiStreamChunk::Start { message_id: Some("m1".into()) };
        assert_eq!(
            serde_json::to_string(&start).unwrap(),
            r#"{"type":"start","messageId":"m1"}"#
        );

        let err = UiStreamChunk::Error { error_text: "boom".into() };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"type":"error","errorText":"boom"}"#
        );
        assert_eq!(
            serde_json::to_string(&UiStreamChunk::FinishStep).unwrap(),
            r#"{"type":"finish-step"}"#
        );
    }

    #[test]
    fn unknown_chunk_types_are_tolerated() {
        let chunk: UiStreamChunk =
            serde_json::from_str(r#"{"type":"reasoning-delta","id":"r","delta":"x"}"#).unwrap();
        assert_eq!(chunk, UiStreamChunk::Unknown);
    }

    #[test]
    fn decoder_reassembles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"st").unwrap().is_empty());
        let events = decoder.push(b"art\"}\n\ndata: [DONE]\n\n").unwrap();
        assert_eq!(
            events,
            vec![SseEvent::Data(r#"{"type":"start"}"#.into()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_ignores_comments_and_flushes_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\r\nevent: message\r\n").unwrap().is_empty());
        assert!(decoder.push(b"data: tail").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some(SseEvent::Data("tail".into())));
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn decoder_keeps_characters_split_across_chunks() {
        let frame = "data: {\"text\":\"café, 🚀\"}\n\n".as_bytes();
        let e_acute = frame.iter().position(|&b| b == 0xc3).unwrap();
        let rocket = frame.iter().position(|&b| b == 0xf0).unwrap();

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&frame[..e_acute + 1]).unwrap().is_empty());
        assert!(decoder.push(&frame[e_acute + 1..rocket + 2]).unwrap().is_empty());
        let events = decoder.push(&frame[rocket + 2..]).unwrap();
        assert_eq!(events, vec![SseEvent::Data(r#"{"text":"café, 🚀"}"#.into())]);
    }

    #[test]
    fn decoder_rejects_invalid_utf8_line() {
        let mut decoder = SseDecoder::new();
        assert!(matches!(decoder.push(b"data: \xff\xfe\n"), Err(Error::Stream(_))));

        let mut decoder = SseDecoder::new();
        decoder.push(b"data: \xc3").unwrap();
        assert!(matches!(decoder.finish(), Err(Error::Stream(_))));
    }
}
