use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::collections::HashSet;
use log::info;

use super::{ http_stream_generate, ChatClient, EventStream, LlmConfig, ModelEvent, ModelMessage, ModelRequest, ModelRole, DEFAULT_GEMINI_BASE_URL };
use crate::config::model::ModelTool;
use crate::error::{ Error, Result };

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: ModelRole,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiTool {
    GoogleSearch {},
    UrlContext {},
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct GoogleError {
    code: Option<u16>,
    message: Option<String>,
}

fn build_payload(request: &ModelRequest) -> GeminiStreamRequest {
    let config = &request.config;

    let contents = request.contents
        .iter()
        .map(|ModelMessage { role, text }| GeminiContent {
            role: *role,
            parts: vec![GeminiPart { text: text.clone() }],
        })
        .collect();

    let system_instruction = config.system_prompt.as_ref().map(|p| GeminiSystemInstruction {
        parts: vec![GeminiPart { text: p.clone() }],
    });

    let tools = config.tools
        .iter()
        .map(|t| match t {
            ModelTool::GoogleSearch => GeminiTool::GoogleSearch {},
            ModelTool::UrlContext => GeminiTool::UrlContext {},
        })
        .collect();

    GeminiStreamRequest {
        contents,
        system_instruction,
        tools,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

/// Parses one `data:` payload of a `streamGenerateContent?alt=sse` response.
/// `seen_sources` carries the URLs already reported on this stream; Gemini
/// repeats grounding metadata across chunks.
fn parse_gemini_chunk(payload: &str, seen_sources: &mut HashSet<String>) -> Result<Vec<ModelEvent>> {
    let chunk: GoogleChunk = serde_json::from_str(payload)?;

    if let Some(err) = chunk.error {
        return Err(Error::Upstream {
            status: err.code.unwrap_or(500),
            message: err.message.unwrap_or_else(|| "unknown upstream error".to_string()),
        });
    }

    let mut events = Vec::new();
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(events);
    };

    if let Some(content) = candidate.content {
        for part in content.parts {
            match part.text {
                Some(text) if !part.thought && !text.is_empty() => {
                    events.push(ModelEvent::TextDelta(text));
                }
                _ => {}
            }
        }
    }

    if let Some(meta) = candidate.grounding_metadata {
        for web in meta.grounding_chunks.into_iter().filter_map(|c| c.web) {
            if let Some(url) = web.uri {
                if seen_sources.insert(url.clone()) {
                    events.push(ModelEvent::Source { url, title: web.title });
                }
            }
        }
    }

    if candidate.finish_reason.is_some() {
        events.push(ModelEvent::Finish { reason: candidate.finish_reason });
    }

    Ok(events)
}

pub struct GeminiChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::MissingConfig("Google API key is required for GeminiChatClient".to_string())
            })?;

        Ok(Self::new(api_key, config.base_url.clone()))
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn stream_generate(&self, request: &ModelRequest) -> Result<EventStream> {
        let url = format!("{}:streamGenerateContent?alt=sse", self.get_model_endpoint(&request.config.model));
        info!(
            "GeminiChatClient::stream_generate() → model={} messages={}",
            request.config.model,
            request.contents.len()
        );

        let payload = build_payload(request);
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("x-goog-api-key".to_string(), self.api_key.clone())
        ];

        let mut seen_sources = HashSet::new();
        http_stream_generate(&self.http, &url, &payload, headers, move |line| {
            parse_gemini_chunk(line, &mut seen_sources)
        }).await
    }

    fn get_model_endpoint(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ModelRequestConfig;
    use std::sync::Arc;

    fn request(system_prompt: Option<&str>) -> ModelRequest {
        ModelRequest {
            config: Arc::new(ModelRequestConfig::new("gemini-2.5-flash", system_prompt.map(String::from))),
            contents: vec![
                ModelMessage { role: ModelRole::User, text: "How does x402 work?".into() },
                ModelMessage { role: ModelRole::Model, text: "It uses HTTP 402.".into() }
            ],
        }
    }

    #[test]
    fn payload_carries_fixed_configuration() {
        let json = serde_json::to_value(build_payload(&request(Some("Be terse.")))).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "It uses HTTP 402.");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(json["tools"][0], serde_json::json!({ "googleSearch": {} }));
        assert_eq!(json["tools"][1], serde_json::json!({ "urlContext": {} }));
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4000);
    }

    #[test]
    fn payload_omits_missing_system_prompt() {
        let json = serde_json::to_value(build_payload(&request(None))).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn parses_text_and_skips_thoughts() {
        let mut seen = HashSet::new();
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[
            {"text":"thinking...","thought":true},
            {"text":"Hello"}
        ]}}]}"#;
        let events = parse_gemini_chunk(payload, &mut seen).unwrap();
        assert_eq!(events, vec![ModelEvent::TextDelta("Hello".into())]);
    }

    #[test]
    fn parses_sources_once_and_finish_reason() {
        let mut seen = HashSet::new();
        let payload = r#"{"candidates":[{
            "content":{"parts":[{"text":"done"}]},
            "finishReason":"STOP",
            "groundingMetadata":{"groundingChunks":[
                {"web":{"uri":"https://x402.org","title":"x402"}},
                {"retrievedContext":{}}
            ]}
        }]}"#;
        let events = parse_gemini_chunk(payload, &mut seen).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], ModelEvent::Source {
            url: "https://x402.org".into(),
            title: Some("x402".into()),
        });
        assert_eq!(events[2], ModelEvent::Finish { reason: Some("STOP".into()) });

        let again = parse_gemini_chunk(payload, &mut seen).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn upstream_error_payload_becomes_error() {
        let mut seen = HashSet::new();
        let payload = r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        match parse_gemini_chunk(payload, &mut seen) {
            Err(Error::Upstream { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "Resource exhausted");
            }
            other => panic!("unexpected result: {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig { api_key: Some(String::new()), base_url: None };
        assert!(GeminiChatClient::from_config(&config).is_err());

        let config = LlmConfig {
            api_key: Some("key".into()),
            base_url: Some("http://localhost:9000/v1beta/".into()),
        };
        let client = GeminiChatClient::from_config(&config).unwrap();
        assert_eq!(
            client.get_model_endpoint("gemini-2.5-flash"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash"
        );
    }
}
