use serde::Serialize;
use std::fmt;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4000;

/// Provider-side tools the model may call on its own during generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTool {
    GoogleSearch,
    UrlContext,
}

impl fmt::Display for ModelTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTool::GoogleSearch => write!(f, "google_search"),
            ModelTool::UrlContext => write!(f, "url_context"),
        }
    }
}

/// Settings bound to every upstream request. Callers of the relay cannot
/// override any of these.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequestConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub tools: Vec<ModelTool>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ModelRequestConfig {
    pub fn new(model: impl Into<String>, system_prompt: Option<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt,
            tools: vec![ModelTool::GoogleSearch, ModelTool::UrlContext],
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Default for ModelRequestConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, None)
    }
}
