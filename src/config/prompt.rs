use crate::error::{ Error, Result };
use log::{ info, warn };

pub const SYSTEM_PROMPT_ENV: &str = "ORINARI_SYSTEM_PROMPT";

/// What to do when no system prompt is configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptPolicy {
    /// Forward requests without a system instruction.
    Optional,
    /// Refuse to start.
    Required,
}

/// Resolves the system prompt from its configured value. Whitespace-only
/// values count as missing.
pub fn resolve_system_prompt(
    value: Option<String>,
    policy: PromptPolicy
) -> Result<Option<String>> {
    let prompt = value.filter(|p| !p.trim().is_empty());

    match (prompt, policy) {
        (Some(p), _) => {
            info!("System prompt loaded ({} chars)", p.chars().count());
            Ok(Some(p))
        }
        (None, PromptPolicy::Required) => {
            Err(Error::MissingConfig(format!("{} is not set", SYSTEM_PROMPT_ENV)))
        }
        (None, PromptPolicy::Optional) => {
            warn!("{} is not set. Requests will be sent without a system prompt.", SYSTEM_PROMPT_ENV);
            Ok(None)
        }
    }
}
