use clap::{ Args as ClapArgs, Parser, Subcommand };
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the streaming relay endpoint.
    Serve(ServeArgs),
    /// Open a terminal chat session against a relay.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    // --- Upstream Model Args ---
    /// API key for the Google Generative Language API.
    #[arg(long, env = "GOOGLE_GENERATIVE_AI_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Base URL for the Gemini API (without the /models/... suffix).
    #[arg(long, env = "CHAT_BASE_URL")] // No default, the client falls back to the public endpoint
    pub chat_base_url: Option<String>,

    /// Model name used for every request.
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-2.5-flash")]
    pub chat_model: String,

    /// System prompt sent with every request.
    #[arg(long, env = "ORINARI_SYSTEM_PROMPT", hide_env_values = true)]
    pub system_prompt: Option<String>,

    /// Refuse to start when no system prompt is configured.
    #[arg(long, env = "REQUIRE_SYSTEM_PROMPT", default_value = "false")]
    pub require_system_prompt: bool,

    /// Upper bound on the total duration of one streamed response, in seconds.
    #[arg(long, env = "MAX_DURATION_SECS", default_value = "120")]
    pub max_duration_secs: u64,

    /// Optional server-side cooldown per client IP, in seconds. Disabled when unset or 0.
    #[arg(long, env = "SERVER_COOLDOWN_SECS")]
    pub server_cooldown_secs: Option<u64>,

    // --- TLS Args ---
    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// URL of the relay's chat endpoint.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:4000/api/chat")]
    pub relay_url: String,

    /// File holding the client's persisted state (last submission time).
    #[arg(long, env = "STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// Service endpoint to annotate the first message with.
    #[arg(long)]
    pub service: Option<String>,
}

impl ChatArgs {
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("orinari")
                .join("storage.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let args = Args::try_parse_from(["orinari", "serve", "--chat-api-key", "k"]).unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.chat_api_key, "k");
        assert_eq!(serve.max_duration_secs, 120);
        assert!(!serve.enable_tls);
    }

    #[test]
    fn chat_state_path_override() {
        let args = Args::try_parse_from([
            "orinari",
            "chat",
            "--state-path",
            "/tmp/orinari.json",
            "--relay-url",
            "http://relay.local/api/chat",
        ]).unwrap();
        let Command::Chat(chat) = args.command else {
            panic!("expected chat");
        };
        assert_eq!(chat.resolved_state_path(), PathBuf::from("/tmp/orinari.json"));
        assert_eq!(chat.relay_url, "http://relay.local/api/chat");
    }
}
