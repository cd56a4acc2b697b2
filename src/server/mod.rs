pub mod api;
pub mod relay;

use crate::cli::ServeArgs;
use crate::config::model::ModelRequestConfig;
use crate::config::prompt::{ resolve_system_prompt, PromptPolicy };
use crate::llm::{ new_client, LlmConfig };
use api::AppState;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use log::{ info, warn };

pub struct Server {
    addr: String,
    state: AppState,
    args: ServeArgs,
}

impl Server {
    pub fn new(args: ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let policy = if args.require_system_prompt {
            PromptPolicy::Required
        } else {
            PromptPolicy::Optional
        };
        let system_prompt = resolve_system_prompt(args.system_prompt.clone(), policy)?;

        let llm_config = LlmConfig {
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
            base_url: args.chat_base_url.clone(),
        };
        let client = new_client(&llm_config)?;
        info!(
            "Chat client configured: Model={}, Endpoint={}",
            args.chat_model,
            client.get_model_endpoint(&args.chat_model)
        );

        let config = ModelRequestConfig::new(args.chat_model.clone(), system_prompt);
        let state = AppState {
            client,
            config: Arc::new(config),
            max_duration: Duration::from_secs(args.max_duration_secs),
        };

        Ok(Self::with_state(args, state))
    }

    pub fn with_state(args: ServeArgs, state: AppState) -> Self {
        Self { addr: args.server_addr.clone(), state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let server_cooldown = self.args.server_cooldown_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        match server_cooldown {
            Some(period) => info!("Server-side cooldown enabled: one request per {:?} per client IP", period),
            None => warn!("Server-side cooldown disabled. Submission pacing is left to clients."),
        }

        let app = api::router(self.state.clone(), server_cooldown)
            .into_make_service_with_connect_info::<SocketAddr>();

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into());
                }
            };
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;

            info!("Relay listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                format!("Failed to bind relay to {}: {}. Try a different port.", addr, e)
            })?;
            info!("Relay listening on: http://{}", addr);
            axum::serve(listener, app).await?;
        }

        Ok(())
    }
}
