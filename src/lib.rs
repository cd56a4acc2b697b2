pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;

use cli::{ Args, Command, ServeArgs };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::Chat(chat) => client::terminal::run_chat(chat).await,
    }
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("default"));
    info!("System Prompt Set: {}", args.system_prompt.as_deref().is_some_and(|p| !p.trim().is_empty()));
    info!("Require System Prompt: {}", args.require_system_prompt);
    info!("Max Duration: {}s", args.max_duration_secs);
    info!("Server Cooldown: {}", match args.server_cooldown_secs {
        Some(secs) if secs > 0 => format!("{}s", secs),
        _ => "disabled".to_string(),
    });
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    let server = Server::new(args)?;
    server.run().await?;

    Ok(())
}
