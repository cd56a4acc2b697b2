use chrono::Utc;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::{ Mutex, Notify };
use log::{ error, info };

use super::cooldown::CooldownGate;
use super::session::{ ChatSession, ChatStatus, SharedGate, SubmitOutcome };
use super::store::{ FileStore, KeyValueStore };
use super::transport::{ HttpRelay, RelayTransport };
use crate::cli::ChatArgs;

const PROMPT_SUGGESTIONS: [&str; 4] = [
    "How does x402 work?",
    "What can ORINARI do?",
    "Simulate a payment example with ORINARI",
    "Check system status",
];

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Walks the cooldown display down once per second. A notification restarts
/// the one-second phase, as happens whenever the display is reset.
pub fn spawn_cooldown_ticker<S>(gate: SharedGate<S>, reset: Arc<Notify>) -> tokio::task::JoinHandle<()>
where
    S: KeyValueStore + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    let mut gate = gate.lock().await;
                    if gate.remaining_secs() > 0 {
                        if let Err(e) = gate.tick() {
                            error!("Failed to clear submission timestamp: {}", e);
                        }
                    }
                }
                _ = reset.notified() => {}
            }
        }
    })
}

fn status_line(remaining_secs: u64) -> String {
    if remaining_secs > 0 {
        format!("> COOLDOWN: {}s", remaining_secs)
    } else {
        "> SYSTEM READY".to_string()
    }
}

/// The status to show instead of submitting while input is disabled: a
/// response is in flight or the countdown is still running.
async fn input_refusal<S, T>(session: &ChatSession<S, T>) -> Option<String>
where
    S: KeyValueStore,
    T: RelayTransport,
{
    if session.input_enabled().await {
        return None;
    }
    if session.status() != ChatStatus::Idle {
        return Some("> Processing...".to_string());
    }
    Some(status_line(session.gate().lock().await.remaining_secs()))
}

pub async fn run_chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let state_path = args.resolved_state_path();
    let store = FileStore::open(&state_path);
    let gate = CooldownGate::restore(store, now_ms())?;
    let gate: SharedGate<FileStore> = Arc::new(Mutex::new(gate));

    let transport = HttpRelay::new(&args.relay_url)?;
    info!("Relay endpoint: {}", transport.url());
    info!("Client state file: {}", state_path.display());

    let reset = Arc::new(Notify::new());
    let ticker = spawn_cooldown_ticker(gate.clone(), reset.clone());
    let mut session = ChatSession::new(gate.clone(), transport);
    let mut service = args.service.clone().unwrap_or_default();

    println!("ORINARI AUTONOMOUS PAYMENT SYSTEM v{}", env!("CARGO_PKG_VERSION"));
    println!("> ORINARI is awaiting your command...");
    for suggestion in PROMPT_SUGGESTIONS {
        println!("    {}", suggestion);
    }
    println!("Commands: /service <endpoint>, /status, /quit");
    println!("{}", status_line(gate.lock().await.remaining_secs()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();

        if let Some(rest) = line.strip_prefix("/service") {
            service = rest.trim().to_string();
            if service.is_empty() {
                println!("> Service endpoint cleared");
            } else {
                println!("> Service endpoint: {}", service);
            }
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/status" => {
                println!("{}", status_line(gate.lock().await.remaining_secs()));
                continue;
            }
            _ => {}
        }

        if let Some(status) = input_refusal(&session).await {
            println!("{}", status);
            continue;
        }

        let mut stdout = std::io::stdout();
        let outcome = session.submit(now_ms(), line, &service, |delta| {
            let _ = write!(stdout, "{}", delta);
            let _ = stdout.flush();
        }).await;

        match outcome {
            Ok(SubmitOutcome::Sent { error, .. }) => {
                println!();
                if let Some(err) = error {
                    println!("> ERROR: {}", err);
                }
                service.clear();
                reset.notify_one();
            }
            Ok(SubmitOutcome::Blocked { remaining_secs }) => {
                reset.notify_one();
                println!("{}", status_line(remaining_secs));
            }
            Ok(SubmitOutcome::Busy) => println!("> Processing..."),
            Ok(SubmitOutcome::Empty) => {}
            Err(e) => {
                error!("Submission failed: {}", e);
                println!("> ERROR: {}", e);
                service.clear();
                reset.notify_one();
            }
        }
    }

    ticker.abort();
    info!("Chat session closed after {} messages", session.conversation().len());
    Ok(())
}
