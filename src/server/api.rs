use crate::config::model::ModelRequestConfig;
use crate::llm::ChatClient;
use crate::models::chat::ChatRequest;
use crate::models::stream::{ DONE_MARKER, UI_STREAM_HEADER, UI_STREAM_VERSION };
use super::relay::{ build_model_request, relay_stream };

use std::net::{ IpAddr, SocketAddr };
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ ConnectInfo, Request, State },
    middleware::{ self, Next },
    response::{ IntoResponse, Response, sse::{ Event, Sse } },
    http::{ header, HeaderName, HeaderValue, StatusCode },
};
use futures::{ stream, StreamExt };
use governor::{ clock::{ Clock, DefaultClock }, DefaultKeyedRateLimiter, Quota, RateLimiter };
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn };

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn ChatClient>,
    pub config: Arc<ModelRequestConfig>,
    pub max_duration: Duration,
}

#[derive(Serialize)]
struct CooldownResponse {
    error: String,
    retry_after_secs: u64,
}

type PeerLimiter = Arc<DefaultKeyedRateLimiter<IpAddr>>;

pub fn router(state: AppState, server_cooldown: Option<Duration>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut chat = Router::new().route("/api/chat", post(chat_handler));

    if let Some(limiter) = server_cooldown.and_then(peer_limiter) {
        chat = chat.layer(middleware::from_fn_with_state(limiter, cooldown_middleware));
    }

    Router::new()
        .merge(chat)
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    info!("Relaying conversation with {} messages", req.messages.len());

    let request = build_model_request(state.config.clone(), &req.messages);
    let frames = relay_stream(state.client.clone(), request, state.max_duration)
        .map(|chunk| Event::default().json_data(chunk))
        .chain(stream::once(async { Ok::<_, axum::Error>(Event::default().data(DONE_MARKER)) }));

    (
        [
            (HeaderName::from_static(UI_STREAM_HEADER), HeaderValue::from_static(UI_STREAM_VERSION)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        Sse::new(frames),
    )
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn peer_limiter(period: Duration) -> Option<PeerLimiter> {
    let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
    Some(Arc::new(RateLimiter::keyed(quota)))
}

async fn cooldown_middleware(
    State(limiter): State<PeerLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());

    if let Some(ip) = peer {
        if let Err(not_until) = limiter.check_key(&ip) {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after_secs = wait.as_secs_f64().ceil() as u64;
            warn!("{} is cooling down for another {}s", ip, retry_after_secs);
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(CooldownResponse {
                    error: "Cooldown active".into(),
                    retry_after_secs,
                }),
            ).into_response();
        }
    }

    next.run(req).await
}
