use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub const TEXT_BODY: &str = "hello from mock server";
pub const PROTECTED_USER: &str = "user";
pub const PROTECTED_PASSWORD: &str = "secret";

/// PNG signature followed by an IHDR chunk header.
pub const PNG_BODY: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R',
];

/// RIFF/WAVE header prefix.
pub const WAV_BODY: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

/// Calls seen per flaky key.
pub type Db = Arc<RwLock<HashMap<String, u32>>>;

#[derive(Deserialize)]
pub struct FlakyParams {
    #[serde(default = "default_failures")]
    pub failures: u32,
}

fn default_failures() -> u32 {
    1
}

#[derive(Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/text", get(text))
        .route("/bytes", get(bytes))
        .route("/image.png", get(image))
        .route("/sound.wav", get(sound))
        .route("/flaky/{key}", get(flaky))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
        .route("/protected", get(protected).post(protected))
        .route("/form", post(echo_form))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn text() -> &'static str {
    TEXT_BODY
}

async fn bytes() -> impl IntoResponse {
    let body: Vec<u8> = (0..=255u8).collect();
    ([(header::CONTENT_TYPE, "application/octet-stream")], body)
}

async fn image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], PNG_BODY)
}

async fn sound() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "audio/wav")], WAV_BODY)
}

/// Fails the first `failures` calls per key with 503, then succeeds.
async fn flaky(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(params): Query<FlakyParams>,
) -> impl IntoResponse {
    let calls = {
        let mut seen = db.write().await;
        let calls = seen.entry(key.clone()).or_insert(0);
        *calls += 1;
        *calls
    };
    debug!(%key, calls, failures = params.failures, "flaky call");
    if calls <= params.failures {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [("status", "503")],
            format!("failure {calls} of {}", params.failures),
        )
            .into_response()
    } else {
        (StatusCode::OK, format!("succeeded after {} failures", params.failures)).into_response()
    }
}

async fn status(Path(code): Path<u16>) -> Result<impl IntoResponse, StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, [("status", code.to_string())], format!("status {code}")))
}

async fn slow(Query(params): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "slow response"
}

async fn protected(headers: HeaderMap) -> Result<&'static str, StatusCode> {
    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{PROTECTED_USER}:{PROTECTED_PASSWORD}"))
    );
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if authorized {
        Ok("welcome")
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn echo_form(Form(fields): Form<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(fields)
}
