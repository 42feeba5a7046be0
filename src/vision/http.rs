use std::time::Duration;

use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::{ImageRef, PlayerScan, TableScan, VisionClient, VisionError};

const LOG_TARGET: &str = "vision::http";

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Placeholder tokens some deployments ship in `.env` templates. They are
/// rejected outright instead of producing fabricated scans.
const PLACEHOLDER_KEYS: &[&str] = &["dummy", "sk-dummy", "changeme", "your-api-key"];

const SCAN_PROMPT: &str = "You are reading a poker table screenshot. Return a JSON object with: \
 `hand_id` (the hand number token shown in the corner, letters and digits only, null if unreadable), \
 `hero_cards` (the two hole cards of the bottom player as e.g. [\"Ah\",\"Kd\"], [] if hidden), \
 `board_cards` (community cards left to right, [] if none), \
 `stacks` (visible chip stacks as numbers, bottom player first, then clockwise), \
 `player_count` (number of seated players, null if unclear). \
 Do NOT include any player names.";

const PLAYERS_PROMPT: &str = "You are reading a poker table screenshot. Return a JSON object with: \
 `players` (screen names in visual order, bottom player first, then counter-clockwise as displayed), \
 `stacks` (their chip stacks as numbers in the same order, null if unreadable), \
 `dealer_player` (name carrying the dealer button, null if not visible), \
 `small_blind_player` and `big_blind_player` (names on the blind markers, null if not visible). \
 Copy names exactly as rendered.";

/// Adapter for an OpenAI-style vision endpoint.
pub struct HttpVisionClient {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl HttpVisionClient {
    /// Builds the client. Fails with [`VisionError::AuthMissing`] when the
    /// credential is absent or a known placeholder.
    pub fn new(
        api_key: &str,
        endpoint: Option<&str>,
        model: Option<&str>,
        call_timeout: Duration,
    ) -> Result<Self, VisionError> {
        let key = api_key.trim();
        if key.is_empty() || PLACEHOLDER_KEYS.iter().any(|p| key.eq_ignore_ascii_case(p)) {
            return Err(VisionError::AuthMissing);
        }

        let endpoint = Url::parse(endpoint.unwrap_or(DEFAULT_ENDPOINT))
            .map_err(|e| VisionError::Permanent(format!("bad vision endpoint: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| VisionError::AuthMissing)?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(call_timeout)
            .build()
            .map_err(|e| VisionError::Permanent(format!("client build failed: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    async fn image_data_url(&self, image: &ImageRef) -> Result<String, VisionError> {
        let (bytes, mime) = match image {
            ImageRef::Inline { bytes, mime } => (bytes.clone(), *mime),
            ImageRef::Path(path) => {
                let mime = match path.extension().and_then(|e| e.to_str()) {
                    Some("jpg") | Some("jpeg") => "image/jpeg",
                    Some("webp") => "image/webp",
                    _ => "image/png",
                };
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    VisionError::Permanent(format!("cannot read image {}: {e}", path.display()))
                })?;
                (bytes, mime)
            }
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{mime};base64,{encoded}"))
    }

    async fn ask<T: for<'de> Deserialize<'de>>(
        &self,
        prompt: &str,
        image: &ImageRef,
    ) -> Result<T, VisionError> {
        let data_url = self.image_data_url(image).await?;
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": 500,
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let envelope: CompletionEnvelope = response
            .json()
            .await
            .map_err(|e| VisionError::Schema(format!("bad completion envelope: {e}")))?;
        let content = envelope
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| VisionError::Schema("no completion choices".into()))?;

        debug!(target: LOG_TARGET, image = %image.label(), "vision response received");

        serde_json::from_str(content)
            .map_err(|e| VisionError::Schema(format!("unparseable vision payload: {e}")))
    }
}

#[derive(Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

fn classify_request_error(err: reqwest::Error) -> VisionError {
    if err.is_timeout() {
        // the duration is the client-wide bound; reqwest does not expose it
        VisionError::Timeout(Duration::ZERO)
    } else if err.is_connect() {
        VisionError::Transient(format!("connect failure: {err}"))
    } else {
        VisionError::Transient(err.to_string())
    }
}

fn classify_status(status: StatusCode, detail: String) -> VisionError {
    let detail = detail.chars().take(200).collect::<String>();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VisionError::AuthMissing,
        StatusCode::TOO_MANY_REQUESTS => VisionError::Transient(format!("rate limited: {detail}")),
        s if s.is_server_error() => VisionError::Transient(format!("HTTP {s}: {detail}")),
        s => VisionError::Permanent(format!("HTTP {s}: {detail}")),
    }
}

#[async_trait::async_trait]
impl VisionClient for HttpVisionClient {
    async fn scan_table(&self, image: &ImageRef) -> Result<TableScan, VisionError> {
        let scan: TableScan = self.ask(SCAN_PROMPT, image).await?;
        if scan.is_empty() {
            warn!(target: LOG_TARGET, image = %image.label(), "vision returned an empty scan");
        }
        Ok(scan)
    }

    async fn extract_players(&self, image: &ImageRef) -> Result<PlayerScan, VisionError> {
        self.ask(PLAYERS_PROMPT, image).await
    }
}
