//! Registration HTTP client with bounded retry.
//!
//! Registration is the one network exchange the client cannot skip, so
//! transient failures get a short fixed backoff schedule. Authentication
//! failures are terminal: a wrong API key will not become right on the
//! third attempt.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{info, warn};

use burrow_proto::{RegisterRequest, RegisterResponse, REGISTER_PATH};

use crate::error::ClientError;

/// Backoff before each attempt; three attempts total.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::ZERO,
    Duration::from_secs(2),
    Duration::from_secs(5),
];

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registers the public key with the server's API, retrying transient
/// failures per the fixed schedule.
///
/// # Errors
///
/// Returns the last error once the schedule is exhausted, or immediately on
/// a 401 response or a response that cannot be parsed.
pub async fn register(
    api_url: &str,
    public_key_b64: &str,
    api_key: Option<&str>,
) -> Result<RegisterResponse, ClientError> {
    register_with_schedule(api_url, public_key_b64, api_key, &RETRY_DELAYS).await
}

async fn register_with_schedule(
    api_url: &str,
    public_key_b64: &str,
    api_key: Option<&str>,
    delays: &[Duration],
) -> Result<RegisterResponse, ClientError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let url = format!("{api_url}{REGISTER_PATH}");
    let request_body = RegisterRequest {
        public_key: public_key_b64.to_string(),
    };

    let mut last_error: Option<ClientError> = None;

    for (attempt, delay) in delays.iter().enumerate() {
        if !delay.is_zero() {
            info!(
                attempt = attempt + 1,
                total = delays.len(),
                delay_secs = delay.as_secs(),
                "retrying registration"
            );
            tokio::time::sleep(*delay).await;
        }

        match attempt_register(&client, &url, &request_body, api_key).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "registration attempt failed");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(ClientError::RetriesExhausted {
        attempts: delays.len(),
        last: Box::new(last_error.unwrap_or(ClientError::Rejected {
            status: 0,
            body: "no attempts made".to_string(),
        })),
    })
}

async fn attempt_register(
    client: &reqwest::Client,
    url: &str,
    body: &RegisterRequest,
    api_key: Option<&str>,
) -> Result<RegisterResponse, ClientError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.header("X-API-Key", key);
    }

    let response = request.send().await?;
    let status = response.status();

    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    // A 200 with an unparseable body is a protocol violation, not a
    // transient fault; it surfaces immediately.
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| ClientError::InvalidResponse(format!("failed to parse response: {e}")))
}
