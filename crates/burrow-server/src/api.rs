//! HTTP registration API.
//!
//! One endpoint: `POST /api/v1/register`. The handler authenticates the
//! request, allocates a tunnel address for the presented public key, asks
//! the orchestrator to install the peer through [`PeerAddFn`], and returns
//! the assignment plus the server's peering parameters.
//!
//! The IPAM lock is never held across the peer-add callback; if the install
//! fails, the handler compensates by releasing the fresh allocation before
//! reporting the failure.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{info, warn};

use burrow_ipam::Ipam;
use burrow_proto::{RegisterRequest, RegisterResponse, REGISTER_PATH};
use burrow_wireguard::{base64_to_hex, PublicKey, UapiPeer, WireGuardError};

use crate::error::ServerError;

/// Registration request bodies are rejected beyond this size.
const MAX_REQUEST_BODY_BYTES: usize = 4096;

/// Callback invoked to install a newly admitted peer on the WireGuard
/// device. The API stays decoupled from the tunnel through this seam.
pub type PeerAddFn = Arc<dyn Fn(UapiPeer) -> Result<(), WireGuardError> + Send + Sync>;

struct ApiState {
    ipam: Arc<Ipam>,
    server_public_key: String,
    server_endpoint: String,
    dns_servers: Vec<String>,
    mtu: u16,
    api_key: Option<String>,
    on_peer_add: PeerAddFn,
}

/// The registration API server.
#[derive(Clone)]
pub struct RegistrationApi {
    state: Arc<ApiState>,
}

impl RegistrationApi {
    /// Creates the API with the server's advertised peering parameters.
    ///
    /// `api_key = None` disables authentication; every request is admitted.
    #[must_use]
    pub fn new(
        ipam: Arc<Ipam>,
        server_public_key: impl Into<String>,
        server_endpoint: impl Into<String>,
        dns_servers: Vec<String>,
        mtu: u16,
        api_key: Option<String>,
        on_peer_add: PeerAddFn,
    ) -> Self {
        Self {
            state: Arc::new(ApiState {
                ipam,
                server_public_key: server_public_key.into(),
                server_endpoint: server_endpoint.into(),
                dns_servers,
                mtu,
                api_key,
                on_peer_add,
            }),
        }
    }

    /// Builds the router. Useful directly for tests; production goes
    /// through [`Self::serve_with_shutdown`].
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(REGISTER_PATH, post(handle_register))
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the listener and serves until the shutdown future completes,
    /// then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve_with_shutdown<F>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.state.api_key.is_none() {
            warn!("API server starting without authentication; set api_key to require auth");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(%addr, "registration API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        info!("registration API shut down");
        Ok(())
    }
}

/// Errors surfaced to HTTP clients as JSON `{error, message}` bodies.
#[derive(Debug)]
enum ApiError {
    Unauthorized,
    BadRequest(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "unauthorized".to_string(),
            ),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            Self::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

fn check_api_key(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

async fn handle_register(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;

    if request.public_key.is_empty() {
        return Err(ApiError::BadRequest("public_key is required".to_string()));
    }

    if let Err(e) = PublicKey::from_base64(&request.public_key) {
        warn!(error = %e, "rejecting invalid public_key");
        return Err(ApiError::BadRequest("invalid public_key format".to_string()));
    }

    let assigned_ip = state.ipam.allocate(&request.public_key).map_err(|e| {
        warn!(error = %e, "allocation failed");
        ApiError::Internal("failed to allocate IP address".to_string())
    })?;

    // Hex for the UAPI grammar; validated above, so this cannot fail.
    let public_key_hex = base64_to_hex(&request.public_key)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut peer = UapiPeer::new(public_key_hex);
    peer.allowed_ips = vec![format!("{assigned_ip}/32")];

    if let Err(e) = (state.on_peer_add)(peer) {
        warn!(error = %e, "failed to install peer, releasing allocation");
        state.ipam.release(&request.public_key);
        return Err(ApiError::Internal("failed to configure peer".to_string()));
    }

    let short_key = &request.public_key[..8.min(request.public_key.len())];
    info!(peer = %short_key, ip = %assigned_ip, "registered peer");

    let prefix_len = state.ipam.network().prefix_len();
    Ok(Json(RegisterResponse {
        assigned_ip: format!("{assigned_ip}/{prefix_len}"),
        server_public_key: state.server_public_key.clone(),
        server_endpoint: state.server_endpoint.clone(),
        dns_servers: state.dns_servers.clone(),
        mtu: state.mtu,
    }))
}
