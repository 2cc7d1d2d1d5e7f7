//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! JSON-RPC method calls to the appropriate command handlers. Each
//! connection carries its own session and change subscriptions; row
//! changes are pushed to it as JSON-RPC notifications.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use yadori_db::DbError;
use yadori_geocode::GeocodeError;
use yadori_types::{ErrorKind, ValidationError};

use crate::auth::AuthError;
use crate::commands;
use crate::realtime::Subscription;
use crate::storage::StorageError;
use crate::DaemonState;

/// Outgoing lines buffered per connection. Notifications beyond this are
/// dropped while the client is not reading.
pub const OUTBOUND_CAPACITY: usize = 1000;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Server-initiated message without an id.
#[derive(Debug, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: serde_json::Value,
}

impl RpcNotification {
    pub fn new(method: &'static str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({
                "detail": detail,
                "kind": ErrorKind::Validation.as_str(),
            })),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::from_kind(ErrorKind::Internal, detail)
    }

    /// Application error of a typed category. The code is fixed per kind
    /// and the kind name travels in `data.kind`.
    pub fn from_kind(kind: ErrorKind, detail: &str) -> Self {
        let code = match kind {
            ErrorKind::Auth => -32001,
            ErrorKind::Forbidden => -32003,
            ErrorKind::NotFound => -32004,
            ErrorKind::Conflict => -32009,
            ErrorKind::Validation => -32022,
            ErrorKind::RateLimited => -32029,
            ErrorKind::Network => -32050,
            ErrorKind::Internal => -32603,
        };
        Self {
            code,
            message: kind.as_str().to_ascii_uppercase(),
            data: Some(serde_json::json!({"kind": kind.as_str(), "detail": detail})),
        }
    }

    /// The category carried in `data.kind`, if any.
    pub fn kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("kind")?.as_str()
    }
}

impl From<DbError> for RpcError {
    fn from(e: DbError) -> Self {
        if e.kind() == ErrorKind::Internal {
            error!(error = %e, "database failure");
        }
        Self::from_kind(e.kind(), &e.to_string())
    }
}

impl From<ValidationError> for RpcError {
    fn from(e: ValidationError) -> Self {
        Self::from_kind(e.kind(), &e.to_string())
    }
}

impl From<AuthError> for RpcError {
    fn from(e: AuthError) -> Self {
        if e.kind() == ErrorKind::Internal {
            error!(error = %e, "auth failure");
        }
        Self::from_kind(e.kind(), &e.to_string())
    }
}

impl From<StorageError> for RpcError {
    fn from(e: StorageError) -> Self {
        Self::from_kind(e.kind(), &e.to_string())
    }
}

impl From<GeocodeError> for RpcError {
    fn from(e: GeocodeError) -> Self {
        let mut error = Self::from_kind(e.kind(), &e.to_string());
        if let Some(serde_json::Value::Object(data)) = error.data.as_mut() {
            data.insert("message".into(), e.user_message().into());
        }
        error
    }
}

/// Per-connection state: the bound session and live subscriptions.
pub struct ClientContext {
    session: Option<BoundSession>,
    subscriptions: HashMap<String, Subscription>,
    /// Subscriptions scoped to the bound user; they end when it changes.
    private: HashSet<String>,
    outbound: mpsc::Sender<String>,
}

/// The session a connection is signed in with.
#[derive(Debug, Clone)]
pub struct BoundSession {
    pub token_hash: [u8; 32],
    pub user_id: String,
}

impl ClientContext {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            session: None,
            subscriptions: HashMap::new(),
            private: HashSet::new(),
            outbound,
        }
    }

    pub fn session(&self) -> Option<&BoundSession> {
        self.session.as_ref()
    }

    /// Bind a session. Switching to another user ends the previous user's
    /// private subscriptions.
    pub fn bind(&mut self, session: BoundSession) {
        if self.session.as_ref().map(|s| s.user_id.as_str()) != Some(session.user_id.as_str()) {
            self.drop_private();
        }
        self.session = Some(session);
    }

    /// Unbind the session and end its private subscriptions.
    pub fn unbind(&mut self) -> Option<BoundSession> {
        self.drop_private();
        self.session.take()
    }

    fn drop_private(&mut self) {
        for id in self.private.drain() {
            self.subscriptions.remove(&id);
        }
    }

    /// Handle for pushing notifications to this connection.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            outbound: self.outbound.clone(),
        }
    }

    pub fn add_subscription(&mut self, id: String, subscription: Subscription) {
        self.subscriptions.insert(id, subscription);
    }

    /// Add a subscription that only lives while the current user stays
    /// bound.
    pub fn add_private_subscription(&mut self, id: String, subscription: Subscription) {
        self.private.insert(id.clone());
        self.subscriptions.insert(id, subscription);
    }

    /// Tear down one subscription. Returns whether it existed.
    pub fn remove_subscription(&mut self, id: &str) -> bool {
        self.private.remove(id);
        self.subscriptions.remove(id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

/// Sends notifications to one connection without blocking.
#[derive(Clone)]
pub struct Notifier {
    outbound: mpsc::Sender<String>,
}

impl Notifier {
    pub fn notify(&self, method: &'static str, params: serde_json::Value) {
        let line = match serde_json::to_string(&RpcNotification::new(method, params)) {
            Ok(line) => line,
            Err(e) => {
                warn!(method, error = %e, "unserializable notification");
                return;
            }
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = self.outbound.try_send(line) {
            warn!(method, "client not reading, notification dropped");
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Serve one client until it hangs up. Its subscriptions end with it.
pub async fn serve_connection<S>(state: Arc<DaemonState>, stream: S) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let writer_task = tokio::spawn(async move {
        while let Some(mut line) = outbound_rx.recv().await {
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut client = ClientContext::new(outbound_tx.clone());
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(&state, &mut client, request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let response_json = serde_json::to_string(&response)?;
        if outbound_tx.send(response_json).await.is_err() {
            break; // writer gone
        }
    }

    drop(client);
    drop(outbound_tx);
    writer_task.await??;
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    request: RpcRequest,
) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Accounts
        "sign_up" => commands::auth::sign_up(state, client, params).await,
        "sign_in" => commands::auth::sign_in(state, client, params).await,
        "sign_out" => commands::auth::sign_out(state, client, params).await,
        "get_session" => commands::auth::get_session(state, client).await,
        "resume_session" => commands::auth::resume_session(state, client, params).await,

        // Profiles
        "get_profile" => commands::profile::get_profile(state, client, params).await,
        "update_profile" => commands::profile::update_profile(state, client, params).await,
        "get_site_stats" => commands::profile::get_site_stats(state).await,

        // Reviews
        "list_reviews" => commands::reviews::list_reviews(state, params).await,
        "get_review" => commands::reviews::get_review(state, client, params).await,
        "create_review" => commands::reviews::create_review(state, client, params).await,
        "update_review" => commands::reviews::update_review(state, client, params).await,
        "delete_review" => commands::reviews::delete_review(state, client, params).await,
        "upload_review_images" => {
            commands::reviews::upload_review_images(state, client, params).await
        }

        // Likes
        "toggle_like" => commands::likes::toggle_like(state, client, params).await,
        "set_like" => commands::likes::set_like(state, client, params).await,
        "get_like_state" => commands::likes::get_like_state(state, client, params).await,

        // Comments
        "list_comments" => commands::comments::list_comments(state, params).await,
        "create_comment" => commands::comments::create_comment(state, client, params).await,
        "update_comment" => commands::comments::update_comment(state, client, params).await,
        "delete_comment" => commands::comments::delete_comment(state, client, params).await,

        // Devices
        "register_device" => commands::devices::register_device(state, client, params).await,
        "unregister_device" => commands::devices::unregister_device(state, client, params).await,

        // Geocoding
        "geocode_address" => commands::geocode::geocode_address(state, params).await,
        "reverse_geocode" => commands::geocode::reverse_geocode(state, params).await,
        "validate_address" => commands::geocode::validate_address(params).await,

        // Realtime
        "subscribe_changes" => commands::realtime::subscribe_changes(state, client, params).await,
        "unsubscribe_changes" => commands::realtime::unsubscribe_changes(client, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(RpcError::parse_error().code, -32700);
        assert_eq!(RpcError::invalid_request().code, -32600);
        assert_eq!(RpcError::method_not_found("x").code, -32601);
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::internal_error("x").code, -32603);
    }

    #[test]
    fn test_kind_codes_are_distinct() {
        let kinds = [
            ErrorKind::Auth,
            ErrorKind::Network,
            ErrorKind::RateLimited,
            ErrorKind::NotFound,
            ErrorKind::Forbidden,
            ErrorKind::Validation,
            ErrorKind::Conflict,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| RpcError::from_kind(*k, "").code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());

        let e = RpcError::from_kind(ErrorKind::RateLimited, "slow down");
        assert_eq!(e.message, "RATE_LIMITED");
        assert_eq!(e.kind(), Some("rate_limited"));
    }

    #[test]
    fn test_error_conversions() {
        let e = RpcError::from(DbError::Forbidden("review".into()));
        assert_eq!(e.code, -32003);
        assert_eq!(e.kind(), Some("forbidden"));

        let e = RpcError::from(GeocodeError::RateLimited);
        assert_eq!(e.kind(), Some("rate_limited"));
        let data = e.data.expect("data");
        assert_eq!(
            data["message"],
            "検索回数の上限に達しました。しばらく待ってから再試行してください"
        );

        let e = RpcError::from(AuthError::NotSignedIn);
        assert_eq!(e.code, -32001);
    }

    #[test]
    fn test_rpc_response_success() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_rpc_response_error() {
        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[tokio::test]
    async fn test_notifier_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let client = ClientContext::new(tx);
        let notifier = client.notifier();
        notifier.notify("row_change", serde_json::json!({"n": 1}));
        notifier.notify("row_change", serde_json::json!({"n": 2}));

        let line = rx.recv().await.expect("first");
        let value: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "row_change");
        assert_eq!(value["params"]["n"], 1);
        assert!(value.get("id").is_none());
        assert!(rx.try_recv().is_err());
    }
}
