//! Stateless relay to the Expo push endpoint.

use std::time::Duration;

use serde::Serialize;

use crate::{PushError, PushNotification, Result};

/// Expo push API.
pub const DEFAULT_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub endpoint: String,
    /// Optional Expo access token, sent as a bearer token.
    pub access_token: Option<String>,
    /// When false, notifications are dropped without a request.
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One message of the endpoint's request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Outcome of a dispatch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchReport {
    pub messages_sent: usize,
    /// The endpoint's response body (push tickets).
    pub tickets: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct PushDispatcher {
    http: reqwest::Client,
    config: PushConfig,
}

impl PushDispatcher {
    pub fn new(config: PushConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Expand a notification into one message per token.
    pub fn messages(notification: &PushNotification) -> Result<Vec<PushMessage>> {
        if notification.to.is_empty() {
            return Err(PushError::Invalid("push tokens are required"));
        }
        if notification.title.is_empty() || notification.body.is_empty() {
            return Err(PushError::Invalid("title and body are required"));
        }
        let data = if notification.data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            notification.data.clone()
        };
        Ok(notification
            .to
            .iter()
            .map(|token| PushMessage {
                to: token.clone(),
                sound: "default",
                title: notification.title.clone(),
                body: notification.body.clone(),
                data: data.clone(),
            })
            .collect())
    }

    /// Send a notification in a single request. No retry.
    pub async fn dispatch(&self, notification: &PushNotification) -> Result<DispatchReport> {
        let messages = Self::messages(notification)?;
        if !self.config.enabled {
            tracing::debug!(tokens = messages.len(), "push disabled, dropping notification");
            return Ok(DispatchReport {
                messages_sent: 0,
                tickets: serde_json::Value::Null,
            });
        }

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header("Accept", "application/json")
            .json(&messages);
        if let Some(token) = self.config.access_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Http(status.as_u16()));
        }
        let tickets = response.json().await.unwrap_or(serde_json::Value::Null);

        tracing::info!(messages = messages.len(), "push notification sent");
        Ok(DispatchReport {
            messages_sent: messages.len(),
            tickets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one request, reply with `status` and return the request body.
    async fn stub_endpoint(status: u16) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.expect("read");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let length = head
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if body.len() >= length {
                        break;
                    }
                }
            }
            let reply = r#"{"data":[{"status":"ok","id":"ticket-1"}]}"#;
            let response = format!(
                "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{reply}",
                reply.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            let text = String::from_utf8_lossy(&buf).to_string();
            text.split_once("\r\n\r\n")
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        });
        (format!("http://{addr}/--/api/v2/push/send"), handle)
    }

    fn notification(to: &[&str]) -> PushNotification {
        PushNotification {
            to: to.iter().map(|t| t.to_string()).collect(),
            title: "新しいいいね！".to_string(),
            body: "ファンさんがいいねしました".to_string(),
            data: json!({"type": "like", "reviewId": 1}),
        }
    }

    fn dispatcher(endpoint: &str, enabled: bool) -> PushDispatcher {
        PushDispatcher::new(PushConfig {
            endpoint: endpoint.to_string(),
            enabled,
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .expect("dispatcher")
    }

    #[test]
    fn test_one_message_per_token() {
        let messages = PushDispatcher::messages(&notification(&["t1", "t2"])).expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].to, "t2");
        assert_eq!(messages[0].sound, "default");
        assert_eq!(messages[0].data["type"], "like");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            PushDispatcher::messages(&notification(&[])),
            Err(PushError::Invalid(_))
        ));
        let mut untitled = notification(&["t"]);
        untitled.title.clear();
        assert!(PushDispatcher::messages(&untitled).is_err());

        let mut no_data = notification(&["t"]);
        no_data.data = serde_json::Value::Null;
        let messages = PushDispatcher::messages(&no_data).expect("messages");
        assert_eq!(messages[0].data, json!({}));
    }

    #[tokio::test]
    async fn test_dispatch_posts_message_array() {
        let (endpoint, body) = stub_endpoint(200).await;
        let report = dispatcher(&endpoint, true)
            .dispatch(&notification(&["ExponentPushToken[a]", "ExponentPushToken[b]"]))
            .await
            .expect("dispatch");
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.tickets["data"][0]["status"], "ok");

        let sent: serde_json::Value =
            serde_json::from_str(&body.await.expect("join")).expect("json body");
        assert_eq!(sent.as_array().map(Vec::len), Some(2));
        assert_eq!(sent[0]["to"], "ExponentPushToken[a]");
        assert_eq!(sent[0]["sound"], "default");
        assert_eq!(sent[0]["title"], "新しいいいね！");
    }

    #[tokio::test]
    async fn test_dispatch_http_error() {
        let (endpoint, _body) = stub_endpoint(500).await;
        let result = dispatcher(&endpoint, true)
            .dispatch(&notification(&["t"]))
            .await;
        assert!(matches!(result, Err(PushError::Http(500))));
    }

    #[tokio::test]
    async fn test_disabled_sends_nothing() {
        let report = dispatcher("http://127.0.0.1:9/", false)
            .dispatch(&notification(&["t"]))
            .await
            .expect("dispatch");
        assert_eq!(report.messages_sent, 0);
    }
}
