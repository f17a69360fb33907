use log::debug;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{DeliveryMode, DeliveryReport, DeliveryStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Server { status: StatusCode, message: String },
}

/// Client for the delivery server's HTTP API.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    base_url: String,
    admin_token: Option<String>,
    listener_token: Option<String>,
}

impl DeliveryClient {
    pub fn new(base_url: &str, admin_token: Option<String>, listener_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_token,
            listener_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.admin_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn listener(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.listener_token {
            Some(token) => request.header("x-listener-token", token),
            None => request,
        }
    }

    pub async fn deliver(&self, order_id: &str, mode: DeliveryMode) -> Result<DeliveryReport, ClientError> {
        let request = self
            .http
            .post(self.url("/deliver"))
            .json(&json!({ "orderId": order_id, "action": mode }));
        send(self.admin(request)).await
    }

    pub async fn join(&self, player: &str, server: Option<&str>, timestamp: Option<&str>) -> Result<Value, ClientError> {
        let request = self.http.post(self.url("/player/join")).json(&json!({
            "minecraft_ign": player,
            "server_name": server,
            "timestamp": timestamp,
        }));
        send(self.listener(request)).await
    }

    pub async fn leave(&self, player: &str, timestamp: Option<&str>) -> Result<Value, ClientError> {
        let request = self.http.post(self.url("/player/leave")).json(&json!({
            "minecraft_ign": player,
            "timestamp": timestamp,
        }));
        send(self.listener(request)).await
    }

    pub async fn queue(&self, status: Option<DeliveryStatus>) -> Result<Value, ClientError> {
        let mut request = self.http.get(self.url("/queue"));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        send(self.admin(request)).await
    }

    pub async fn resolve(&self, order_id: &str, status: DeliveryStatus) -> Result<Value, ClientError> {
        let request = self
            .http
            .post(self.url(&format!("/queue/{order_id}/resolve")))
            .json(&json!({ "status": status }));
        send(self.admin(request)).await
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    debug!("Server answered {}", status);

    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Server {
        status,
        message: error_message(&body),
    })
}

/// Pulls `error` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
