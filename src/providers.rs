use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_free_quota")]
    pub free_quota: u64,
    #[serde(default)]
    pub used_quota: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_free_quota() -> u64 {
    1000
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub endpoint: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, request: &OutboundRequest, payload: &Value) -> Result<(), String>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post_json(&self, request: &OutboundRequest, payload: &Value) -> Result<(), String> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| format!("invalid header name {name:?}: {err}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| format!("invalid header value for {name}: {err}"))?;
            headers.insert(name, value);
        }

        let response = self
            .client
            .post(&request.endpoint)
            .timeout(request.timeout)
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

pub struct Provider {
    config: ProviderConfig,
    used_quota: AtomicU64,
    transport: Arc<dyn WebhookTransport>,
}

impl Provider {
    pub fn new(config: ProviderConfig, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            used_quota: AtomicU64::new(config.used_quota),
            config,
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn used_quota(&self) -> u64 {
        self.used_quota.load(Ordering::Relaxed)
    }

    pub fn quota_remaining(&self) -> u64 {
        self.config.free_quota.saturating_sub(self.used_quota())
    }

    pub fn is_available(&self) -> bool {
        self.config.enabled && self.used_quota() < self.config.free_quota
    }

    /// Forwards the payload unchanged. Failures are logged and reported as
    /// `false`; a successful delivery consumes one unit of quota.
    pub async fn send_webhook(&self, payload: &Value) -> bool {
        let request = self.outbound_request();
        match self.transport.post_json(&request, payload).await {
            Ok(()) => {
                let used = self.used_quota.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(provider = %self.config.name, used_quota = used, "webhook forwarded");
                true
            }
            Err(error) => {
                warn!(provider = %self.config.name, error = %error, "webhook forwarding failed");
                false
            }
        }
    }

    fn outbound_request(&self) -> OutboundRequest {
        let mut headers = self.config.headers.clone();
        if !headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
        {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }

        OutboundRequest {
            endpoint: self.config.endpoint.clone(),
            headers,
            timeout: Duration::from_secs(self.config.timeout),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    /// Records every request; endpoints in `fail_endpoints` answer with an error.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) calls: Mutex<Vec<OutboundRequest>>,
        pub(crate) fail_endpoints: Vec<String>,
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn post_json(
            &self,
            request: &OutboundRequest,
            _payload: &Value,
        ) -> Result<(), String> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(request.clone());
            if self.fail_endpoints.contains(&request.endpoint) {
                Err("503 Service Unavailable".to_string())
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn provider_config(name: &str, free_quota: u64) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            enabled: true,
            endpoint: format!("https://{name}.example.com/webhook"),
            headers: HashMap::new(),
            timeout: 30,
            free_quota,
            used_quota: 0,
        }
    }

    #[tokio::test]
    async fn success_consumes_quota() {
        let transport = Arc::new(RecordingTransport::default());
        let provider = Provider::new(provider_config("alpha", 2), transport.clone());

        assert!(provider.send_webhook(&json!({"status": "firing"})).await);
        assert_eq!(provider.used_quota(), 1);
        assert_eq!(provider.quota_remaining(), 1);
        assert!(provider.is_available());

        assert!(provider.send_webhook(&json!({"status": "firing"})).await);
        assert!(!provider.is_available());
        assert_eq!(provider.quota_remaining(), 0);
    }

    #[tokio::test]
    async fn failure_keeps_quota() {
        let transport = Arc::new(RecordingTransport {
            fail_endpoints: vec!["https://alpha.example.com/webhook".to_string()],
            ..Default::default()
        });
        let provider = Provider::new(provider_config("alpha", 2), transport);

        assert!(!provider.send_webhook(&json!({})).await);
        assert_eq!(provider.used_quota(), 0);
    }

    #[test]
    fn disabled_provider_is_unavailable() {
        let mut config = provider_config("alpha", 10);
        config.enabled = false;
        let provider = Provider::new(config, Arc::new(RecordingTransport::default()));
        assert!(!provider.is_available());
    }

    #[test]
    fn overused_quota_reports_zero_remaining() {
        let mut config = provider_config("alpha", 5);
        config.used_quota = 9;
        let provider = Provider::new(config, Arc::new(RecordingTransport::default()));
        assert_eq!(provider.quota_remaining(), 0);
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn content_type_defaults_to_json() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = provider_config("alpha", 10);
        config
            .headers
            .insert("X-Token".to_string(), "secret".to_string());
        let provider = Provider::new(config, transport.clone());

        provider.send_webhook(&json!({})).await;

        let calls = transport.calls.lock().expect("calls lock");
        assert_eq!(
            calls[0].headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            calls[0].headers.get("X-Token").map(String::as_str),
            Some("secret")
        );
    }

    #[tokio::test]
    async fn configured_content_type_is_kept() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = provider_config("alpha", 10);
        config
            .headers
            .insert("content-type".to_string(), "application/vnd.alert+json".to_string());
        let provider = Provider::new(config, transport.clone());

        provider.send_webhook(&json!({})).await;

        let calls = transport.calls.lock().expect("calls lock");
        assert_eq!(calls[0].headers.len(), 1);
        assert_eq!(
            calls[0].headers.get("content-type").map(String::as_str),
            Some("application/vnd.alert+json")
        );
    }

    #[tokio::test]
    async fn http_transport_posts_payload_unchanged() {
        let server = MockServer::start();
        let payload = json!({"receiver": "ops", "alerts": [{"status": "firing"}]});
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .header("x-token", "secret")
                .json_body(payload.clone());
            then.status(200);
        });

        let request = OutboundRequest {
            endpoint: server.url("/hook"),
            headers: HashMap::from([("X-Token".to_string(), "secret".to_string())]),
            timeout: Duration::from_secs(5),
        };

        HttpTransport::new()
            .post_json(&request, &payload)
            .await
            .expect("post should succeed");
        mock.assert();
    }

    #[tokio::test]
    async fn http_transport_reports_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500);
        });

        let request = OutboundRequest {
            endpoint: server.url("/hook"),
            headers: HashMap::new(),
            timeout: Duration::from_secs(5),
        };

        let err = HttpTransport::new()
            .post_json(&request, &json!({}))
            .await
            .expect_err("500 should fail");
        assert!(err.contains("500"));
    }
}
