//! Round-robin selection across downstream webhook providers
//!
//! Only enabled providers take part in the rotation. A provider that has
//! spent its free quota is skipped until every provider has been inspected
//! once for the current request.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::providers::{Provider, ProviderConfig, WebhookTransport};

pub const NO_PROVIDER_ERROR: &str = "no available provider";
pub const DELIVERY_FAILED_ERROR: &str = "delivery failed";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub success: bool,
    pub provider: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub available: bool,
    pub quota_used: u64,
    pub quota_total: u64,
    pub quota_remaining: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BalancerStatus {
    pub providers: Vec<ProviderStatus>,
    pub total: usize,
    pub available: usize,
}

pub struct RoundRobinBalancer {
    providers: Vec<Arc<Provider>>,
    cursor: Mutex<usize>,
}

impl RoundRobinBalancer {
    pub fn new(configs: Vec<ProviderConfig>, transport: Arc<dyn WebhookTransport>) -> Self {
        let providers = configs
            .into_iter()
            .filter(|config| config.enabled)
            .map(|config| Arc::new(Provider::new(config, transport.clone())))
            .collect();

        Self {
            providers,
            cursor: Mutex::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn next_provider(&self) -> Option<Arc<Provider>> {
        if self.providers.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..self.providers.len() {
            let provider = &self.providers[*cursor];
            *cursor = (*cursor + 1) % self.providers.len();

            if provider.is_available() {
                return Some(provider.clone());
            }
        }

        None
    }

    pub async fn send(&self, payload: &Value) -> ForwardOutcome {
        let Some(provider) = self.next_provider() else {
            return ForwardOutcome {
                success: false,
                provider: None,
                error: Some(NO_PROVIDER_ERROR.to_string()),
            };
        };

        let success = provider.send_webhook(payload).await;
        ForwardOutcome {
            success,
            provider: Some(provider.name().to_string()),
            error: (!success).then(|| DELIVERY_FAILED_ERROR.to_string()),
        }
    }

    pub fn status(&self) -> BalancerStatus {
        let providers: Vec<ProviderStatus> = self
            .providers
            .iter()
            .map(|provider| ProviderStatus {
                name: provider.name().to_string(),
                enabled: provider.config().enabled,
                available: provider.is_available(),
                quota_used: provider.used_quota(),
                quota_total: provider.config().free_quota,
                quota_remaining: provider.quota_remaining(),
            })
            .collect();

        BalancerStatus {
            total: providers.len(),
            available: providers.iter().filter(|status| status.available).count(),
            providers,
        }
    }
}
