use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use botkeeper_core::{BotHttpSettings, BotkeeperError, BotkeeperResult, BotsHttpSettings};

use crate::breaker::CircuitBreaker;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Outbound HTTP client shared by all bots.
///
/// Every call resolves the bot's settings over the global default, then runs
/// under a retry policy and a circuit breaker cached per
/// `(bot, destination host)` so repeated calls to one destination share
/// breaker state.
pub struct BotWebClient {
    settings: BotsHttpSettings,
    http: reqwest::Client,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    idempotency_keys: RwLock<HashMap<String, String>>,
}

impl BotWebClient {
    pub fn new(settings: BotsHttpSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            breakers: RwLock::new(HashMap::new()),
            idempotency_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Sends `method` to `url` (or the bot's configured base URL) and parses
    /// the JSON response body, `None` when the body is empty.
    ///
    /// Raises only after the retry/breaker policy settles; `cancel` preempts
    /// regardless of remaining retries.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        bot_id: &str,
        url: Option<&str>,
        body: Option<&serde_json::Value>,
        cancel: &CancellationToken,
    ) -> BotkeeperResult<Option<T>> {
        let settings = self.settings.for_bot(bot_id);

        let target_url = url
            .map(str::to_string)
            .or_else(|| settings.base_url.clone())
            .ok_or_else(|| {
                BotkeeperError::config_error(format!("no URL provided for bot '{bot_id}'"))
            })?;
        let parsed = Url::parse(&target_url)
            .map_err(|e| BotkeeperError::config_error(format!("invalid URL {target_url}: {e}")))?;
        let host = parsed.host_str().unwrap_or("unknown").to_string();

        let breaker = self.breaker_for(bot_id, &host, &settings).await;
        let idempotency_key = if method == Method::POST {
            Some(self.idempotency_key_for(bot_id, &target_url).await)
        } else {
            None
        };

        let attempts = settings.retry_count.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if !breaker.should_allow_call().await {
                return Err(BotkeeperError::CircuitOpen {
                    destination: format!("{bot_id}:{host}"),
                });
            }

            let request = self.build_request(
                method.clone(),
                parsed.clone(),
                body,
                &settings,
                idempotency_key.as_deref(),
            )?;

            let started = Instant::now();
            info!("[{bot_id}] Sending {method} request to {target_url} (attempt {attempt}/{attempts})");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(BotkeeperError::Cancelled),
                result = self.http.execute(request) => result,
            };

            match outcome {
                Ok(response) if response.status().is_success() => {
                    breaker.record_success().await;
                    info!(
                        "[{bot_id}] Received {} from {target_url} in {}ms",
                        response.status(),
                        started.elapsed().as_millis()
                    );

                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| BotkeeperError::network_error(e.to_string()))?;
                    if bytes.is_empty() {
                        return Ok(None);
                    }
                    debug!("[{bot_id}] Response body: {} bytes", bytes.len());
                    return Ok(Some(serde_json::from_slice(&bytes)?));
                }
                Ok(response) => {
                    breaker.record_failure().await;
                    warn!(
                        "[{bot_id}:{host}] Retry {attempt} due to status {}",
                        response.status()
                    );
                    last_error = Some(BotkeeperError::network_error(format!(
                        "{target_url} answered {}",
                        response.status()
                    )));
                }
                Err(e) => {
                    breaker.record_failure().await;
                    warn!("[{bot_id}:{host}] Retry {attempt} due to {e}");
                    last_error = Some(BotkeeperError::network_error(e.to_string()));
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(BotkeeperError::Cancelled),
                    _ = tokio::time::sleep(settings.retry_delay) => {}
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| BotkeeperError::network_error(format!("{target_url} unreachable"))))
    }

    /// Base URL configured for this bot, either specifically or through the
    /// global default.
    pub fn destination(&self, bot_id: &str) -> Option<String> {
        self.settings.for_bot(bot_id).base_url
    }

    /// Drops the stored idempotency key for `(bot_id, url)` so the next
    /// logical POST gets a fresh one.
    pub async fn reset_idempotency_key(&self, bot_id: &str, url: &str) {
        let mut keys = self.idempotency_keys.write().await;
        keys.remove(&format!("{bot_id}:{url}"));
    }

    fn build_request(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        settings: &BotHttpSettings,
        idempotency_key: Option<&str>,
    ) -> BotkeeperResult<reqwest::Request> {
        if settings.bearer_token.is_some() && settings.basic_auth.is_some() {
            return Err(BotkeeperError::config_error(
                "cannot use both bearer token and basic auth for the same bot request",
            ));
        }

        let mut builder = self.http.request(method, url);

        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(token) = &settings.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(creds) = &settings.basic_auth {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }

        let mut request = builder
            .build()
            .map_err(|e| BotkeeperError::network_error(e.to_string()))?;

        // custom headers go last so they win over anything set above
        if let Some(headers) = &settings.custom_headers {
            for (name, value) in headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    BotkeeperError::config_error(format!("invalid header name '{name}': {e}"))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    BotkeeperError::config_error(format!("invalid header value: {e}"))
                })?;
                request.headers_mut().insert(name, value);
            }
        }

        if let Some(key) = idempotency_key {
            request.headers_mut().insert(
                HeaderName::from_static(IDEMPOTENCY_HEADER),
                HeaderValue::from_str(key)
                    .map_err(|e| BotkeeperError::Internal(e.to_string()))?,
            );
        }

        Ok(request)
    }

    async fn breaker_for(
        &self,
        bot_id: &str,
        host: &str,
        settings: &BotHttpSettings,
    ) -> Arc<CircuitBreaker> {
        let key = format!("{bot_id}:{host}");
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(&key) {
                return Arc::clone(breaker);
            }
        }
        let mut breakers = self.breakers.write().await;
        Arc::clone(breakers.entry(key).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                settings.circuit_breaker_failures,
                settings.circuit_breaker_open_duration,
            ))
        }))
    }

    async fn idempotency_key_for(&self, bot_id: &str, url: &str) -> String {
        let key = format!("{bot_id}:{url}");
        {
            let keys = self.idempotency_keys.read().await;
            if let Some(token) = keys.get(&key) {
                return token.clone();
            }
        }
        let mut keys = self.idempotency_keys.write().await;
        keys.entry(key)
            .or_insert_with(|| Uuid::new_v4().simple().to_string())
            .clone()
    }
}
