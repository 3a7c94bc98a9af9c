use crate::application::advisor::cache::ResponseCache;
use crate::application::advisor::keys::MasterKey;
use crate::application::advisor::provider::{ProviderEndpoint, ProviderId};
use crate::application::advisor::rate_limiter::CallBudget;
use crate::application::advisor::schema::{self, AdvisorReport};
use crate::application::advisor::transport::{AdvisorTransport, ProviderRequest};
use crate::domain::errors::GatewayError;
use crate::infrastructure::observability::Metrics;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Active provider order, highest priority first.
    pub priority: Vec<ProviderId>,
    pub calls_per_minute: u32,
    /// Saturated budget: block until the window rolls, or fail fast.
    pub block_when_saturated: bool,
    /// Attempts per provider before moving down the priority list.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Cooldown applied to a key after a failed request.
    pub key_cooldown: Duration,
    pub cache_ttl: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Consecutive exhaustions before the gateway breaker opens.
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            priority: ProviderId::DEFAULT_PRIORITY.to_vec(),
            calls_per_minute: 60,
            block_when_saturated: false,
            max_attempts: 3,
            backoff_base: Duration::from_secs(4),
            backoff_cap: Duration::from_secs(10),
            key_cooldown: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(15 * 60),
            temperature: 0.2,
            max_tokens: 1000,
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    tripped_until: Option<Instant>,
}

/// Routes prompts to the first healthy provider in a priority list, with
/// per-key rate limiting, a process-wide call budget and response caching.
///
/// The gateway exclusively owns the provider registry; callers interact
/// only through [`AdvisorGateway::advise`].
pub struct AdvisorGateway {
    endpoints: Vec<ProviderEndpoint>,
    master: MasterKey,
    transport: Arc<dyn AdvisorTransport>,
    budget: CallBudget,
    cache: ResponseCache,
    breaker: Mutex<BreakerState>,
    rng: Arc<Mutex<StdRng>>,
    metrics: Option<Metrics>,
    config: GatewayConfig,
}

impl AdvisorGateway {
    pub fn new(
        endpoints: Vec<ProviderEndpoint>,
        master: MasterKey,
        transport: Arc<dyn AdvisorTransport>,
        rng: Arc<Mutex<StdRng>>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            budget: CallBudget::new(config.calls_per_minute, config.block_when_saturated),
            cache: ResponseCache::new(config.cache_ttl, 512),
            breaker: Mutex::new(BreakerState {
                consecutive_failures: 0,
                tripped_until: None,
            }),
            endpoints,
            master,
            transport,
            rng,
            metrics: None,
            config,
        }
    }

    /// Attach the metrics handle; calls are counted by provider and
    /// outcome, provider-breaker trips by scope.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Produce a validated recommendations report for `prompt` from the
    /// first healthy provider, or fail with the last provider error.
    ///
    /// A pinned provider is tried first; the remainder keep the default
    /// order. Cache hits bypass selection entirely and do not count
    /// against the call budget.
    pub async fn advise(
        &self,
        prompt: &str,
        pinned: Option<ProviderId>,
    ) -> Result<AdvisorReport, GatewayError> {
        if let Some(report) = self.cache.get(prompt) {
            debug!("AdvisorGateway: cache hit for prompt ({} bytes)", prompt.len());
            self.record_call("cache", "hit");
            return Ok(report);
        }

        self.check_breaker()?;
        self.budget.acquire().await?;

        let mut last_error: Option<GatewayError> = None;

        for provider in self.active_order(pinned) {
            let Some(endpoint) = self.endpoints.iter().find(|e| e.id == provider) else {
                continue;
            };
            let Some(key_index) = self.pick_key(endpoint) else {
                debug!("AdvisorGateway: no available key for {}", provider);
                continue;
            };

            match self.attempt_provider(endpoint, key_index, prompt).await {
                Ok(report) => {
                    endpoint.keys[key_index].mark_used();
                    self.record_success();
                    self.record_call(provider.as_str(), "ok");
                    self.cache.insert(prompt, report.clone());
                    info!(
                        "AdvisorGateway: {} returned {} recommendations",
                        provider,
                        report.recommendations.len()
                    );
                    return Ok(report);
                }
                Err(err) if !err.is_transient() => {
                    // Schema failures are not transient; no other provider
                    // would fare better with the same prompt.
                    warn!("AdvisorGateway: {} returned invalid response: {}", provider, err);
                    self.record_call(provider.as_str(), "invalid_response");
                    return Err(err);
                }
                Err(err) => {
                    warn!("AdvisorGateway: {} failed: {}", provider, err);
                    endpoint.keys[key_index].mark_rate_limited(self.config.key_cooldown);
                    self.record_call(provider.as_str(), "error");
                    last_error = Some(err);
                }
            }
        }

        self.record_failure();
        Err(GatewayError::Exhausted {
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no provider had an available key".to_string()),
        })
    }

    /// Pinned provider first, remainder in configured priority order.
    fn active_order(&self, pinned: Option<ProviderId>) -> Vec<ProviderId> {
        let mut order = Vec::with_capacity(self.config.priority.len());
        if let Some(p) = pinned {
            order.push(p);
        }
        for provider in &self.config.priority {
            if Some(*provider) != pinned {
                order.push(*provider);
            }
        }
        order
    }

    /// Shuffle the endpoint's keys and take the first not rate limited.
    fn pick_key(&self, endpoint: &ProviderEndpoint) -> Option<usize> {
        let mut indices: Vec<usize> = (0..endpoint.keys.len()).collect();
        {
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            indices.shuffle(&mut *rng);
        }
        indices.into_iter().find(|&i| endpoint.keys[i].is_available())
    }

    async fn attempt_provider(
        &self,
        endpoint: &ProviderEndpoint,
        key_index: usize,
        prompt: &str,
    ) -> Result<AdvisorReport, GatewayError> {
        let request = ProviderRequest {
            base_url: endpoint.base_url.clone(),
            model: endpoint.model.clone(),
            prompt: prompt.to_string(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut attempt = 0u32;
        loop {
            // Decrypt for this request span only; the plaintext goes out
            // of scope as soon as the call returns.
            let outcome = {
                let bearer = endpoint.keys[key_index]
                    .decrypt(&self.master)
                    .map_err(|e| GatewayError::Transport {
                        reason: format!("credential unusable: {}", e),
                    })?;
                self.transport.chat(&request, &bearer).await
            };

            match outcome {
                Ok(envelope) => {
                    let content = envelope.content()?;
                    let recommendations = schema::parse_recommendations(content)?;
                    return Ok(AdvisorReport {
                        provider: endpoint.id,
                        model: endpoint.model.clone(),
                        recommendations,
                    });
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        return Err(err);
                    }
                    let backoff = self
                        .config
                        .backoff_base
                        .saturating_mul(1 << (attempt - 1))
                        .min(self.config.backoff_cap);
                    debug!(
                        "AdvisorGateway: {} attempt {}/{} failed ({}), backing off {:?}",
                        endpoint.id, attempt, self.config.max_attempts, err, backoff
                    );
                    time::sleep(backoff).await;
                }
            }
        }
    }

    fn check_breaker(&self) -> Result<(), GatewayError> {
        let mut state = self.breaker.lock().expect("gateway breaker lock poisoned");
        if let Some(until) = state.tripped_until {
            let now = Instant::now();
            if now < until {
                return Err(GatewayError::BreakerOpen {
                    retry_in: until - now,
                });
            }
            state.tripped_until = None;
            state.consecutive_failures = 0;
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.breaker.lock().expect("gateway breaker lock poisoned");
        state.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut state = self.breaker.lock().expect("gateway breaker lock poisoned");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.breaker_threshold {
            warn!(
                "AdvisorGateway: breaker tripped after {} consecutive exhaustions, cooling down {:?}",
                state.consecutive_failures, self.config.breaker_cooldown
            );
            state.tripped_until = Some(Instant::now() + self.config.breaker_cooldown);
            if let Some(metrics) = &self.metrics {
                metrics
                    .breaker_trips_total
                    .with_label_values(&["provider"])
                    .inc();
            }
        }
    }

    fn record_call(&self, provider: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .advisor_calls_total
                .with_label_values(&[provider, outcome])
                .inc();
        }
    }

    pub fn key_error_count(&self, provider: ProviderId) -> u32 {
        self.endpoints
            .iter()
            .find(|e| e.id == provider)
            .map(|e| e.keys.iter().map(|k| k.error_count()).sum())
            .unwrap_or(0)
    }
}
