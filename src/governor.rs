//! Throttle/Backoff Governor
//!
//! Paces requests per source with a randomized delay window, widens the
//! window after hostile responses and circuit-breaks a source once hostile
//! outcomes keep coming. Sleeping goes through an injectable [`Sleeper`] so
//! escalation can be tested without wall-clock delays.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ThrottleConfig;
use crate::outcome::Outcome;
use crate::sources::SourceId;

/// Inclusive `[min, max]` delay range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DelayWindow {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms.min(max_ms)),
            max: Duration::from_millis(max_ms.max(min_ms)),
        }
    }

    pub fn width(&self) -> Duration {
        self.max.saturating_sub(self.min)
    }

    /// Both bounds multiplied by `factor`, each capped at `cap`
    pub fn escalated(&self, factor: f64, cap: Duration) -> Self {
        let scale = |d: Duration| {
            let scaled = Duration::from_secs_f64(d.as_secs_f64() * factor);
            scaled.min(cap).max(d)
        };
        Self {
            min: scale(self.min),
            max: scale(self.max),
        }
    }

    /// True when this window reaches further than `other` and starts no earlier
    pub fn is_wider_than(&self, other: &DelayWindow) -> bool {
        self.max > other.max && self.min >= other.min
    }
}

/// Sleep function used between requests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<std::sync::Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Escalation and circuit-breaker policy shared by all sources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorPolicy {
    pub escalation_factor: f64,
    pub max_delay: Duration,
    pub circuit_breaker_threshold: u32,
}

impl GovernorPolicy {
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self {
            escalation_factor: config.escalation_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            circuit_breaker_threshold: config.circuit_breaker_threshold,
        }
    }
}

#[derive(Debug, Clone)]
struct SourceState {
    baseline: DelayWindow,
    current: DelayWindow,
    consecutive_hostile: u32,
    hostile_total: u32,
    requests: u64,
    circuit_open: bool,
    /// Most recent hostile outcome, reported for skipped requests once the circuit opens
    last_hostile: Option<Outcome>,
}

impl SourceState {
    fn new(baseline: DelayWindow) -> Self {
        Self {
            baseline,
            current: baseline,
            consecutive_hostile: 0,
            hostile_total: 0,
            requests: 0,
            circuit_open: false,
            last_hostile: None,
        }
    }
}

/// Per-source throttle snapshot for run summaries
#[derive(Debug, Clone, PartialEq)]
pub struct SourceThrottleStatus {
    pub source: SourceId,
    pub baseline: DelayWindow,
    pub current: DelayWindow,
    pub requests: u64,
    pub hostile_total: u32,
    pub circuit_open: bool,
}

/// Single-owner governor state
pub struct Governor {
    policy: GovernorPolicy,
    states: HashMap<SourceId, SourceState>,
    rng: StdRng,
}

impl Governor {
    pub fn new(policy: GovernorPolicy, baselines: &[(SourceId, DelayWindow)], rng: StdRng) -> Self {
        let states = baselines
            .iter()
            .map(|(source, window)| (*source, SourceState::new(*window)))
            .collect();
        Self { policy, states, rng }
    }

    pub fn from_config(config: &ThrottleConfig, rng: StdRng) -> Self {
        let baselines: Vec<(SourceId, DelayWindow)> = SourceId::PRECEDENCE
            .iter()
            .map(|source| {
                let window = config.window_for(*source);
                (*source, DelayWindow::from_millis(window.min_ms, window.max_ms))
            })
            .collect();
        Self::new(GovernorPolicy::from_config(config), &baselines, rng)
    }

    fn state(&mut self, source: SourceId) -> &mut SourceState {
        self.states
            .entry(source)
            .or_insert_with(|| SourceState::new(DelayWindow::from_millis(0, 0)))
    }

    /// Sample the next delay for a source from its current window
    pub fn sample_delay(&mut self, source: SourceId) -> Duration {
        let window = {
            let state = self.state(source);
            state.requests += 1;
            state.current
        };
        let min = window.min.as_millis() as u64;
        let max = window.max.as_millis() as u64;
        if max <= min {
            return window.min;
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Update escalation and circuit state after a request
    pub fn on_outcome(&mut self, source: SourceId, outcome: Outcome) {
        let policy = self.policy;
        let state = self.state(source);

        if outcome.is_hostile() {
            state.consecutive_hostile += 1;
            state.hostile_total += 1;
            state.last_hostile = Some(outcome);
            let previous = state.current;
            state.current = previous.escalated(policy.escalation_factor, policy.max_delay);
            warn!(
                "{} returned {}; delay window widened from {:?}-{:?} to {:?}-{:?}",
                source, outcome, previous.min, previous.max, state.current.min, state.current.max
            );

            if !state.circuit_open && state.consecutive_hostile >= policy.circuit_breaker_threshold {
                state.circuit_open = true;
                warn!(
                    "{} circuit-broken after {} consecutive hostile responses; skipping it for the rest of the run",
                    source, state.consecutive_hostile
                );
            }
        } else if outcome != Outcome::NetworkError {
            if state.consecutive_hostile > 0 {
                debug!("{} answered normally; hostile streak reset", source);
            }
            state.consecutive_hostile = 0;
        }
    }

    pub fn is_circuit_broken(&self, source: SourceId) -> bool {
        self.states.get(&source).map(|s| s.circuit_open).unwrap_or(false)
    }

    /// The hostile outcome that opened the circuit, or `None` while it is closed
    pub fn circuit_outcome(&self, source: SourceId) -> Option<Outcome> {
        self.states
            .get(&source)
            .filter(|s| s.circuit_open)
            .map(|s| s.last_hostile.unwrap_or(Outcome::Blocked))
    }

    pub fn current_window(&self, source: SourceId) -> Option<DelayWindow> {
        self.states.get(&source).map(|s| s.current)
    }

    pub fn baseline_window(&self, source: SourceId) -> Option<DelayWindow> {
        self.states.get(&source).map(|s| s.baseline)
    }

    pub fn snapshot(&self) -> Vec<SourceThrottleStatus> {
        let mut statuses: Vec<SourceThrottleStatus> = self
            .states
            .iter()
            .map(|(source, state)| SourceThrottleStatus {
                source: *source,
                baseline: state.baseline,
                current: state.current,
                requests: state.requests,
                hostile_total: state.hostile_total,
                circuit_open: state.circuit_open,
            })
            .collect();
        statuses.sort_by_key(|s| s.source);
        statuses
    }
}

/// Cloneable handle used by adapters and the orchestrator
#[derive(Clone)]
pub struct SharedGovernor {
    inner: Arc<Mutex<Governor>>,
    sleeper: Arc<dyn Sleeper>,
}

impl SharedGovernor {
    pub fn new(governor: Governor, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(governor)),
            sleeper,
        }
    }

    /// Governor with real sleeps and an entropy-seeded RNG
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            Governor::from_config(config, StdRng::from_entropy()),
            Arc::new(TokioSleeper),
        )
    }

    /// Governor with an injected sleeper and a fixed seed
    pub fn with_sleeper(config: &ThrottleConfig, sleeper: Arc<dyn Sleeper>, seed: u64) -> Self {
        Self::new(Governor::from_config(config, StdRng::seed_from_u64(seed)), sleeper)
    }

    /// Sleep for a delay sampled from the source's current window.
    ///
    /// The state lock is released before sleeping.
    pub async fn wait_before(&self, source: SourceId) -> Duration {
        let delay = {
            let mut governor = self.inner.lock().await;
            governor.sample_delay(source)
        };
        debug!("Waiting {:?} before {} request", delay, source);
        self.sleeper.sleep(delay).await;
        delay
    }

    pub async fn on_outcome(&self, source: SourceId, outcome: Outcome) {
        let mut governor = self.inner.lock().await;
        governor.on_outcome(source, outcome);
    }

    pub async fn is_circuit_broken(&self, source: SourceId) -> bool {
        self.inner.lock().await.is_circuit_broken(source)
    }

    pub async fn circuit_outcome(&self, source: SourceId) -> Option<Outcome> {
        self.inner.lock().await.circuit_outcome(source)
    }

    pub async fn current_window(&self, source: SourceId) -> Option<DelayWindow> {
        self.inner.lock().await.current_window(source)
    }

    pub async fn baseline_window(&self, source: SourceId) -> Option<DelayWindow> {
        self.inner.lock().await.baseline_window(source)
    }

    pub async fn snapshot(&self) -> Vec<SourceThrottleStatus> {
        self.inner.lock().await.snapshot()
    }

    pub async fn circuit_broken_sources(&self) -> Vec<SourceId> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|s| s.circuit_open)
            .map(|s| s.source)
            .collect()
    }

    /// Log the effective pacing configuration
    pub async fn log_config(&self) {
        for status in self.snapshot().await {
            info!(
                "Throttle {}: {:?}-{:?} between requests",
                status.source, status.baseline.min, status.baseline.max
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(threshold: u32) -> GovernorPolicy {
        GovernorPolicy {
            escalation_factor: 2.0,
            max_delay: Duration::from_secs(60),
            circuit_breaker_threshold: threshold,
        }
    }

    fn governor(threshold: u32) -> Governor {
        Governor::new(
            policy(threshold),
            &[
                (SourceId::ProfessionalNetwork, DelayWindow::from_millis(8000, 15000)),
                (SourceId::CompanyWebsite, DelayWindow::from_millis(1000, 3000)),
            ],
            StdRng::seed_from_u64(5),
        )
    }

    #[test]
    fn test_samples_stay_inside_window() {
        let mut g = governor(3);
        for _ in 0..500 {
            let d = g.sample_delay(SourceId::CompanyWebsite);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(3000), "{:?}", d);
        }
    }

    #[test]
    fn test_blocked_widens_window_strictly() {
        let mut g = governor(5);
        let baseline = g.baseline_window(SourceId::CompanyWebsite).unwrap();
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        let widened = g.current_window(SourceId::CompanyWebsite).unwrap();
        assert!(widened.is_wider_than(&baseline));
        assert_eq!(widened, DelayWindow::from_millis(2000, 6000));

        // other sources untouched
        assert_eq!(
            g.current_window(SourceId::ProfessionalNetwork),
            g.baseline_window(SourceId::ProfessionalNetwork)
        );
    }

    #[test]
    fn test_escalation_is_capped() {
        let mut g = governor(100);
        for _ in 0..20 {
            g.on_outcome(SourceId::ProfessionalNetwork, Outcome::RateLimited);
        }
        let window = g.current_window(SourceId::ProfessionalNetwork).unwrap();
        assert_eq!(window.max, Duration::from_secs(60));
        assert!(window.min <= window.max);
    }

    #[test]
    fn test_window_stays_widened_after_success() {
        let mut g = governor(5);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Success);
        let window = g.current_window(SourceId::CompanyWebsite).unwrap();
        assert_eq!(window, DelayWindow::from_millis(2000, 6000));
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let mut g = governor(2);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        assert!(!g.is_circuit_broken(SourceId::CompanyWebsite));
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        assert!(g.is_circuit_broken(SourceId::CompanyWebsite));
        assert!(!g.is_circuit_broken(SourceId::ProfessionalNetwork));
    }

    #[test]
    fn test_circuit_outcome_reports_latest_hostile_response() {
        let mut g = governor(2);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        assert_eq!(g.circuit_outcome(SourceId::CompanyWebsite), None);

        g.on_outcome(SourceId::CompanyWebsite, Outcome::RateLimited);
        assert_eq!(g.circuit_outcome(SourceId::CompanyWebsite), Some(Outcome::RateLimited));
        assert_eq!(g.circuit_outcome(SourceId::ProfessionalNetwork), None);
    }

    #[test]
    fn test_non_hostile_outcome_resets_streak() {
        let mut g = governor(2);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::NotFound);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        assert!(!g.is_circuit_broken(SourceId::CompanyWebsite));
    }

    #[test]
    fn test_network_error_neither_counts_nor_resets() {
        let mut g = governor(2);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::RateLimited);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::NetworkError);
        g.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked);
        assert!(g.is_circuit_broken(SourceId::CompanyWebsite));
    }

    #[tokio::test]
    async fn test_wait_before_uses_injected_sleeper() {
        let sleeper = RecordingSleeper::new();
        let shared = SharedGovernor::new(governor(3), Arc::new(sleeper.clone()));

        let first = shared.wait_before(SourceId::CompanyWebsite).await;
        shared.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked).await;
        let second = shared.wait_before(SourceId::CompanyWebsite).await;

        assert_eq!(sleeper.durations(), vec![first, second]);
        assert!(second >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_after_n_blocked_next_sample_exceeds_baseline_range() {
        let sleeper = RecordingSleeper::new();
        let shared = SharedGovernor::new(governor(10), Arc::new(sleeper));
        for _ in 0..3 {
            shared.on_outcome(SourceId::CompanyWebsite, Outcome::Blocked).await;
        }
        let baseline = shared.baseline_window(SourceId::CompanyWebsite).await.unwrap();
        let current = shared.current_window(SourceId::CompanyWebsite).await.unwrap();
        assert!(current.is_wider_than(&baseline));
        assert!(current.width() > baseline.width());
        let delay = shared.wait_before(SourceId::CompanyWebsite).await;
        assert!(delay >= current.min && delay <= current.max);
    }

    #[tokio::test]
    async fn test_circuit_broken_sources_listed() {
        let shared = SharedGovernor::new(governor(1), Arc::new(RecordingSleeper::new()));
        shared.on_outcome(SourceId::ProfessionalNetwork, Outcome::Blocked).await;
        assert_eq!(
            shared.circuit_broken_sources().await,
            vec![SourceId::ProfessionalNetwork]
        );
    }
}
