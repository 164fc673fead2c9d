//! The admission decision: blocklist, then fixed-window counter, then sweep

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::block::BlockRules;
use crate::config::AdmissionConfig;
use crate::store::{CounterStore, Hit, InMemoryCounterStore, WindowKey};

/// Identity used when the caller cannot be identified.
pub const UNKNOWN_IDENTITY: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request; `remaining` slots are left in this window.
    Admit { remaining: u32 },
    /// Agent matched the blocklist.
    Blocked { pattern: String },
    /// Window limit reached; `retry_after` is the time until it resets.
    Throttled { retry_after: Duration },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Admit { .. } => "admitted",
            Decision::Blocked { .. } => "blocked",
            Decision::Throttled { .. } => "throttled",
        }
    }
}

pub struct AdmissionGate {
    window: Duration,
    limit: u32,
    rules: BlockRules,
    store: Arc<dyn CounterStore>,
}

impl AdmissionGate {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryCounterStore::new()))
    }

    pub fn with_store(config: &AdmissionConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            // A zero window would divide by zero; config validation rejects it
            window: config.window().max(Duration::from_millis(1)),
            limit: config.limit,
            rules: BlockRules::new(config.blocklist.iter().cloned()),
            store,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Counter entries currently held, including dead ones not yet swept.
    pub fn tracked(&self) -> usize {
        self.store.tracked()
    }

    /// Decide using the wall clock.
    pub fn check(&self, identity: &str, agent: &str) -> Decision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.check_at(identity, agent, now)
    }

    /// Decide as of `now` (time since the Unix epoch).
    pub fn check_at(&self, identity: &str, agent: &str, now: Duration) -> Decision {
        let identity = if identity.is_empty() {
            UNKNOWN_IDENTITY
        } else {
            identity
        };

        let decision = self.decide(identity, agent, now);
        let swept = self.store.sweep(now);
        if swept > 0 {
            debug!(swept, tracked = self.store.tracked(), "swept expired admission windows");
        }

        metrics::counter!("admission_decisions_total", "outcome" => decision.label()).increment(1);
        decision
    }

    fn decide(&self, identity: &str, agent: &str, now: Duration) -> Decision {
        if let Some(pattern) = self.rules.matching(agent) {
            warn!(identity, pattern, "blocked agent");
            return Decision::Blocked {
                pattern: pattern.to_owned(),
            };
        }

        let index = self.window_index(now);
        let reset_at = self.window_end(index);
        match self
            .store
            .hit(WindowKey::new(identity, index), self.limit, reset_at)
        {
            Hit::Counted { count } => Decision::Admit {
                remaining: self.limit.saturating_sub(count),
            },
            Hit::Exhausted { reset_at } => {
                let retry_after = reset_at.saturating_sub(now);
                warn!(
                    identity,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "rate limit reached"
                );
                Decision::Throttled { retry_after }
            }
        }
    }

    fn window_index(&self, now: Duration) -> u64 {
        u64::try_from(now.as_millis() / self.window.as_millis()).unwrap_or(u64::MAX)
    }

    fn window_end(&self, index: u64) -> Duration {
        let millis = self.window.as_millis().saturating_mul(u128::from(index) + 1);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0";
    const MINUTE: Duration = Duration::from_secs(60);

    fn gate(limit: u32) -> AdmissionGate {
        AdmissionGate::new(&AdmissionConfig {
            limit,
            ..AdmissionConfig::default()
        })
    }

    /// A window-aligned instant.
    fn t0() -> Duration {
        Duration::from_secs(1_700_000_000 / 60 * 60)
    }

    #[test]
    fn limit_admits_then_throttles_then_next_window_admits() {
        let gate = gate(100);
        let now = t0() + Duration::from_secs(5);

        for i in 0..100 {
            assert_eq!(
                gate.check_at("203.0.113.7", BROWSER, now),
                Decision::Admit { remaining: 99 - i }
            );
        }
        assert_eq!(
            gate.check_at("203.0.113.7", BROWSER, now),
            Decision::Throttled {
                retry_after: Duration::from_secs(55)
            }
        );

        assert!(matches!(
            gate.check_at("203.0.113.7", BROWSER, t0() + MINUTE),
            Decision::Admit { remaining: 99 }
        ));
    }

    #[test]
    fn throttled_requests_do_not_increment() {
        let store = Arc::new(InMemoryCounterStore::new());
        let gate = AdmissionGate::with_store(
            &AdmissionConfig {
                limit: 2,
                ..AdmissionConfig::default()
            },
            store.clone(),
        );
        let index = t0().as_secs() / 60;

        for _ in 0..10 {
            gate.check_at("198.51.100.2", BROWSER, t0());
        }
        assert_eq!(store.count(&WindowKey::new("198.51.100.2", index)), Some(2));
    }

    #[test]
    fn blocklisted_agent_is_rejected_regardless_of_counter() {
        let gate = gate(1);
        let bot = "Mozilla/5.0 (compatible; SemrushBot/7~bl; +http://www.semrush.com/bot.html)";

        // Fresh counter
        assert_eq!(
            gate.check_at("192.0.2.1", bot, t0()),
            Decision::Blocked {
                pattern: "SemrushBot".into()
            }
        );
        assert_eq!(gate.tracked(), 0, "blocked requests consume no capacity");

        // Exhausted counter
        gate.check_at("192.0.2.1", BROWSER, t0());
        assert!(matches!(
            gate.check_at("192.0.2.1", BROWSER, t0()),
            Decision::Throttled { .. }
        ));
        assert!(matches!(
            gate.check_at("192.0.2.1", bot, t0()),
            Decision::Blocked { .. }
        ));
    }

    #[test]
    fn rollover_sweep_removes_expired_entry() {
        let store = Arc::new(InMemoryCounterStore::new());
        let gate = AdmissionGate::with_store(&AdmissionConfig::default(), store.clone());
        let first = WindowKey::new("203.0.113.7", t0().as_secs() / 60);

        gate.check_at("203.0.113.7", BROWSER, t0());
        assert_eq!(store.count(&first), Some(1));

        // A different client's request after rollover still sweeps the old window
        gate.check_at("203.0.113.8", BROWSER, t0() + MINUTE);
        assert!(store.count(&first).is_none(), "expired window must be swept");
        assert_eq!(gate.tracked(), 1);

        // Same client in the new window gets a fresh key, old one stays gone
        gate.check_at("203.0.113.7", BROWSER, t0() + MINUTE);
        assert!(store.count(&first).is_none());
        assert_eq!(
            store.count(&WindowKey::new("203.0.113.7", first.index + 1)),
            Some(1)
        );
    }

    #[test]
    fn identities_have_separate_budgets() {
        let gate = gate(1);
        assert!(matches!(gate.check_at("a", BROWSER, t0()), Decision::Admit { .. }));
        assert!(matches!(gate.check_at("b", BROWSER, t0()), Decision::Admit { .. }));
        assert!(matches!(gate.check_at("a", BROWSER, t0()), Decision::Throttled { .. }));
    }

    #[test]
    fn empty_identity_shares_unknown_bucket() {
        let gate = gate(1);
        assert!(matches!(gate.check_at("", BROWSER, t0()), Decision::Admit { .. }));
        assert!(matches!(
            gate.check_at(UNKNOWN_IDENTITY, BROWSER, t0()),
            Decision::Throttled { .. }
        ));
    }

    #[test]
    fn window_end_is_next_boundary() {
        let gate = gate(100);
        let index = gate.window_index(t0() + Duration::from_secs(59));
        assert_eq!(gate.window_end(index), t0() + MINUTE);
    }

    #[test]
    fn wall_clock_check_admits() {
        let gate = gate(100);
        assert!(matches!(gate.check("127.0.0.1", BROWSER), Decision::Admit { remaining: 99 }));
    }
}
