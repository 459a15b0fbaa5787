//! Fixed-rate oracle
//!
//! Serves a settable exchange rate. Suitable for development, testing, and
//! deployments where the rate is administered out of band. A real feed
//! implements the same trait behind the same seam.

use agoranet_core::{AgoranetError, AgoranetResult, Rate, RateOracle, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

/// Maximum age of the last observation before the rate is considered stale
const DEFAULT_STALENESS_MS: u64 = 24 * 60 * 60 * 1000;

/// A rate oracle serving a fixed, settable exchange rate
pub struct FixedRateOracle {
    inner: RwLock<Observation>,
    staleness_ms: u64,
}

struct Observation {
    rate: Rate,
    updated_at: Timestamp,
}

impl FixedRateOracle {
    /// Create an oracle with the given rate, observed now
    pub fn new(rate: Rate) -> Self {
        Self {
            inner: RwLock::new(Observation {
                rate,
                updated_at: Timestamp::now(),
            }),
            staleness_ms: DEFAULT_STALENESS_MS,
        }
    }

    /// Create an oracle with a custom staleness threshold
    pub fn with_staleness(rate: Rate, staleness_ms: u64) -> Self {
        Self {
            inner: RwLock::new(Observation {
                rate,
                updated_at: Timestamp::now(),
            }),
            staleness_ms,
        }
    }

    /// Replace the served rate
    pub fn set_rate(&self, rate: Rate) {
        if rate.is_zero() {
            warn!("fixed oracle: rate set to zero, payment checks will fail");
        }
        let mut inner = self.inner.write();
        inner.rate = rate;
        inner.updated_at = Timestamp::now();
    }

    /// Current rate without staleness or zero checks
    pub fn raw_rate(&self) -> Rate {
        self.inner.read().rate
    }
}

#[async_trait]
impl RateOracle for FixedRateOracle {
    async fn latest_rate(&self) -> AgoranetResult<Rate> {
        let inner = self.inner.read();

        if inner.rate.is_zero() {
            return Err(AgoranetError::RateUnavailable("rate is zero".to_string()));
        }

        let age = Timestamp::now()
            .as_millis()
            .saturating_sub(inner.updated_at.as_millis());
        if age > self.staleness_ms {
            return Err(AgoranetError::RateUnavailable(format!(
                "observation is {}ms old, threshold {}ms",
                age, self.staleness_ms
            )));
        }

        Ok(inner.rate)
    }
}
