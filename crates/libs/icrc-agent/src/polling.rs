use std::time::Duration;

use serde::Deserialize;

/// Backoff used while polling `read_state` for an accepted call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollStrategy {
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Growth factor between polls. Values below 1 or not finite are
    /// refused when read from a config and treated as 1 otherwise.
    #[serde(deserialize_with = "multiplier")]
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for PollStrategy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            multiplier: 1.2,
            max_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl PollStrategy {
    pub fn backoff(&self) -> Backoff {
        Backoff { strategy: self.clone(), next: self.initial_delay, waited: Duration::ZERO }
    }

    fn growth(&self) -> f64 {
        if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        }
    }
}

fn multiplier<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 1.0 {
        return Err(serde::de::Error::custom(format!(
            "poll multiplier must be a finite number >= 1, got {value}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: PollStrategy,
    next: Duration,
    waited: Duration,
}

impl Backoff {
    /// Delay before the next poll, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.waited >= self.strategy.timeout {
            return None;
        }
        let delay = self.next.min(self.strategy.timeout - self.waited);
        self.waited += delay;
        let max_delay = self.strategy.max_delay;
        self.next = Duration::try_from_secs_f64(self.next.as_secs_f64() * self.strategy.growth())
            .map_or(max_delay, |next| next.min(max_delay));
        Some(delay)
    }
}

pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
