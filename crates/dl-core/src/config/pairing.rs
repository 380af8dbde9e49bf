use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_TERMINAL_CLOSE_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_RECOVERY_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RECOVERY_DEBOUNCE: Duration = Duration::from_secs(1);

const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Timing and budget for pairing sessions.
///
/// Passed to the session controller at construction; tests override fields
/// directly instead of touching globals.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingConfig {
    /// Cadence of `poll_status` calls.
    pub poll_interval: Duration,
    /// Charged polls allowed per code before it is replaced.
    pub max_attempts: u32,
    /// Cadence of the progress indicator.
    pub progress_interval: Duration,
    /// Delay between a code being issued and the first poll.
    pub settle_delay: Duration,
    /// How long a terminal outcome stays visible before the session closes.
    pub terminal_close_delay: Duration,
    pub recovery_check_interval: Duration,
    pub recovery_debounce: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            terminal_close_delay: DEFAULT_TERMINAL_CLOSE_DELAY,
            recovery_check_interval: DEFAULT_RECOVERY_CHECK_INTERVAL,
            recovery_debounce: DEFAULT_RECOVERY_DEBOUNCE,
        }
    }
}

impl PairingConfig {
    /// Validity window of one code: `poll_interval × max_attempts`.
    pub fn budget_window(&self) -> Duration {
        self.poll_interval * self.max_attempts.max(1)
    }

    /// Fraction of the budget window covered by one progress tick.
    pub fn progress_step(&self) -> f64 {
        let window = self.budget_window().as_secs_f64();
        if window <= 0.0 {
            return 1.0;
        }
        (self.progress_interval.as_secs_f64() / window).min(1.0)
    }

    /// Raise every timer period to at least 1 ms and `max_attempts` to at
    /// least 1. Delays (`settle_delay`, `terminal_close_delay`,
    /// `recovery_debounce`) may stay zero.
    pub fn normalized(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_TIMER_PERIOD),
            max_attempts: self.max_attempts.max(1),
            progress_interval: self.progress_interval.max(MIN_TIMER_PERIOD),
            recovery_check_interval: self.recovery_check_interval.max(MIN_TIMER_PERIOD),
            ..self
        }
    }

    /// Create PairingConfig from the `[pairing]` table of a TOML document.
    ///
    /// Missing keys keep their defaults. The result is [`normalized`](Self::normalized).
    pub fn from_toml(toml_value: &toml::Value) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let table = toml_value.get("pairing");
        let millis = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match table.and_then(|t| t.get(key)) {
                None => Ok(default),
                Some(value) => {
                    let ms = value
                        .as_integer()
                        .ok_or_else(|| anyhow::anyhow!("pairing.{key} must be an integer"))?;
                    let ms = u64::try_from(ms)
                        .map_err(|_| anyhow::anyhow!("pairing.{key} must not be negative"))?;
                    Ok(Duration::from_millis(ms))
                }
            }
        };

        let max_attempts = match table.and_then(|t| t.get("max_attempts")) {
            None => defaults.max_attempts,
            Some(value) => {
                let n = value
                    .as_integer()
                    .ok_or_else(|| anyhow::anyhow!("pairing.max_attempts must be an integer"))?;
                u32::try_from(n.max(0))
                    .map_err(|_| anyhow::anyhow!("pairing.max_attempts is out of range"))?
            }
        };

        Ok(Self {
            poll_interval: millis("poll_interval_ms", defaults.poll_interval)?,
            max_attempts,
            progress_interval: millis("progress_interval_ms", defaults.progress_interval)?,
            settle_delay: millis("settle_delay_ms", defaults.settle_delay)?,
            terminal_close_delay: millis(
                "terminal_close_delay_ms",
                defaults.terminal_close_delay,
            )?,
            recovery_check_interval: millis(
                "recovery_check_interval_ms",
                defaults.recovery_check_interval,
            )?,
            recovery_debounce: millis("recovery_debounce_ms", defaults.recovery_debounce)?,
        }
        .normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toml::Value;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PairingConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.budget_window(), Duration::from_secs(30));
    }

    #[test]
    fn test_progress_step_covers_window() {
        let config = PairingConfig {
            poll_interval: Duration::from_millis(1000),
            max_attempts: 2,
            progress_interval: Duration::from_millis(100),
            ..PairingConfig::default()
        };
        assert!((config.progress_step() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_from_toml_missing_table_uses_defaults() {
        let toml_value: Value = toml::from_str("").unwrap();
        let config = PairingConfig::from_toml(&toml_value).unwrap();
        assert_eq!(config, PairingConfig::default());
    }

    #[test]
    fn test_from_toml_reads_overrides() {
        let toml_str = r#"
            [pairing]
            poll_interval_ms = 500
            max_attempts = 3
            terminal_close_delay_ms = 0
        "#;
        let toml_value: Value = toml::from_str(toml_str).unwrap();

        let config = PairingConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.terminal_close_delay, Duration::ZERO);
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_from_toml_clamps_zero_values() {
        let toml_str = r#"
            [pairing]
            poll_interval_ms = 0
            max_attempts = 0
        "#;
        let toml_value: Value = toml::from_str(toml_str).unwrap();

        let config = PairingConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_normalized_raises_zero_periods_only() {
        let config = PairingConfig {
            poll_interval: Duration::ZERO,
            max_attempts: 0,
            progress_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            terminal_close_delay: Duration::ZERO,
            recovery_check_interval: Duration::ZERO,
            recovery_debounce: Duration::ZERO,
        }
        .normalized();

        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.progress_interval, Duration::from_millis(1));
        assert_eq!(config.recovery_check_interval, Duration::from_millis(1));
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.terminal_close_delay, Duration::ZERO);
        assert_eq!(config.recovery_debounce, Duration::ZERO);
    }

    #[test]
    fn test_normalized_keeps_valid_config() {
        assert_eq!(PairingConfig::default().normalized(), PairingConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_wrong_types() {
        let toml_str = r#"
            [pairing]
            poll_interval_ms = "fast"
        "#;
        let toml_value: Value = toml::from_str(toml_str).unwrap();

        assert!(PairingConfig::from_toml(&toml_value).is_err());
    }
}
