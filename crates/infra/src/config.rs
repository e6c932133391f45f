//! Ledger configuration.

use std::time::Duration;

use chrono::Duration as RetentionWindow;
use tracing::warn;

use bookstock_inventory::PartnerReturnPolicy;

use crate::retry::RetryPolicy;

pub const ENV_RETENTION_DAYS: &str = "BOOKSTOCK_RETENTION_DAYS";
pub const ENV_PARTNER_RETURN_POLICY: &str = "BOOKSTOCK_PARTNER_RETURN_POLICY";
pub const ENV_TX_MAX_RETRIES: &str = "BOOKSTOCK_TX_MAX_RETRIES";
pub const ENV_OPERATION_TIMEOUT_MS: &str = "BOOKSTOCK_OPERATION_TIMEOUT_MS";

const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Entries older than this can no longer be deleted, only corrected.
    pub retention_window: RetentionWindow,
    pub partner_return_policy: PartnerReturnPolicy,
    pub retry: RetryPolicy,
    /// Deadline for a whole ledger operation, retries included.
    pub operation_timeout: Option<Duration>,
    /// Label used when an operation names no source.
    pub default_source_label: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_window: RetentionWindow::days(DEFAULT_RETENTION_DAYS),
            partner_return_policy: PartnerReturnPolicy::default(),
            retry: RetryPolicy::default(),
            operation_timeout: None,
            default_source_label: "Central depot".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(days) = parse_var::<i64>(&lookup, ENV_RETENTION_DAYS) {
            match RetentionWindow::try_days(days) {
                Some(window) if days >= 0 => config.retention_window = window,
                Some(_) => warn!(key = ENV_RETENTION_DAYS, days, "negative retention window ignored"),
                None => warn!(key = ENV_RETENTION_DAYS, days, "retention window out of range"),
            }
        }

        if let Some(raw) = lookup(ENV_PARTNER_RETURN_POLICY) {
            match raw.parse::<PartnerReturnPolicy>() {
                Ok(policy) => config.partner_return_policy = policy,
                Err(err) => warn!(key = ENV_PARTNER_RETURN_POLICY, error = %err, "using default"),
            }
        }

        // Retries after the first attempt.
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_TX_MAX_RETRIES) {
            config.retry.max_attempts = retries.saturating_add(1);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_OPERATION_TIMEOUT_MS) {
            config.operation_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        config
    }

    pub fn with_partner_return_policy(mut self, policy: PartnerReturnPolicy) -> Self {
        self.partner_return_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "invalid configuration value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.retention_window, RetentionWindow::days(7));
        assert_eq!(config.partner_return_policy, PartnerReturnPolicy::LedgerOnly);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.operation_timeout, None);
        assert_eq!(config.default_source_label, "Central depot");
    }

    #[test]
    fn overrides_are_read_from_the_environment() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (ENV_RETENTION_DAYS, "14"),
            (ENV_PARTNER_RETURN_POLICY, "reintegrate"),
            (ENV_TX_MAX_RETRIES, "0"),
            (ENV_OPERATION_TIMEOUT_MS, "2500"),
        ]));

        assert_eq!(config.retention_window, RetentionWindow::days(14));
        assert_eq!(config.partner_return_policy, PartnerReturnPolicy::Reintegrate);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.operation_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (ENV_RETENTION_DAYS, "a week"),
            (ENV_PARTNER_RETURN_POLICY, "sometimes"),
            (ENV_TX_MAX_RETRIES, "-1"),
        ]));
        assert_eq!(config, LedgerConfig::default());

        let config = LedgerConfig::from_lookup(lookup(&[(ENV_RETENTION_DAYS, "999999999999999")]));
        assert_eq!(config, LedgerConfig::default());

        let config = LedgerConfig::from_lookup(lookup(&[(ENV_RETENTION_DAYS, "-3")]));
        assert_eq!(config, LedgerConfig::default());
    }
}
