use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Outbound HTTP policy for one bot (or the global default).
///
/// Zero-valued numeric fields mean "inherit from the default", not
/// "zero retries" -- see [`BotHttpSettings::merged_over`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotHttpSettings {
    pub base_url: Option<String>,
    pub bearer_token: Option<String>,
    pub basic_auth: Option<BasicCredentials>,
    pub custom_headers: Option<HashMap<String, String>>,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub circuit_breaker_failures: u32,
    pub circuit_breaker_open_duration: Duration,
}

impl Default for BotHttpSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            bearer_token: None,
            basic_auth: None,
            custom_headers: None,
            retry_count: 3,
            retry_delay: Duration::from_secs(2),
            circuit_breaker_failures: 5,
            circuit_breaker_open_duration: Duration::from_secs(15),
        }
    }
}

impl BotHttpSettings {
    /// Field-by-field merge of this override on top of `default`. Options
    /// win when present, numeric fields win when non-zero.
    pub fn merged_over(&self, default: &BotHttpSettings) -> BotHttpSettings {
        BotHttpSettings {
            base_url: self.base_url.clone().or_else(|| default.base_url.clone()),
            bearer_token: self
                .bearer_token
                .clone()
                .or_else(|| default.bearer_token.clone()),
            basic_auth: self
                .basic_auth
                .clone()
                .or_else(|| default.basic_auth.clone()),
            custom_headers: self
                .custom_headers
                .clone()
                .or_else(|| default.custom_headers.clone()),
            retry_count: if self.retry_count != 0 {
                self.retry_count
            } else {
                default.retry_count
            },
            retry_delay: if !self.retry_delay.is_zero() {
                self.retry_delay
            } else {
                default.retry_delay
            },
            circuit_breaker_failures: if self.circuit_breaker_failures != 0 {
                self.circuit_breaker_failures
            } else {
                default.circuit_breaker_failures
            },
            circuit_breaker_open_duration: if !self.circuit_breaker_open_duration.is_zero() {
                self.circuit_breaker_open_duration
            } else {
                default.circuit_breaker_open_duration
            },
        }
    }
}

/// Global default plus per-bot overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotsHttpSettings {
    pub default: BotHttpSettings,
    pub bots: HashMap<String, BotHttpSettings>,
}

impl BotsHttpSettings {
    /// Resolved settings for one bot: its override merged over the default,
    /// or the default itself for unknown bots.
    pub fn for_bot(&self, bot_id: &str) -> BotHttpSettings {
        match self.bots.get(bot_id) {
            Some(overrides) => overrides.merged_over(&self.default),
            None => self.default.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_fields_inherit_default() {
        let default = BotHttpSettings {
            base_url: Some("https://hooks.example.com".to_string()),
            retry_count: 4,
            ..Default::default()
        };
        let overrides = BotHttpSettings {
            retry_count: 0,
            retry_delay: Duration::ZERO,
            circuit_breaker_failures: 0,
            circuit_breaker_open_duration: Duration::ZERO,
            ..Default::default()
        };

        let merged = overrides.merged_over(&default);
        assert_eq!(merged.retry_count, 4);
        assert_eq!(merged.retry_delay, Duration::from_secs(2));
        assert_eq!(merged.circuit_breaker_failures, 5);
        assert_eq!(
            merged.circuit_breaker_open_duration,
            Duration::from_secs(15)
        );
        assert_eq!(merged.base_url.as_deref(), Some("https://hooks.example.com"));
    }

    #[test]
    fn test_override_wins_when_set() {
        let default = BotHttpSettings::default();
        let overrides = BotHttpSettings {
            base_url: Some("https://other.example.com".to_string()),
            retry_count: 1,
            ..Default::default()
        };

        let merged = overrides.merged_over(&default);
        assert_eq!(merged.retry_count, 1);
        assert_eq!(merged.base_url.as_deref(), Some("https://other.example.com"));
    }

    #[test]
    fn test_unknown_bot_gets_default() {
        let mut settings = BotsHttpSettings::default();
        settings.bots.insert(
            "reminder".to_string(),
            BotHttpSettings {
                retry_count: 7,
                ..Default::default()
            },
        );

        assert_eq!(settings.for_bot("reminder").retry_count, 7);
        assert_eq!(settings.for_bot("unknown").retry_count, 3);
    }
}
