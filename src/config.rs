//! Configuration types.
//!
//! Loaded from a JSON file (field names follow the camelCase keys users
//! already write for the game bot), then overlaid with environment variables.
//! The chat token is only ever read from the environment.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::mudae::{KakeraType, ROLL_COMMANDS};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/automudae.json";

/// Full agent configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub roll: RollConfig,
    pub claim: ClaimConfig,
    pub kakera_react: KakeraReactConfig,
    pub correlation: CorrelationConfig,
    pub limits: RateLimitConfig,
}

/// Where to play.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    #[serde(skip, default = "empty_token")]
    pub token: SecretString,
    pub channel_id: u64,
    pub game_bot_id: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token: empty_token(),
            channel_id: 0,
            game_bot_id: 0,
        }
    }
}

/// When and what to roll.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollConfig {
    pub command: String,
    #[serde(alias = "doNotRollWhenCanotClaim")]
    pub do_not_roll_when_cannot_claim: bool,
    pub do_not_roll_when_cannot_kakera_react: bool,
    /// Minute of the hour at which the game resets rolls.
    #[serde(alias = "rollResetMinuteOffset")]
    pub reset_minute_offset: u32,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            command: "$wa".to_string(),
            do_not_roll_when_cannot_claim: true,
            do_not_roll_when_cannot_kakera_react: false,
            reset_minute_offset: 0,
        }
    }
}

/// One tier of claim rules. A roll qualifies if it matches any field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Criteria {
    /// Qualify rolls wished by the automated user.
    pub wish: bool,
    pub character: Vec<String>,
    pub series: Vec<String>,
    pub min_kakera: Option<u32>,
    /// Rolls matching the exception are excluded from this tier.
    pub exception: Option<Box<Criteria>>,
}

/// How wished rolls compete for the batch's best pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WishPriority {
    /// A wished roll always beats an unwished one.
    #[default]
    Always,
    /// A wished roll matching an early/late exception competes on value only.
    UnlessExcepted,
}

/// Claim tiers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimConfig {
    pub snipe: Criteria,
    pub early_claim: Criteria,
    pub late_claim: Criteria,
    pub wish_priority: WishPriority,
}

/// Kakera reaction rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KakeraReactConfig {
    /// Skip a roll offering this crystal while power is below the threshold.
    #[serde(alias = "doNotReactToKakeraTypeIfKakeraPowerLessThan")]
    pub min_power_by_type: BTreeMap<KakeraType, u8>,
    /// Never react to a roll offering any of these crystals.
    #[serde(alias = "doNotReactToKakeraTypes")]
    pub blocked_types: Vec<KakeraType>,
    /// Crystals collected immediately, without waiting for the batch.
    pub priority_types: Vec<KakeraType>,
}

impl Default for KakeraReactConfig {
    fn default() -> Self {
        Self {
            min_power_by_type: BTreeMap::new(),
            blocked_types: Vec::new(),
            priority_types: vec![KakeraType::Purple],
        }
    }
}

/// Where roll commands are looked up when correlating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorrelationSource {
    /// Commands observed on the inbound stream, consumed in order.
    #[default]
    Queue,
    /// Recent channel history.
    History,
}

/// Owner lookup for results that carry no direct reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrelationConfig {
    pub source: CorrelationSource,
    pub timeout_ms: u64,
    /// The search window grows to `timeout * k` for k in 1..=max_multiplier.
    pub max_multiplier: u32,
    /// Pause between widening attempts. Defaults to the timeout.
    pub retry_delay_ms: Option<u64>,
    pub queue_capacity: usize,
}

impl CorrelationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(self.timeout_ms))
    }

    /// Widest window ever searched.
    pub fn ceiling(&self) -> Duration {
        self.timeout() * self.max_multiplier
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            source: CorrelationSource::Queue,
            timeout_ms: 250,
            max_multiplier: 7,
            retry_delay_ms: None,
            queue_capacity: 64,
        }
    }
}

/// Outbound pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Minimum spacing between reactions and button clicks.
    pub react_interval_ms: u64,
    /// Minimum spacing between sent commands.
    pub command_interval_ms: u64,
}

impl RateLimitConfig {
    pub fn react_interval(&self) -> Duration {
        Duration::from_millis(self.react_interval_ms)
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            react_interval_ms: 250,
            command_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Load the file named by `AUTOMUDAE_CONFIG` (if present), apply env
    /// overrides and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("AUTOMUDAE_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        if let Ok(token) = std::env::var("AUTOMUDAE_TOKEN") {
            config.chat.token = SecretString::from(token);
        }
        if let Some(id) = env_u64("AUTOMUDAE_CHANNEL_ID")? {
            config.chat.channel_id = id;
        }
        if let Some(id) = env_u64("AUTOMUDAE_GAME_BOT_ID")? {
            config.chat.game_bot_id = id;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !ROLL_COMMANDS.contains(&self.roll.command.as_str()) {
            return Err(invalid(
                "roll.command",
                format!("must be one of {ROLL_COMMANDS:?}, got '{}'", self.roll.command),
            ));
        }
        if self.roll.reset_minute_offset >= 60 {
            return Err(invalid(
                "roll.resetMinuteOffset",
                format!("must be below 60, got {}", self.roll.reset_minute_offset),
            ));
        }
        for (kind, power) in &self.kakera_react.min_power_by_type {
            if *power > 100 {
                return Err(invalid(
                    "kakeraReact.minPowerByType",
                    format!("{kind} threshold {power} exceeds 100"),
                ));
            }
        }
        if self.correlation.timeout_ms == 0 {
            return Err(invalid("correlation.timeoutMs", "must be positive".into()));
        }
        if self.correlation.max_multiplier == 0 {
            return Err(invalid("correlation.maxMultiplier", "must be positive".into()));
        }
        if self.correlation.queue_capacity == 0 {
            return Err(invalid("correlation.queueCapacity", "must be positive".into()));
        }
        if self.chat.channel_id == 0 {
            return Err(invalid("chat.channelId", "must be set".into()));
        }
        if self.chat.game_bot_id == 0 {
            return Err(invalid("chat.gameBotId", "must be set".into()));
        }
        Ok(())
    }
}

fn empty_token() -> SecretString {
    SecretString::from(String::new())
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not an id: '{raw}'"),
        }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.chat.channel_id = 1;
        config.chat.game_bot_id = 2;
        config
    }

    #[test]
    fn defaults_are_conservative() {
        let config = AppConfig::default();
        assert_eq!(config.roll.command, "$wa");
        assert!(config.roll.do_not_roll_when_cannot_claim);
        assert!(config.claim.snipe.min_kakera.is_none());
        assert_eq!(config.kakera_react.priority_types, vec![KakeraType::Purple]);
        assert_eq!(config.correlation.ceiling(), Duration::from_millis(1750));
        assert_eq!(config.correlation.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn parses_camel_case_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "chat": {{"channelId": 10, "gameBotId": 20}},
                "roll": {{"command": "$wg", "doNotRollWhenCannotClaim": false, "rollResetMinuteOffset": 23}},
                "claim": {{
                    "snipe": {{"minKakera": 10000, "exception": {{"series": ["Bleach"]}}}},
                    "lateClaim": {{"wish": true, "minKakera": 200}},
                    "wishPriority": "unlessExcepted"
                }},
                "correlation": {{"source": "history", "timeoutMs": 500}},
                "kakeraReact": {{
                    "doNotReactToKakeraTypeIfKakeraPowerLessThan": {{"kakeraY": 60}},
                    "doNotReactToKakeraTypes": ["kakera"]
                }}
            }}"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.chat.channel_id, 10);
        assert_eq!(config.roll.command, "$wg");
        assert!(!config.roll.do_not_roll_when_cannot_claim);
        assert_eq!(config.roll.reset_minute_offset, 23);
        assert_eq!(config.claim.snipe.min_kakera, Some(10_000));
        let exception = config.claim.snipe.exception.as_ref().unwrap();
        assert_eq!(exception.series, vec!["Bleach".to_string()]);
        assert!(config.claim.late_claim.wish);
        assert_eq!(config.claim.wish_priority, WishPriority::UnlessExcepted);
        assert_eq!(
            config.kakera_react.min_power_by_type.get(&KakeraType::Yellow),
            Some(&60)
        );
        assert_eq!(config.kakera_react.blocked_types, vec![KakeraType::Blue]);
        assert_eq!(config.correlation.source, CorrelationSource::History);
        assert_eq!(config.correlation.timeout_ms, 500);
        assert_eq!(config.correlation.max_multiplier, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_kakera_type_fails_to_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kakeraReact": {{"blockedTypes": ["kakeraZ"]}}}}"#).unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            AppConfig::from_file(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn rejects_unknown_roll_command() {
        let mut config = valid();
        config.roll.command = "$tu".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_reset_minute() {
        let mut config = valid();
        config.roll.reset_minute_offset = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_power_threshold_over_100() {
        let mut config = valid();
        config
            .kakera_react
            .min_power_by_type
            .insert(KakeraType::Red, 101);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_correlation_window() {
        let mut config = valid();
        config.correlation.max_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn requires_channel_and_bot() {
        assert!(AppConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }
}
