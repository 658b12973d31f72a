use newapi_types::{
    ErrorCategory, SidecarError, SidecarResult, DEFAULT_CRASH_TAIL_LINES, DEFAULT_GRACE_PERIOD_MS,
    DEFAULT_LOG_CAPACITY, DEFAULT_PORT, DEFAULT_READINESS_ATTEMPTS, DEFAULT_READINESS_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::classifier::{Locale, Pattern, SignatureRule};
use crate::env::LaunchMode;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_READINESS_ATTEMPTS,
            interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            request_timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Extra stderr signature, checked after the built-in ones. Matches when any
/// of the phrases appears.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub category: ErrorCategory,
    pub any: Vec<String>,
}

impl SignatureConfig {
    pub fn to_rule(&self) -> SignatureRule {
        let pattern = Pattern::Any(self.any.iter().cloned().map(Pattern::contains).collect());
        SignatureRule::new(self.category, pattern)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub port: u16,
    pub mode: LaunchMode,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub data_dir: Option<PathBuf>,
    pub readiness: ReadinessConfig,
    pub shutdown: ShutdownConfig,
    pub log_capacity: usize,
    pub crash_tail_lines: usize,
    pub kill_on_readiness_timeout: bool,
    pub locale: Locale,
    pub signatures: Vec<SignatureConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mode: LaunchMode::default(),
            executable: None,
            args: Vec::new(),
            data_dir: None,
            readiness: ReadinessConfig::default(),
            shutdown: ShutdownConfig::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            crash_tail_lines: DEFAULT_CRASH_TAIL_LINES,
            kill_on_readiness_timeout: true,
            locale: Locale::default(),
            signatures: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> SidecarResult<()> {
        if self.port == 0 {
            return Err(SidecarError::Config("Backend port cannot be 0".into()));
        }

        if self.log_capacity == 0 {
            return Err(SidecarError::Config("log_capacity must be at least 1".into()));
        }

        if self.readiness.max_attempts == 0 {
            return Err(SidecarError::Config(
                "readiness.max_attempts must be at least 1".into(),
            ));
        }

        if self.readiness.interval_ms == 0 {
            return Err(SidecarError::Config(
                "readiness.interval_ms must be greater than 0".into(),
            ));
        }

        if self.readiness.request_timeout_ms == 0 {
            return Err(SidecarError::Config(
                "readiness.request_timeout_ms must be greater than 0".into(),
            ));
        }

        for signature in &self.signatures {
            if signature.any.is_empty() || signature.any.iter().any(|p| p.trim().is_empty()) {
                return Err(SidecarError::Config(format!(
                    "Signature for {} needs at least one non-empty phrase",
                    signature.category
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SupervisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_capacity, 100);
        assert_eq!(config.crash_tail_lines, 20);
        assert_eq!(config.readiness.max_attempts, 30);
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = SupervisorConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = SupervisorConfig::default();
        config.log_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SupervisorConfig::default();
        config.readiness.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SupervisorConfig::default();
        config.readiness.request_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(SidecarError::Config(_))));

        let mut config = SupervisorConfig::default();
        config.signatures.push(SignatureConfig {
            category: ErrorCategory::MissingFile,
            any: vec![" ".to_string()],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signatures_from_json() {
        let config: SupervisorConfig = serde_json::from_str(
            r#"{"signatures": [{"category": "network-unreachable", "any": ["Redis Timeout"]}]}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let rule = config.signatures[0].to_rule();
        assert_eq!(rule.category, ErrorCategory::NetworkUnreachable);
        assert!(rule.pattern.matches("redis timeout after 3s"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SupervisorConfig =
            serde_json::from_str(r#"{"port": 3100, "mode": "development", "locale": "zh"}"#).unwrap();
        assert_eq!(config.port, 3100);
        assert_eq!(config.mode, LaunchMode::Development);
        assert_eq!(config.locale, Locale::Zh);
        assert_eq!(config.readiness.max_attempts, 30);
        assert!(config.kill_on_readiness_timeout);
    }
}
