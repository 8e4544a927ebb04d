use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use damwatch_core::rate_limiter::DEFAULT_COOLDOWN_SECS;
use damwatch_core::recipients::parse_recipient_list;
use damwatch_core::rules::{default_rules, parse_rule_file, AlertRule, DefaultThresholds};

/// A configuration value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to load alert rules from {path}: {reason}")]
    Rules { path: String, reason: String },
}

/// Monitor configuration loaded from environment variables.
///
/// Blank values are treated as unset.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    pub cooldown: chrono::Duration,
    pub authority_refresh_interval: Duration,
    /// How long shutdown waits for in-flight dispatches.
    pub shutdown_grace: Duration,
    /// Base URL of the HTTP alert service; `None` leaves the primary HTTP
    /// transport unconfigured.
    pub alert_service_url: Option<String>,
    /// Base URL of the remote authority list; `None` keeps the registry local.
    pub authority_service_url: Option<String>,
    /// Real-time channel endpoint; `None` disables mirroring.
    pub realtime_ws_url: Option<String>,
    pub authority_cache_path: PathBuf,
    /// Manually entered recipients used until a cache or remote list exists.
    pub authority_seed: Vec<String>,
    pub rules_path: Option<PathBuf>,
    pub thresholds: DefaultThresholds,
    /// Fixed seed for the simulated source; entropy when `None`.
    pub simulation_seed: Option<u64>,
    /// Command used to open `mailto:` URLs.
    pub compose_opener: Option<String>,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default              |
    /// |--------------------------|----------------------|
    /// | `TICK_INTERVAL_SECS`     | `3`                  |
    /// | `ALERT_COOLDOWN_SECS`    | `300`                |
    /// | `AUTHORITY_REFRESH_SECS` | `60`                 |
    /// | `SHUTDOWN_GRACE_SECS`    | `10`                 |
    /// | `ALERT_SERVICE_URL`      | unset                |
    /// | `AUTHORITY_SERVICE_URL`  | unset                |
    /// | `REALTIME_WS_URL`        | unset                |
    /// | `AUTHORITY_CACHE_PATH`   | `./authorities.json` |
    /// | `AUTHORITY_EMAILS`       | empty                |
    /// | `ALERT_RULES_PATH`       | unset                |
    /// | `THRESHOLD_WATER_LEVEL`  | `95`                 |
    /// | `THRESHOLD_SEISMIC`      | `0.9`                |
    /// | `THRESHOLD_VIBRATION`    | `3.0`                |
    /// | `THRESHOLD_CRACK_WIDTH`  | `0.35`               |
    /// | `SIMULATION_SEED`        | unset                |
    /// | `COMPOSE_OPENER`         | unset                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = DefaultThresholds::default();

        let tick_secs: u64 = parse_or(&get, "TICK_INTERVAL_SECS", 3)?;
        if tick_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TICK_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let refresh_secs: u64 = parse_or(&get, "AUTHORITY_REFRESH_SECS", 60)?;
        if refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "AUTHORITY_REFRESH_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let cooldown_secs: u32 = parse_or(&get, "ALERT_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS as u32)?;

        let thresholds = DefaultThresholds {
            water_level: parse_finite(&get, "THRESHOLD_WATER_LEVEL", defaults.water_level)?,
            seismic: parse_finite(&get, "THRESHOLD_SEISMIC", defaults.seismic)?,
            vibration: parse_finite(&get, "THRESHOLD_VIBRATION", defaults.vibration)?,
            crack_width: parse_finite(&get, "THRESHOLD_CRACK_WIDTH", defaults.crack_width)?,
        };

        let simulation_seed = match get("SIMULATION_SEED") {
            Some(_) => Some(parse_or(&get, "SIMULATION_SEED", 0u64)?),
            None => None,
        };

        Ok(Self {
            tick_interval: Duration::from_secs(tick_secs),
            cooldown: chrono::Duration::seconds(i64::from(cooldown_secs)),
            authority_refresh_interval: Duration::from_secs(refresh_secs),
            shutdown_grace: Duration::from_secs(parse_or(&get, "SHUTDOWN_GRACE_SECS", 10)?),
            alert_service_url: get("ALERT_SERVICE_URL"),
            authority_service_url: get("AUTHORITY_SERVICE_URL"),
            realtime_ws_url: get("REALTIME_WS_URL"),
            authority_cache_path: get("AUTHORITY_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./authorities.json")),
            authority_seed: get("AUTHORITY_EMAILS")
                .map(|raw| parse_recipient_list(&raw))
                .unwrap_or_default(),
            rules_path: get("ALERT_RULES_PATH").map(PathBuf::from),
            thresholds,
            simulation_seed,
            compose_opener: get("COMPOSE_OPENER"),
        })
    }

    /// The rule file when configured, otherwise the default rules built
    /// from [`thresholds`](Self::thresholds).
    pub fn load_rules(&self) -> Result<Vec<AlertRule>, ConfigError> {
        let Some(path) = &self.rules_path else {
            return Ok(default_rules(&self.thresholds));
        };
        let rules_err = |reason: String| ConfigError::Rules {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| rules_err(e.to_string()))?;
        parse_rule_file(&raw).map_err(|e| rules_err(e.to_string()))
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_finite<G>(get: &G, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_or(get, key, default)?;
    if !value.is_finite() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be a finite number".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = MonitorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(3));
        assert_eq!(config.cooldown, chrono::Duration::minutes(5));
        assert_eq!(config.authority_refresh_interval, Duration::from_secs(60));
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.thresholds, DefaultThresholds::default());
        assert_eq!(config.authority_cache_path, PathBuf::from("./authorities.json"));
        assert!(config.alert_service_url.is_none());
        assert!(config.simulation_seed.is_none());
        assert!(config.authority_seed.is_empty());
    }

    #[test]
    fn overrides_and_blank_values() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("ALERT_COOLDOWN_SECS", "60"),
            ("THRESHOLD_WATER_LEVEL", "90.5"),
            ("AUTHORITY_EMAILS", "a@x.gov, b@y.gov, a@x.gov"),
            ("ALERT_SERVICE_URL", "  "),
            ("SIMULATION_SEED", "42"),
        ]))
        .unwrap();
        assert_eq!(config.cooldown, chrono::Duration::seconds(60));
        assert_eq!(config.thresholds.water_level, 90.5);
        assert_eq!(config.authority_seed, vec!["a@x.gov", "b@y.gov"]);
        assert!(config.alert_service_url.is_none());
        assert_eq!(config.simulation_seed, Some(42));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = MonitorConfig::from_lookup(lookup(&[("TICK_INTERVAL_SECS", "fast")])).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { key: "TICK_INTERVAL_SECS", .. });
    }

    #[test]
    fn zero_tick_is_an_error() {
        assert!(MonitorConfig::from_lookup(lookup(&[("TICK_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn non_finite_threshold_is_an_error() {
        let err = MonitorConfig::from_lookup(lookup(&[("THRESHOLD_SEISMIC", "NaN")])).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { key: "THRESHOLD_SEISMIC", .. });
    }

    #[test]
    fn default_rules_follow_thresholds() {
        let config =
            MonitorConfig::from_lookup(lookup(&[("THRESHOLD_CRACK_WIDTH", "0.5")])).unwrap();
        let rules = config.load_rules().unwrap();
        assert_eq!(rules.len(), 4);
        assert_matches!(
            &rules[3].predicate,
            damwatch_core::rules::Predicate::Threshold(check) if check.threshold == 0.5
        );
    }

    #[test]
    fn rules_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"key": "tilt", "metric": "tilt", "threshold": 0.025, "severity": "medium"}]"#,
        )
        .unwrap();
        let config = MonitorConfig::from_lookup(lookup(&[(
            "ALERT_RULES_PATH",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        let rules = config.load_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].key, "tilt");
    }

    #[test]
    fn missing_rules_file_is_an_error() {
        let config = MonitorConfig::from_lookup(lookup(&[(
            "ALERT_RULES_PATH",
            "/nonexistent/rules.json",
        )]))
        .unwrap();
        assert_matches!(config.load_rules(), Err(ConfigError::Rules { .. }));
    }
}
