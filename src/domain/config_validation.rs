//! Configuration validation.
//!
//! Reads the INI sections through [`ConfigPort`] and validates them into typed
//! settings before a session starts.

use std::path::PathBuf;

use crate::domain::error::TradecheckError;
use crate::domain::order::split_symbol;
use crate::domain::session::SessionConfig;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    pub dir: PathBuf,
    pub gateway_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub data_dir: PathBuf,
    pub signals: PathBuf,
    pub initial_capital: f64,
    pub commission_per_lot: f64,
    /// Contract multiplier applied to fills and profit.
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub audit: AuditConfig,
    pub session: SessionConfig,
    pub replay: ReplayConfig,
    pub log_filter: String,
}

pub const DEFAULT_LOG_FILTER: &str = "info";

pub fn load_app_config(config: &dyn ConfigPort) -> Result<AppConfig, TradecheckError> {
    let audit = load_audit_config(config)?;
    let session = load_session_config(config, &audit.gateway_name)?;
    let replay = load_replay_config(config)?;
    Ok(AppConfig {
        audit,
        session,
        replay,
        log_filter: load_log_filter(config),
    })
}

pub fn load_audit_config(config: &dyn ConfigPort) -> Result<AuditConfig, TradecheckError> {
    let dir = require_string(config, "audit", "dir")?;
    let gateway_name = config
        .get_string("audit", "gateway_name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| SessionConfig::default().gateway_name);
    Ok(AuditConfig {
        dir: PathBuf::from(dir),
        gateway_name,
    })
}

pub fn load_session_config(
    config: &dyn ConfigPort,
    gateway_name: &str,
) -> Result<SessionConfig, TradecheckError> {
    let defaults = SessionConfig::default();

    let symbol = require_string(config, "session", "symbol")?;
    if split_symbol(&symbol).is_none() {
        return Err(invalid(
            "session",
            "symbol",
            "symbol must look like EXCHANGE.INSTRUMENT",
        ));
    }

    let daily = config.get_int("session", "daily_interval", defaults.daily_interval_secs as i64);
    let minute = config.get_int("session", "minute_interval", defaults.minute_interval_secs as i64);
    if minute <= 0 {
        return Err(invalid(
            "session",
            "minute_interval",
            "minute_interval must be positive",
        ));
    }
    if daily <= minute {
        return Err(invalid(
            "session",
            "daily_interval",
            "daily_interval must be longer than minute_interval",
        ));
    }

    let window = config.get_int("session", "recent_window_secs", defaults.recent_window_secs as i64);
    if window < 0 {
        return Err(invalid(
            "session",
            "recent_window_secs",
            "recent_window_secs must be non-negative",
        ));
    }

    let max_failures = config.get_int("session", "max_consecutive_failures", 0);
    let max_consecutive_failures = u32::try_from(max_failures).map_err(|_| {
        invalid(
            "session",
            "max_consecutive_failures",
            "max_consecutive_failures must be between 0 and 4294967295",
        )
    })?;

    Ok(SessionConfig {
        gateway_name: gateway_name.to_string(),
        symbol,
        daily_interval_secs: daily as u64,
        minute_interval_secs: minute as u64,
        recent_window_secs: window as u64,
        max_consecutive_failures,
    })
}

pub fn load_replay_config(config: &dyn ConfigPort) -> Result<ReplayConfig, TradecheckError> {
    let data_dir = require_string(config, "replay", "data_dir")?;
    let signals = require_string(config, "replay", "signals")?;

    let initial_capital = config.get_double("replay", "initial_capital", 1_000_000.0);
    if initial_capital <= 0.0 {
        return Err(invalid(
            "replay",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let commission_per_lot = config.get_double("replay", "commission_per_lot", 0.0);
    if commission_per_lot < 0.0 {
        return Err(invalid(
            "replay",
            "commission_per_lot",
            "commission_per_lot must be non-negative",
        ));
    }

    let multiplier = config.get_double("replay", "multiplier", 1.0);
    if multiplier <= 0.0 {
        return Err(invalid("replay", "multiplier", "multiplier must be positive"));
    }

    Ok(ReplayConfig {
        data_dir: PathBuf::from(data_dir),
        signals: PathBuf::from(signals),
        initial_capital,
        commission_per_lot,
        multiplier,
    })
}

pub fn load_log_filter(config: &dyn ConfigPort) -> String {
    config
        .get_string("logging", "filter")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn require_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, TradecheckError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(TradecheckError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> TradecheckError {
    TradecheckError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
