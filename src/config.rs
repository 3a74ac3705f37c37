use crate::model::{BracketVariant, SeedingPolicy};
use serde::{Deserialize, Serialize};
use std::{
  env, fs,
  path::{Path, PathBuf},
};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
  /// Directory for the daily rolling log file. Empty logs to stderr only.
  pub log_dir: String,
  pub log_level: String,
  /// Directory for tournament snapshots. Empty keeps everything in memory.
  pub snapshot_dir: String,
  pub default_variant: BracketVariant,
  pub default_seeding: SeedingPolicy,
  pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      log_dir: String::new(),
      log_level: "info".to_string(),
      snapshot_dir: String::new(),
      default_variant: BracketVariant::default(),
      default_seeding: SeedingPolicy::default(),
      random_seed: None,
    }
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

/// Fills blank settings from `BRACKET_*` variables. Values already in the file win.
pub fn apply_env_defaults(mut config: EngineConfig) -> EngineConfig {
  if config.log_dir.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_LOG_DIR") {
      config.log_dir = value;
    }
  }
  if let Some(value) = env_default("BRACKET_LOG_LEVEL") {
    if config.log_level.trim().is_empty() || config.log_level == "info" {
      config.log_level = value;
    }
  }
  if config.snapshot_dir.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_SNAPSHOT_DIR") {
      config.snapshot_dir = value;
    }
  }
  if config.random_seed.is_none() {
    if let Some(value) = env_default("BRACKET_RANDOM_SEED") {
      match value.parse::<u64>() {
        Ok(seed) => config.random_seed = Some(seed),
        Err(e) => warn!("ignoring BRACKET_RANDOM_SEED={value}: {e}"),
      }
    }
  }
  if let Some(value) = env_default("BRACKET_DEFAULT_VARIANT") {
    match value.parse::<BracketVariant>() {
      Ok(variant) => config.default_variant = variant,
      Err(e) => warn!("ignoring BRACKET_DEFAULT_VARIANT: {e}"),
    }
  }
  config
}

pub fn load_config_from(path: &Path) -> Result<EngineConfig, String> {
  if !path.is_file() {
    return Ok(apply_env_defaults(EngineConfig::default()));
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config = serde_json::from_str::<EngineConfig>(&data)
    .map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn save_config_to(path: &Path, config: &EngineConfig) -> Result<(), String> {
  let payload = serde_json::to_string_pretty(config).map_err(|e| e.to_string())?;
  fs::write(path, payload).map_err(|e| format!("write config {}: {e}", path.display()))
}

pub fn default_config_path() -> PathBuf {
  env_default("BRACKET_CONFIG")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("bracket.json"))
}

/// Loads `KEY=value` lines into the environment without overriding variables already set.
pub fn load_env_file(path: &Path) {
  if !path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.len() >= 2
    && ((value.starts_with('"') && value.ends_with('"')) || (value.starts_with('\'') && value.ends_with('\'')))
  {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  fn clear_env() {
    for key in [
      "BRACKET_LOG_DIR",
      "BRACKET_LOG_LEVEL",
      "BRACKET_SNAPSHOT_DIR",
      "BRACKET_RANDOM_SEED",
      "BRACKET_DEFAULT_VARIANT",
    ] {
      env::remove_var(key);
    }
  }

  #[test]
  fn parses_env_lines() {
    assert_eq!(parse_env_line("# comment"), None);
    assert_eq!(parse_env_line(""), None);
    assert_eq!(
      parse_env_line("export BRACKET_LOG_DIR=\"/tmp/logs\""),
      Some(("BRACKET_LOG_DIR".to_string(), "/tmp/logs".to_string()))
    );
    assert_eq!(
      parse_env_line("BRACKET_RANDOM_SEED=42 # fixed draw"),
      Some(("BRACKET_RANDOM_SEED".to_string(), "42".to_string()))
    );
    assert_eq!(parse_env_line("=value"), None);
  }

  #[test]
  #[serial]
  fn env_fills_blank_settings_only() {
    clear_env();
    env::set_var("BRACKET_SNAPSHOT_DIR", "/tmp/snapshots");
    env::set_var("BRACKET_RANDOM_SEED", "7");
    env::set_var("BRACKET_DEFAULT_VARIANT", "single-elimination");
    let config = apply_env_defaults(EngineConfig {
      log_dir: "/var/log/bracket".to_string(),
      ..EngineConfig::default()
    });
    assert_eq!(config.log_dir, "/var/log/bracket");
    assert_eq!(config.snapshot_dir, "/tmp/snapshots");
    assert_eq!(config.random_seed, Some(7));
    assert_eq!(config.default_variant, BracketVariant::SingleElimination);
    clear_env();
  }

  #[test]
  #[serial]
  fn bad_env_values_are_ignored() {
    clear_env();
    env::set_var("BRACKET_RANDOM_SEED", "soon");
    env::set_var("BRACKET_DEFAULT_VARIANT", "round-robin");
    let config = apply_env_defaults(EngineConfig::default());
    assert_eq!(config.random_seed, None);
    assert_eq!(config.default_variant, BracketVariant::DoubleElimination);
    clear_env();
  }

  #[test]
  #[serial]
  fn loads_and_saves_json() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bracket.json");
    assert_eq!(load_config_from(&path).unwrap(), EngineConfig::default());

    let config = EngineConfig {
      snapshot_dir: "snapshots".to_string(),
      default_seeding: SeedingPolicy::Random,
      random_seed: Some(11),
      ..EngineConfig::default()
    };
    save_config_to(&path, &config).unwrap();
    assert_eq!(load_config_from(&path).unwrap(), config);

    fs::write(&path, "{\"logLevel\": 3}").unwrap();
    assert!(load_config_from(&path).unwrap_err().starts_with("parse config"));
  }

  #[test]
  #[serial]
  fn env_file_does_not_override_existing_vars() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "BRACKET_LOG_DIR=from-file\nBRACKET_SNAPSHOT_DIR=from-file\n").unwrap();
    env::set_var("BRACKET_LOG_DIR", "from-shell");
    load_env_file(&path);
    assert_eq!(env::var("BRACKET_LOG_DIR").unwrap(), "from-shell");
    assert_eq!(env::var("BRACKET_SNAPSHOT_DIR").unwrap(), "from-file");
    clear_env();
  }
}
