//! # PMOPlex Configuration Module
//!
//! This module provides configuration management for PMOPlex, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! Unlike a process-wide singleton, a [`Config`] is an owned value: the binary
//! loads it once and hands it to whatever needs it.
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! // Access configuration values
//! let level = config.get_log_min_level()?;
//! let cache_dir = config.resolve_managed_dir(&["plex", "cache", "directory"], "cache")?;
//!
//! // Update configuration values
//! config.set_log_min_level("DEBUG".to_string())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, info};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmoplex.yaml");

const ENV_CONFIG_DIR: &str = "PMOPLEX_CONFIG";
const ENV_PREFIX: &str = "PMOPLEX_CONFIG__";

/// Flat environment variables accepted as aliases of a configuration path.
///
/// Their values are stored as plain strings. They predate the `PMOPLEX_CONFIG__` scheme and are applied first, so a
/// prefixed variable targeting the same path wins.
const ENV_ALIASES: &[(&str, &[&str])] = &[
    ("PLEX_URL", &["plex", "url"]),
    ("ALLOWED_LIBRARIES", &["plex", "allowed_libraries"]),
    ("REFRESH_INTERVAL", &["plex", "refresh_interval_secs"]),
    ("CACHE_DIR", &["plex", "cache", "directory"]),
];

const DEFAULT_CONFIG_DIR_NAME: &str = ".pmoplex";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Configuration manager for PMOPlex
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(DEFAULT_CONFIG_DIR_NAME).exists() {
            return PathBuf::from(DEFAULT_CONFIG_DIR_NAME);
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(DEFAULT_CONFIG_DIR_NAME)
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        // Test read permission
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOPLEX_CONFIG` environment variable
    /// 3. `.pmoplex` in the current directory
    /// 4. `.pmoplex` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(&dir_path)
            .map_err(|e| anyhow!("Invalid config directory {}: {}", dir_path.display(), e))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config = Self::load_with_env(directory, env::vars())?;
        config.save()?;
        Ok(config)
    }

    /// Same as [`Config::load_config`] but with an explicit set of
    /// environment variables, and without writing the result back.
    pub fn load_with_env<I>(directory: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                // an empty file decodes to null
                if external_value.is_mapping() {
                    merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
                }
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
            }
        }

        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value, vars);

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Directory holding `config.yaml`; relative managed directories resolve against it.
    pub fn dir(&self) -> &Path {
        &self.config_dir
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        debug!(config_file = %self.path.display(), "Saved configuration");
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["plex", "url"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        Self::get_value_internal(&self.data(), path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(&Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads a string value, falling back to `default` when missing or null.
    ///
    /// Scalars (numbers, booleans) are rendered as strings.
    pub fn get_string(&self, path: &[&str], default: &str) -> Result<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) => Ok(s),
            Ok(Value::Number(n)) => Ok(n.to_string()),
            Ok(Value::Bool(b)) => Ok(b.to_string()),
            Ok(Value::Null) | Err(_) => Ok(default.to_string()),
            Ok(other) => Err(anyhow!(
                "Expected a string at {}, found {:?}",
                path.join("."),
                other
            )),
        }
    }

    /// Reads an unsigned integer, accepting numeric strings.
    pub fn get_u64(&self, path: &[&str], default: u64) -> Result<u64> {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| anyhow!("{} must be a non-negative integer", path.join("."))),
            Ok(Value::String(s)) if s.trim().is_empty() => Ok(default),
            Ok(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Invalid integer '{}' at {}: {}", s, path.join("."), e)),
            Ok(Value::Null) | Err(_) => Ok(default),
            Ok(other) => Err(anyhow!(
                "Expected an integer at {}, found {:?}",
                path.join("."),
                other
            )),
        }
    }

    /// Reads a boolean, accepting `"true"`/`"false"` strings.
    pub fn get_bool(&self, path: &[&str], default: bool) -> Result<bool> {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => Ok(b),
            Ok(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                "" => Ok(default),
                _ => Err(anyhow!("Invalid boolean '{}' at {}", s, path.join("."))),
            },
            Ok(Value::Null) | Err(_) => Ok(default),
            Ok(other) => Err(anyhow!(
                "Expected a boolean at {}, found {:?}",
                path.join("."),
                other
            )),
        }
    }

    /// Reads a list of strings.
    ///
    /// Accepts either a YAML sequence or a comma-separated string; entries are
    /// trimmed and empty entries dropped.
    pub fn get_string_list(&self, path: &[&str]) -> Result<Vec<String>> {
        let raw: Vec<String> = match self.get_value(path) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            Ok(Value::Null) | Err(_) => Vec::new(),
            Ok(other) => {
                return Err(anyhow!(
                    "Expected a list at {}, found {:?}",
                    path.join("."),
                    other
                ))
            }
        };

        Ok(raw
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prefixed = Vec::new();

        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                prefixed.push((stripped.to_string(), value));
            } else if let Some((_, path)) = ENV_ALIASES.iter().find(|(alias, _)| *alias == key) {
                // flat variables are taken verbatim, never parsed as YAML
                let _ = Self::set_value_internal(config, path, Value::String(value));
            }
        }

        for (key, value) in prefixed {
            let key_path = key.split("__").collect::<Vec<_>>();
            let _ = Self::set_value_internal(config, &key_path, Self::convert_env_value(&value));
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Résout un chemin relatif ou absolu par rapport au répertoire de configuration
    fn resolve_dir(&self, dir_path: &str) -> PathBuf {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Résout un répertoire géré par la configuration, sans le créer
    ///
    /// Pour les appelants qui gèrent eux-mêmes la création (et ses échecs).
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin dans l'arbre de configuration (ex: `&["plex", "cache", "directory"]`)
    /// * `default` - Nom de répertoire par défaut si non configuré
    pub fn resolve_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        Ok(self.resolve_dir(&dir_path))
    }

    /// Récupère un répertoire géré par la configuration
    ///
    /// Comme [`Config::resolve_managed_dir`], mais le répertoire est créé
    /// s'il n'existe pas.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let absolute_path = self.resolve_managed_dir(path, default)?;

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path)
    }

    /// Définit un répertoire géré par la configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        self.get_string(&["host", "logger", "min_level"], DEFAULT_LOG_MIN_LEVEL)
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_defaults_are_embedded() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_with_env(dir.path().to_str().unwrap(), no_env())?;

        assert_eq!(
            config.get_string(&["plex", "url"], "")?,
            "http://localhost:32400"
        );
        assert_eq!(config.get_u64(&["plex", "refresh_interval_secs"], 0)?, 21600);
        assert!(config.get_string_list(&["plex", "allowed_libraries"])?.is_empty());
        assert_eq!(config.get_log_min_level()?, "INFO");
        Ok(())
    }

    #[test]
    fn test_config_file_is_merged() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("config.yaml"),
            "plex:\n  URL: http://plex.lan:32400\n  allowed_libraries:\n    - Movies\n    - TV Shows\n",
        )?;

        let config = Config::load_with_env(dir.path().to_str().unwrap(), no_env())?;
        assert_eq!(
            config.get_string(&["plex", "url"], "")?,
            "http://plex.lan:32400"
        );
        assert_eq!(
            config.get_string_list(&["plex", "allowed_libraries"])?,
            vec!["Movies".to_string(), "TV Shows".to_string()]
        );
        // untouched defaults survive the merge
        assert_eq!(config.get_u64(&["plex", "request_timeout_secs"], 0)?, 10);
        Ok(())
    }

    #[test]
    fn test_env_overrides_and_aliases() -> Result<()> {
        let dir = tempdir()?;
        let vars = vec![
            ("ALLOWED_LIBRARIES".to_string(), "Movies, tv shows ,".to_string()),
            ("REFRESH_INTERVAL".to_string(), "60".to_string()),
            ("PLEX_URL".to_string(), "http://legacy:32400".to_string()),
            (
                "PMOPLEX_CONFIG__PLEX__URL".to_string(),
                "http://prefixed:32400".to_string(),
            ),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert_eq!(
            config.get_string(&["plex", "url"], "")?,
            "http://prefixed:32400"
        );
        assert_eq!(config.get_u64(&["plex", "refresh_interval_secs"], 0)?, 60);
        assert_eq!(
            config.get_string_list(&["plex", "allowed_libraries"])?,
            vec!["Movies".to_string(), "tv shows".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_empty_alias_means_no_value() -> Result<()> {
        let dir = tempdir()?;
        let vars = vec![("ALLOWED_LIBRARIES".to_string(), String::new())];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert!(config.get_string_list(&["plex", "allowed_libraries"])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_set_value_persists() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().to_str().unwrap().to_string();

        let config = Config::load_config(&root)?;
        config.set_value(&["plex", "resolve_trailers"], Value::Bool(true))?;

        let reloaded = Config::load_with_env(&root, no_env())?;
        assert!(reloaded.get_bool(&["plex", "resolve_trailers"], false)?);
        Ok(())
    }

    #[test]
    fn test_aliases_are_taken_verbatim() -> Result<()> {
        let dir = tempdir()?;
        let vars = vec![("ALLOWED_LIBRARIES".to_string(), "Movies: 4K,TV Shows".to_string())];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert_eq!(
            config.get_string_list(&["plex", "allowed_libraries"])?,
            vec!["Movies: 4K".to_string(), "TV Shows".to_string()]
        );

        let dir = tempdir()?;
        let vars = vec![
            ("ALLOWED_LIBRARIES".to_string(), "#Kids".to_string()),
            ("REFRESH_INTERVAL".to_string(), "600".to_string()),
        ];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert_eq!(
            config.get_string_list(&["plex", "allowed_libraries"])?,
            vec!["#Kids".to_string()]
        );
        assert_eq!(config.get_u64(&["plex", "refresh_interval_secs"], 0)?, 600);
        Ok(())
    }

    #[test]
    fn test_resolve_managed_dir_does_not_create() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x")?;
        let target = blocker.join("cache");
        let vars = vec![("CACHE_DIR".to_string(), target.display().to_string())];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert_eq!(
            config.resolve_managed_dir(&["plex", "cache", "directory"], "cache")?,
            target
        );
        assert!(config
            .get_managed_dir(&["plex", "cache", "directory"], "cache")
            .is_err());
        Ok(())
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_with_env(dir.path().to_str().unwrap(), no_env())?;

        let cache = config.get_managed_dir(&["plex", "cache", "directory"], "cache")?;
        assert_eq!(cache, dir.path().join("cache"));
        assert!(cache.is_dir());
        Ok(())
    }

    #[test]
    fn test_typed_getters_reject_garbage() -> Result<()> {
        let dir = tempdir()?;
        let vars = vec![(
            "PMOPLEX_CONFIG__PLEX__REFRESH_INTERVAL_SECS".to_string(),
            "often".to_string(),
        )];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars)?;
        assert!(config.get_u64(&["plex", "refresh_interval_secs"], 0).is_err());
        assert_eq!(config.get_u64(&["plex", "missing"], 7)?, 7);
        Ok(())
    }
}
