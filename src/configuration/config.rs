#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ApiPrefix,
    ApiURL,
    CacheGracePeriod,
    ConfigFile,
    RequestTimeout,
    RetryBackoff,
    RetryCount,
    StorageDir,
}

impl ConfigKey {
    /// Environment variable clap reads the key from.
    pub fn env_var(&self) -> String {
        return format!(
            "DENGUEWATCH_{}",
            self.to_string().replace('-', "_").to_uppercase()
        );
    }
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    /// Returns the value or fails with instructions on how to provide it.
    pub fn require(key: ConfigKey) -> Result<String> {
        return Config::check_required(key, &Config::get(key));
    }

    fn check_required(key: ConfigKey, value: &str) -> Result<String> {
        if value.trim().is_empty() {
            bail!(format!(
                "Missing required configuration '{key}'. Pass --{key}, set {}, or add `{key} = \"...\"` to {}",
                key.env_var(),
                Config::default(ConfigKey::ConfigFile)
            ));
        }

        return Ok(value.to_string());
    }

    pub fn get_u64(key: ConfigKey) -> Result<u64> {
        let val = Config::get(key);
        return match val.parse::<u64>() {
            Ok(num) => Ok(num),
            Err(_) => bail!(format!("Config '{key}' must be a whole number, got '{val}'")),
        };
    }

    pub fn get_millis(key: ConfigKey) -> Result<Duration> {
        return Ok(Duration::from_millis(Config::get_u64(key)?));
    }

    pub fn default(key: ConfigKey) -> String {
        #[cfg(not(target_os = "macos"))]
        let config_path = dirs::config_dir()
            .unwrap_or_else(env::temp_dir)
            .join("denguewatch/config.toml");
        #[cfg(target_os = "macos")]
        let config_path = path::PathBuf::from(env::var("HOME").unwrap_or_default())
            .join(".config/denguewatch/config.toml");

        let storage_dir = dirs::data_dir()
            .unwrap_or_else(env::temp_dir)
            .join("denguewatch");

        let res = match key {
            ConfigKey::ApiPrefix => "api/v1",
            ConfigKey::ApiURL => "",
            ConfigKey::CacheGracePeriod => "0",
            ConfigKey::RequestTimeout => "10000",
            ConfigKey::RetryBackoff => "500",
            ConfigKey::RetryCount => "0",

            // Special
            ConfigKey::ConfigFile => config_path.to_str().unwrap_or_default(),
            ConfigKey::StorageDir => storage_dir.to_str().unwrap_or_default(),
        };

        return res.to_string();
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    if cmd
                        .get_arguments()
                        .all(|e| return e.get_long() != Some(key.to_string().as_str()))
                    {
                        bail!(format!("config.toml sets '{key}', which cannot be configured from a file"));
                    }

                    if let Some(val_int) = val.as_integer() {
                        if val_int < 0 {
                            bail!(format!("config.toml has a negative value for key '{key}': {val_int}"));
                        }
                        Config::set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        Config::set(key, val_str);
                    } else {
                        bail!(format!("config.toml has an invalid value for key '{key}'"));
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            api_url = %Config::get(ConfigKey::ApiURL),
            api_prefix = %Config::get(ConfigKey::ApiPrefix),
            storage_dir = %Config::get(ConfigKey::StorageDir),
            request_timeout = %Config::get(ConfigKey::RequestTimeout),
            retry_count = %Config::get(ConfigKey::RetryCount),
            cache_grace_period = %Config::get(ConfigKey::CacheGracePeriod),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let description = arg
                    .get_help()
                    .map(|e| return e.to_string())
                    .unwrap_or_default()
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i32>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
