use crate::core::error::{TunnelError, TunnelResult};
use crate::core::tunnel::PumpOptions;
use crate::security::flow::FlowPolicy;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TUN_ADDRESS: &str = "10.0.0.2/32";
const DEFAULT_BUFFER_SIZE: usize = 32767;
const DEFAULT_READ_BACKOFF_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub network: NetworkConfig,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub tun_name: String,
    pub tun_address: IpNetwork,
    pub configure_interface: bool,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub blocklist_path: Option<PathBuf>,
    pub read_backoff_ms: u64,
    pub flow_ttl_secs: Option<u64>,
    pub flow_max_entries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Configuration {
    /// `.env`と環境変数から設定を読み込む
    pub fn from_env() -> TunnelResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> TunnelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Configuration {
            network: NetworkConfig {
                tun_name: var("TUN_NAME").unwrap_or_else(|| "filter0".to_string()),
                tun_address: parse_value(
                    var("TUN_ADDRESS").unwrap_or_else(|| DEFAULT_TUN_ADDRESS.to_string()),
                    "TUN_ADDRESS",
                )?,
                configure_interface: parse_bool(var("CONFIGURE_INTERFACE"), "CONFIGURE_INTERFACE", true)?,
                buffer_size: parse_optional(var("BUFFER_SIZE"), "BUFFER_SIZE")?.unwrap_or(DEFAULT_BUFFER_SIZE),
            },
            filter: FilterConfig {
                blocklist_path: var("BLOCKLIST_PATH").map(PathBuf::from),
                read_backoff_ms: parse_optional(var("READ_BACKOFF_MS"), "READ_BACKOFF_MS")?
                    .unwrap_or(DEFAULT_READ_BACKOFF_MS),
                flow_ttl_secs: parse_optional(var("FLOW_TTL_SECS"), "FLOW_TTL_SECS")?,
                flow_max_entries: parse_optional(var("FLOW_MAX_ENTRIES"), "FLOW_MAX_ENTRIES")?,
            },
            logging: LoggingConfig {
                level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                file: var("LOG_FILE").map(PathBuf::from),
            },
        })
        .and_then(Self::validate)
    }

    fn validate(self) -> TunnelResult<Self> {
        if self.network.buffer_size == 0 {
            return Err(TunnelError::Config("BUFFER_SIZEは1以上である必要があります".to_string()));
        }
        if self.network.tun_name.len() >= 16 {
            return Err(TunnelError::Config(format!(
                "インターフェース名が長すぎます: {}",
                self.network.tun_name
            )));
        }
        Ok(self)
    }

    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            read_backoff: Duration::from_millis(self.filter.read_backoff_ms),
            flow_policy: FlowPolicy {
                ttl: self.filter.flow_ttl_secs.map(Duration::from_secs),
                max_entries: self.filter.flow_max_entries,
            },
        }
    }
}

fn parse_value<T>(value: String, key: &str) -> TunnelResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| TunnelError::Config(format!("{}の値が不正です ({}): {}", key, value, e)))
}

fn parse_optional<T>(value: Option<String>, key: &str) -> TunnelResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map(|value| parse_value(value, key)).transpose()
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> TunnelResult<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(TunnelError::Config(format!("{}の値が不正です: {}", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> TunnelResult<Configuration> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Configuration::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_applied() {
        let config = load(&[]).unwrap();

        assert_eq!(config.network.tun_name, "filter0");
        assert_eq!(config.network.tun_address.to_string(), "10.0.0.2/32");
        assert!(config.network.configure_interface);
        assert_eq!(config.network.buffer_size, 32767);
        assert_eq!(config.filter.read_backoff_ms, 10);
        assert_eq!(config.filter.blocklist_path, None);
        assert_eq!(config.logging.level, "info");

        let options = config.pump_options();
        assert_eq!(options.read_backoff, Duration::from_millis(10));
        assert_eq!(options.flow_policy, FlowPolicy::default());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("TUN_NAME", "tun7"),
            ("TUN_ADDRESS", "fd00::2/128"),
            ("CONFIGURE_INTERFACE", "no"),
            ("BLOCKLIST_PATH", "/var/lib/filter/blocklist.json"),
            ("FLOW_TTL_SECS", "300"),
            ("FLOW_MAX_ENTRIES", "4096"),
            ("LOG_FILE", "filter.log"),
        ])
        .unwrap();

        assert_eq!(config.network.tun_name, "tun7");
        assert_eq!(config.network.tun_address.prefix(), 128);
        assert!(!config.network.configure_interface);
        assert_eq!(
            config.filter.blocklist_path,
            Some(PathBuf::from("/var/lib/filter/blocklist.json"))
        );

        let options = config.pump_options();
        assert_eq!(options.flow_policy.ttl, Some(Duration::from_secs(300)));
        assert_eq!(options.flow_policy.max_entries, Some(4096));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("TUN_NAME", "  "), ("FLOW_TTL_SECS", "")]).unwrap();
        assert_eq!(config.network.tun_name, "filter0");
        assert_eq!(config.filter.flow_ttl_secs, None);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for vars in [
            [("BUFFER_SIZE", "lots")],
            [("BUFFER_SIZE", "0")],
            [("TUN_ADDRESS", "10.0.0.300/32")],
            [("CONFIGURE_INTERFACE", "maybe")],
            [("FLOW_MAX_ENTRIES", "-1")],
            [("TUN_NAME", "a-very-long-interface-name")],
        ] {
            assert!(matches!(load(&vars), Err(TunnelError::Config(_))), "{:?}", vars);
        }
    }
}
