//! Config record (§3, §6): a validated, case-insensitively-keyed
//! configuration loaded from TOML with an `AD_`-prefixed environment
//! overlay, mirroring `configparser.LoadConfig`'s viper setup in the
//! original program.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

fn default_cache_size() -> usize {
    1000
}

fn default_kafka_version() -> String {
    "2.3.0".to_string()
}

fn default_prefix() -> String {
    "maxwell".to_string()
}

fn default_dir() -> String {
    "/tmp".to_string()
}

fn default_listen_addr() -> String {
    ":8080".to_string()
}

/// `[MaxWell]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaxwellConfig {
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default)]
    pub without_meta: bool,
    #[serde(default = "default_kafka_version")]
    pub kafka_version: String,
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// LDB sink only.
    #[serde(default = "default_dir")]
    pub dir: String,
}

/// `[Misc]` section — LDB sink only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MiscConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for MiscConfig {
    fn default() -> Self {
        MiscConfig {
            listen_addr: default_listen_addr(),
        }
    }
}

/// `[DBConfigs.<name>]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbConfig {
    #[serde(default)]
    pub disable: bool,
}

/// `[TableConfigs.<db.table>]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableConfig {
    #[serde(default)]
    pub disable_row: bool,
    #[serde(default)]
    pub disable_log: bool,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub retention: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            disable_row: false,
            disable_log: true,
            retention: Duration::ZERO,
        }
    }
}

/// Accepts either a bare integer (seconds) or a Go-style duration string
/// (`"1h"`, `"30m"`, `"90s"`, `"2d"`) — the shape `time.Duration` fields take
/// in the original's TOML files.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    let raw = Raw::deserialize(deserializer)?;
    match raw {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(s) => parse_duration_str(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_duration_str(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() || s == "0" {
        return Ok(Duration::ZERO);
    }
    let (num, unit) = s.split_at(s.find(|c: char| c.is_alphabetic()).unwrap_or(s.len()));
    let n: u64 = num
        .parse()
        .map_err(|_| format!("bad duration `{s}`"))?;
    let secs = match unit {
        "s" | "" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        other => return Err(format!("unknown duration unit `{other}` in `{s}`")),
    };
    Ok(Duration::from_secs(secs))
}

/// Top-level config record (§3, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    pub max_well: MaxwellConfig,
    #[serde(default)]
    pub misc: MiscConfig,
    #[serde(default = "default_db_configs")]
    pub db_configs: HashMap<String, DbConfig>,
    #[serde(default = "default_table_configs")]
    pub table_configs: HashMap<String, TableConfig>,
}

fn default_db_configs() -> HashMap<String, DbConfig> {
    let mut m = HashMap::new();
    m.insert("@default".to_string(), DbConfig::default());
    m
}

fn default_table_configs() -> HashMap<String, TableConfig> {
    let mut m = HashMap::new();
    m.insert("@default".to_string(), TableConfig::default());
    m
}

impl Config {
    /// Case-insensitive `DBConfigs[database]` lookup with `@default`
    /// fallback.
    pub fn db_config(&self, database: &str) -> &DbConfig {
        let key = database.to_lowercase();
        self.db_configs
            .get(&key)
            .or_else(|| self.db_configs.get("@default"))
            .expect("@default DBConfigs entry is always present")
    }

    /// Case-insensitive `TableConfigs["db.table"]` lookup with `@default`
    /// fallback.
    pub fn table_config(&self, db_table: &str) -> &TableConfig {
        let key = db_table.to_lowercase();
        self.table_configs
            .get(&key)
            .or_else(|| self.table_configs.get("@default"))
            .expect("@default TableConfigs entry is always present")
    }

    /// Bare structural validation — a real Kafka version string and at
    /// least one broker. The upstream `sarama.ParseKafkaVersion` check is
    /// approximated here since we delegate the Kafka wire protocol to
    /// `rdkafka`, which doesn't gate on a version string the same way.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_well.kafka_version.splitn(3, '.').count() < 2 {
            anyhow::bail!(
                "bad KafkaVersion `{}`, expected e.g. `2.3.0`",
                self.max_well.kafka_version
            );
        }
        if self.max_well.brokers.is_empty() {
            anyhow::bail!("no Kafka brokers configured");
        }
        if self.max_well.topic.is_empty() {
            anyhow::bail!("no Kafka topic configured");
        }
        Ok(())
    }
}

/// Loads a TOML config file overlaid with `AD_`-prefixed environment
/// variables (`.`/`-` replaced by `_` in key names, matching
/// `pkg/configparser`).
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("AD")
                .separator("_")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = settings.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_suffixed_strings() {
        assert_eq!(parse_duration_str("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration_str("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration_str("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration_str("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn table_config_default_disables_log() {
        let t = TableConfig::default();
        assert!(t.disable_log);
        assert_eq!(t.retention, Duration::ZERO);
    }
}
