//! Worker configuration
//!
//! Loaded from a versioned YAML file, overlaid by environment variables, then
//! validated:
//!
//! ```yaml
//! version: 1
//! database_path: /var/lib/cwscan/worker.db
//! sources_save_path: /tmp/cwscan
//! queue:
//!   visibility_secs: 900
//!   poll_interval_ms: 2000
//! generator:
//!   command: ["cargo", "schema"]
//!   timeout_ms: 600000
//! publish:
//!   topic_id: contract-schemas
//! ```

mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supported configuration file versions
const SUPPORTED_VERSIONS: [u32; 1] = [1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub version: u32,

    /// SQLite database hosting queues, buckets and job records
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Parent directory of per-job scratch directories
    #[serde(default = "default_sources_save_path")]
    pub sources_save_path: PathBuf,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub buckets: BucketConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub syntax: SyntaxConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Inbound parsing queue
    pub name: String,
    /// Outbound queue drained to the event publisher
    pub publish_name: String,
    pub visibility_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "parsing-queue".to_string(),
            publish_name: "publish-queue".to_string(),
            visibility_secs: 900,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BucketConfig {
    pub sources: String,
    pub schemas: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            sources: "sources".to_string(),
            schemas: "schemas".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Schema tool, run from `<project>/examples`
    pub command: Vec<String>,
    pub timeout_ms: u64,
    /// Dev-dependency the generated script needs
    pub dependency_name: String,
    pub dependency_version: String,
    /// Package location query, the crate name is appended
    pub package_locator: Vec<String>,
    pub locator_timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "schema".to_string()],
            timeout_ms: 600_000,
            dependency_name: "cosmwasm-schema".to_string(),
            dependency_version: "1.0.0".to_string(),
            package_locator: vec!["cargo".to_string(), "pkgid".to_string()],
            locator_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntaxConfig {
    /// External `rust2json` binary; in-process parsing when unset
    pub external_bin: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SyntaxConfig {
    fn default() -> Self {
        Self {
            external_bin: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub topic_id: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic_id: "contract-schemas".to_string(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("cwscan.db")
}

fn default_sources_save_path() -> PathBuf {
    std::env::temp_dir().join("cwscan-sources")
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            database_path: default_database_path(),
            sources_save_path: default_sources_save_path(),
            queue: QueueConfig::default(),
            buckets: BucketConfig::default(),
            generator: GeneratorConfig::default(),
            syntax: SyntaxConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: WorkerConfig = serde_yaml::from_str(content)?;

        // Version check
        if !SUPPORTED_VERSIONS.contains(&config.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        Ok(config)
    }

    /// File (or defaults) + process environment + validation
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay deployment environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SOURCES_SAVE_PATH") {
            self.sources_save_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(secs) = parse_env(&lookup, "QUEUE_ITEM_VISIBILITY")? {
            self.queue.visibility_secs = secs;
        }
        if let Some(ms) = parse_env(&lookup, "QUEUE_CHECK_INTERVAL")? {
            self.queue.poll_interval_ms = ms;
        }
        if let Some(ms) = parse_env(&lookup, "EXEC_SCHEMA_TIMEOUT")? {
            self.generator.timeout_ms = ms;
        }
        if let Some(bin) = lookup("RUST_2_JSON_BIN_PATH") {
            self.syntax.external_bin = Some(bin).filter(|b| !b.is_empty());
        }
        if let Some(ms) = parse_env(&lookup, "RUST_2_JSON_TIMEOUT")? {
            self.syntax.timeout_ms = ms;
        }
        if let Some(topic) = lookup("PUB_SUB_TOPIC_ID") {
            self.publish.topic_id = topic;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_range(
            "queue.visibility_secs",
            self.queue.visibility_secs,
            1,
            86_400,
            "Visibility must outlast one job (generation timeout included)",
        )?;
        check_range(
            "queue.poll_interval_ms",
            self.queue.poll_interval_ms,
            10,
            3_600_000,
            "Use QUEUE_CHECK_INTERVAL to tune polling",
        )?;
        check_range(
            "generator.timeout_ms",
            self.generator.timeout_ms,
            1,
            86_400_000,
            "Use EXEC_SCHEMA_TIMEOUT to bound the schema tool",
        )?;
        check_range(
            "generator.locator_timeout_ms",
            self.generator.locator_timeout_ms,
            1,
            3_600_000,
            "Bounds the package location query",
        )?;
        check_range(
            "syntax.timeout_ms",
            self.syntax.timeout_ms,
            1,
            3_600_000,
            "Use RUST_2_JSON_TIMEOUT to bound the syntax tree producer",
        )?;

        // A lease that expires mid-generation hands the job to a second consumer
        let min_visibility = self.generator.timeout_ms / 1000 + 1;
        if self.queue.visibility_secs < min_visibility {
            return Err(ConfigError::range_with_hint(
                "queue.visibility_secs",
                self.queue.visibility_secs,
                min_visibility,
                86_400,
                format!(
                    "Visibility must outlast generator.timeout_ms ({} ms)",
                    self.generator.timeout_ms
                ),
            ));
        }

        if self.generator.command.is_empty() {
            return Err(ConfigError::missing(
                "generator.command",
                "Set it to the schema tool, e.g. [\"cargo\", \"schema\"]",
            ));
        }
        if self.generator.package_locator.is_empty() {
            return Err(ConfigError::missing(
                "generator.package_locator",
                "Set it to the package location query, e.g. [\"cargo\", \"pkgid\"]",
            ));
        }
        if self.generator.dependency_name.is_empty() {
            return Err(ConfigError::missing(
                "generator.dependency_name",
                "The generated script needs the schema crate as a dev-dependency",
            ));
        }
        if self.queue.name.is_empty() || self.queue.publish_name.is_empty() {
            return Err(ConfigError::missing(
                "queue.name",
                "Both the parsing and the publish queue need a name",
            ));
        }
        if self.queue.name == self.queue.publish_name {
            return Err(ConfigError::missing(
                "queue.publish_name",
                "The publish queue must differ from the parsing queue",
            ));
        }
        if self.publish.topic_id.is_empty() {
            return Err(ConfigError::missing(
                "publish.topic_id",
                "Set PUB_SUB_TOPIC_ID or publish.topic_id",
            ));
        }
        Ok(())
    }

    pub fn visibility(&self) -> Duration {
        Duration::from_secs(self.queue.visibility_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator.timeout_ms)
    }

    pub fn locator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator.locator_timeout_ms)
    }

    pub fn syntax_timeout(&self) -> Duration {
        Duration::from_millis(self.syntax.timeout_ms)
    }
}

fn parse_env<F>(lookup: &F, name: &str) -> ConfigResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.clone(),
            expected: "a non-negative integer".to_string(),
        })
}

fn check_range(field: &str, value: u64, min: u64, max: u64, hint: &str) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(ConfigError::range_with_hint(field, value, min, max, hint));
    }
    Ok(())
}
