//! Layered settings for Weft.
//!
//! Sources, lowest precedence first: `config/default.toml`,
//! `config/{env}.toml`, an explicit file, then `WEFT__SECTION__KEY`
//! environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "WEFT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub inventory: InventorySettings,
    #[serde(default)]
    pub company: CompanySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/weft.db")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub allow_inactive_parties: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            allow_inactive_parties: false,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl LedgerSettings {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default)]
    pub allow_negative_stock: bool,
}

/// Letterhead printed on exported statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySettings {
    #[serde(default = "default_company_name")]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            name: default_company_name(),
            address: None,
            phone: None,
            currency_symbol: default_currency_symbol(),
        }
    }
}

fn default_company_name() -> String {
    "Weft Textiles".into()
}

fn default_currency_symbol() -> String {
    "Rs.".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Also write a daily rolling log file here when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Render as TOML, the format `config init` writes.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize settings")
    }

    /// Write the settings to `path`, refusing to clobber an existing file
    /// unless `force` is set.
    pub fn write_to(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("{} already exists (pass --force to overwrite)", path.display());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Load settings from `dir`, layering `{env}.toml` and `explicit` on top of
/// `default.toml` and finishing with environment overrides.
pub fn load_from(dir: &Path, env: Option<&str>, explicit: Option<&Path>) -> Result<Settings> {
    let mut builder =
        Config::builder().add_source(File::from(dir.join("default.toml")).required(false));
    if let Some(env) = env.filter(|env| *env != "default") {
        builder = builder.add_source(File::from(dir.join(format!("{env}.toml"))).required(false));
    }
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    let settings = builder
        .build()
        .context("failed to load configuration")?
        .try_deserialize::<Settings>()
        .context("configuration is invalid")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempdir().unwrap();
        let settings = load_from(dir.path(), Some("default"), None).unwrap();
        assert_eq!(settings.ledger.max_retries, 5);
        assert_eq!(settings.ledger.busy_timeout(), Duration::from_secs(5));
        assert_eq!(settings.database.path, PathBuf::from("data/weft.db"));
        assert!(!settings.ledger.allow_inactive_parties);
    }

    #[test]
    fn environment_file_overrides_default_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[ledger]\nmax_retries = 2\nretry_base_delay_ms = 50\n",
        )
        .unwrap();
        fs::write(dir.path().join("test.toml"), "[ledger]\nmax_retries = 9\n").unwrap();

        let settings = load_from(dir.path(), Some("test"), None).unwrap();
        assert_eq!(settings.ledger.max_retries, 9);
        assert_eq!(settings.ledger.retry_base_delay(), Duration::from_millis(50));
    }

    #[test]
    fn explicit_file_wins_and_must_exist() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("shop.toml");
        fs::write(&explicit, "[database]\npath = \"/srv/shop.db\"\n").unwrap();
        let settings = load_from(dir.path(), None, Some(&explicit)).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("/srv/shop.db"));

        let missing = dir.path().join("missing.toml");
        assert!(load_from(dir.path(), None, Some(&missing)).is_err());
    }

    #[test]
    fn environment_variables_override_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[inventory]\nallow_negative_stock = false\n",
        )
        .unwrap();
        std::env::set_var("WEFT__INVENTORY__ALLOW_NEGATIVE_STOCK", "true");
        let settings = load_from(dir.path(), None, None);
        std::env::remove_var("WEFT__INVENTORY__ALLOW_NEGATIVE_STOCK");
        assert!(settings.unwrap().inventory.allow_negative_stock);
    }

    #[test]
    fn written_file_loads_back() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.company.name = "Sutra Mills".into();
        settings.logging.json = true;
        let path = dir.path().join("config").join("default.toml");
        settings.write_to(&path, false).unwrap();
        assert!(settings.write_to(&path, false).is_err());

        let loaded = load_from(&dir.path().join("config"), None, None).unwrap();
        assert_eq!(loaded.company.name, "Sutra Mills");
        assert!(loaded.logging.json);
    }
}
