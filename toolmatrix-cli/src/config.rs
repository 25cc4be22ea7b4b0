//! Configuration file loading for toolmatrix.
//!
//! Discovers and loads `toolmatrix.toml` from the working root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;
use toolmatrix_core::settings::ReconcileSettings;
use toolmatrix_domain::CodeRules;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "toolmatrix.toml";

/// Top-level configuration from toolmatrix.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolmatrixConfig {
    /// Input locations.
    pub sources: SourcesConfig,

    /// Artifact output.
    pub output: OutputConfig,

    /// Change notifications for `toolmatrix watch`.
    pub watch: WatchConfig,

    /// Code normalization rules; omitted keys keep their defaults.
    pub rules: Option<CodeRules>,
}

/// Sources section. Relative paths are resolved against the root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub inventory: Option<Utf8PathBuf>,
    pub usage_dir: Option<Utf8PathBuf>,
    pub definitions: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub out_dir: Option<Utf8PathBuf>,

    /// Write registry artifacts after each cycle.
    pub write: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: None,
            write: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Discover the toolmatrix.toml config file in `root`.
pub fn discover_config(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a toolmatrix.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<ToolmatrixConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<ToolmatrixConfig> {
    let config: ToolmatrixConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the root, or return default if not found.
pub fn load_or_default(root: &Utf8Path) -> anyhow::Result<ToolmatrixConfig> {
    match discover_config(root) {
        Some(path) => load_config(&path),
        None => Ok(ToolmatrixConfig::default()),
    }
}

/// Source and output overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub inventory: Option<Utf8PathBuf>,
    pub usage_dir: Option<Utf8PathBuf>,
    pub definitions: Option<Utf8PathBuf>,
    pub out_dir: Option<Utf8PathBuf>,
    pub no_write: bool,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: ToolmatrixConfig,
}

impl ConfigMerger {
    pub fn new(config: ToolmatrixConfig) -> Self {
        Self { config }
    }

    /// CLI paths are used as given; config file paths are relative to `root`.
    pub fn merge(self, root: &Utf8Path, cli: &CliOverrides) -> ReconcileSettings {
        let from_root = |p: Utf8PathBuf| {
            if p.is_absolute() { p } else { root.join(p) }
        };

        let inventory_path = cli.inventory.clone().unwrap_or_else(|| {
            from_root(
                self.config
                    .sources
                    .inventory
                    .clone()
                    .unwrap_or_else(|| Utf8PathBuf::from("data/inventory.json")),
            )
        });
        let usage_dir = cli.usage_dir.clone().unwrap_or_else(|| {
            from_root(
                self.config
                    .sources
                    .usage_dir
                    .clone()
                    .unwrap_or_else(|| Utf8PathBuf::from("data/usage")),
            )
        });
        let definitions_path = cli.definitions.clone().or_else(|| {
            Some(from_root(
                self.config
                    .sources
                    .definitions
                    .clone()
                    .unwrap_or_else(|| Utf8PathBuf::from("data/definitions.json")),
            ))
        });

        let write = self.config.output.write && !cli.no_write;
        let out_dir = write.then(|| {
            cli.out_dir.clone().unwrap_or_else(|| {
                from_root(
                    self.config
                        .output
                        .out_dir
                        .clone()
                        .unwrap_or_else(|| Utf8PathBuf::from("artifacts/toolmatrix")),
                )
            })
        });

        ReconcileSettings {
            inventory_path,
            usage_dir,
            definitions_path,
            out_dir,
            rules: self.config.rules.unwrap_or_default(),
            watch: self.config.watch.enabled,
        }
    }
}
