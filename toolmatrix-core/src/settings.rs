//! Clap-free settings for the reconciliation pipeline.

use camino::Utf8PathBuf;
use toolmatrix_domain::CodeRules;

/// Settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Inventory snapshot written by the spreadsheet exporter.
    pub inventory_path: Utf8PathBuf,
    /// Directory of per-job JSON usage logs.
    pub usage_dir: Utf8PathBuf,
    /// Definitions table; a configured path that does not exist falls back to built-in patterns.
    pub definitions_path: Option<Utf8PathBuf>,

    /// Where the registry and cycle artifacts go after each cycle. `None` skips writing.
    pub out_dir: Option<Utf8PathBuf>,

    pub rules: CodeRules,

    /// React to filesystem changes once the executor is started.
    pub watch: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            inventory_path: Utf8PathBuf::from("data/inventory.json"),
            usage_dir: Utf8PathBuf::from("data/usage"),
            definitions_path: Some(Utf8PathBuf::from("data/definitions.json")),
            out_dir: Some(Utf8PathBuf::from("artifacts/toolmatrix")),
            rules: CodeRules::default(),
            watch: true,
        }
    }
}

impl ReconcileSettings {
    /// Every input location a change notification should react to.
    pub fn watched_inputs(&self) -> Vec<Utf8PathBuf> {
        let mut out = vec![self.inventory_path.clone(), self.usage_dir.clone()];
        out.extend(self.definitions_path.clone());
        out
    }
}
