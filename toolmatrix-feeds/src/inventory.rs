use crate::error::FeedError;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use toolmatrix_types::feed::InventoryRow;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LoadedInventory {
    pub path: Utf8PathBuf,
    pub rows: Vec<InventoryRow>,
    /// sha256 of the raw file bytes.
    pub digest: String,
}

/// Accepted layouts: a bare array of rows, or an object wrapping them under `rows`.
#[derive(Deserialize)]
#[serde(untagged)]
enum InventoryDoc {
    Rows(Vec<InventoryRow>),
    Wrapped { rows: Vec<InventoryRow> },
}

pub fn load_inventory(path: &Utf8Path) -> Result<LoadedInventory, FeedError> {
    debug!(path = %path, "reading inventory snapshot");

    let bytes = fs::read(path).map_err(|e| FeedError::Io {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let rows = parse_inventory(&bytes).map_err(|message| FeedError::Json {
        path: path.to_string(),
        message,
    })?;

    Ok(LoadedInventory {
        path: path.to_path_buf(),
        rows,
        digest: sha256_hex(&bytes),
    })
}

pub fn parse_inventory(bytes: &[u8]) -> Result<Vec<InventoryRow>, String> {
    let doc: InventoryDoc = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    Ok(match doc {
        InventoryDoc::Rows(rows) | InventoryDoc::Wrapped { rows } => rows,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
