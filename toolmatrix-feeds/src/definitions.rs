use crate::error::FeedError;
use camino::Utf8Path;
use fs_err as fs;
use serde::Deserialize;
use std::collections::BTreeMap;
use toolmatrix_types::feed::ToolDefinition;
use tracing::debug;

/// Definition entry in the keyed layout, where the code is the map key.
#[derive(Deserialize)]
struct KeyedDefinition {
    #[serde(default)]
    category: Option<toolmatrix_types::tool::Category>,
    #[serde(default, alias = "image", alias = "imageUrl")]
    image_url: Option<String>,
    #[serde(default)]
    diameter: Option<f64>,
    #[serde(default, alias = "toolLife")]
    tool_life: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionsDoc {
    List(Vec<ToolDefinition>),
    Keyed(BTreeMap<String, KeyedDefinition>),
}

/// Loads the hand-authored definitions table.
///
/// Returns `Ok(None)` when the file does not exist so callers can fall back to the built-in
/// category patterns.
pub fn load_definitions(path: &Utf8Path) -> Result<Option<Vec<ToolDefinition>>, FeedError> {
    if !path.exists() {
        debug!(path = %path, "no definitions table; using built-in categories");
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| FeedError::Io {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let doc: DefinitionsDoc = serde_json::from_str(&contents).map_err(|e| FeedError::Json {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    let defs = match doc {
        DefinitionsDoc::List(list) => list,
        DefinitionsDoc::Keyed(map) => map
            .into_iter()
            .map(|(code, d)| ToolDefinition {
                code,
                category: d.category,
                image_url: d.image_url,
                diameter: d.diameter,
                tool_life: d.tool_life,
            })
            .collect(),
    };

    debug!(path = %path, count = defs.len(), "loaded definitions table");
    Ok(Some(defs))
}
