//! Category patterns and the hand-authored definitions table, bundled as one explicit
//! configuration object that the pipeline passes by reference.

use crate::codes::{CodeRules, NormalizedCode};
use std::collections::HashMap;
use toolmatrix_types::feed::ToolDefinition;
use toolmatrix_types::tool::Category;
use tracing::debug;

/// Built-in family-code patterns, used when no definitions table provides categories.
///
/// Order matters: the first pattern contained in the family code wins.
pub const BUILTIN_PATTERNS: &[(&str, Category)] = &[
    ("8400", Category::Ecut),
    ("8401", Category::Ecut),
    ("8403", Category::Ecut),
    ("8201", Category::Mfc),
    ("8202", Category::Mfc),
    ("8203", Category::Mfc),
    ("7610", Category::Xf),
    ("7611", Category::Xf),
    ("7620", Category::Xfeed),
    ("7621", Category::Xfeed),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPattern {
    pub pattern: String,
    pub category: Category,
}

/// Ordered family-code-substring to category table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    patterns: Vec<CategoryPattern>,
}

impl CategoryTable {
    pub fn builtin() -> Self {
        Self {
            patterns: BUILTIN_PATTERNS
                .iter()
                .map(|(p, c)| CategoryPattern {
                    pattern: (*p).to_string(),
                    category: *c,
                })
                .collect(),
        }
    }

    pub fn new(patterns: Vec<CategoryPattern>) -> Self {
        Self { patterns }
    }

    /// Table built from definition entries that carry a category, in file order.
    ///
    /// Returns `None` when no entry does, so the caller keeps the built-in list.
    pub fn from_definitions(defs: &[ToolDefinition]) -> Option<Self> {
        let patterns: Vec<CategoryPattern> = defs
            .iter()
            .filter_map(|d| {
                let category = d.category?;
                let pattern = d.code.trim();
                (!pattern.is_empty()).then(|| CategoryPattern {
                    pattern: pattern.to_string(),
                    category,
                })
            })
            .collect();

        (!patterns.is_empty()).then_some(Self { patterns })
    }

    pub fn patterns(&self) -> &[CategoryPattern] {
        &self.patterns
    }

    /// Total: every family code maps to exactly one category, `OTHER` by default.
    pub fn classify(&self, family_code: &str) -> Category {
        if family_code.is_empty() {
            return Category::Other;
        }
        self.patterns
            .iter()
            .find(|p| family_code.contains(p.pattern.as_str()))
            .map(|p| p.category)
            .unwrap_or(Category::Other)
    }

    pub fn is_known(&self, family_code: &str) -> bool {
        self.classify(family_code).is_matrix()
    }
}

/// Where the category table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Builtin,
    Definitions,
}

/// A matrix code resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCode<'a> {
    pub normalized: NormalizedCode,
    pub definition: Option<&'a ToolDefinition>,
}

impl ResolvedCode<'_> {
    pub fn diameter(&self) -> Option<f64> {
        self.definition.and_then(|d| d.diameter)
    }

    pub fn tool_life(&self) -> Option<f64> {
        self.definition.and_then(|d| d.tool_life)
    }

    pub fn image_url(&self) -> Option<String> {
        self.definition.and_then(|d| d.image_url.clone())
    }
}

/// Code rules, category table and definitions for one pipeline instance.
#[derive(Debug, Clone)]
pub struct Catalog {
    rules: CodeRules,
    categories: CategoryTable,
    definitions: HashMap<String, ToolDefinition>,
    source: CatalogSource,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    pub fn builtin() -> Self {
        Self::new(CodeRules::default(), None)
    }

    /// Builds a catalog from optional definitions. `None` (no table on disk) keeps the built-in
    /// category patterns.
    pub fn new(rules: CodeRules, definitions: Option<Vec<ToolDefinition>>) -> Self {
        let defs = definitions.unwrap_or_default();
        let (categories, source) = match CategoryTable::from_definitions(&defs) {
            Some(table) => (table, CatalogSource::Definitions),
            None => (CategoryTable::builtin(), CatalogSource::Builtin),
        };

        let mut by_code = HashMap::with_capacity(defs.len());
        for def in defs {
            let key = def.code.trim().to_ascii_uppercase();
            if key.is_empty() {
                continue;
            }
            if by_code.contains_key(&key) {
                debug!(code = %key, "duplicate definition; keeping the first");
                continue;
            }
            by_code.insert(key, def);
        }

        Self {
            rules,
            categories,
            definitions: by_code,
            source,
        }
    }

    pub fn rules(&self) -> &CodeRules {
        &self.rules
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    pub fn normalize(&self, code: &str) -> NormalizedCode {
        self.rules.normalize(code, &self.categories)
    }

    /// Family code for a matrix code, without classification.
    pub fn family_of(&self, code: &str) -> String {
        self.rules.family_of(code).0
    }

    pub fn operational_family(&self, id: &str) -> Option<String> {
        self.rules.operational_family(id)
    }

    /// Normalizes `code` and finds its definition: raw code, then cleaned code, then family.
    ///
    /// A category on the matched definition overrides the pattern table.
    pub fn resolve(&self, code: &str) -> ResolvedCode<'_> {
        let mut normalized = self.normalize(code);
        let definition = [
            code.trim(),
            normalized.cleaned.as_str(),
            normalized.family_code.as_str(),
        ]
        .into_iter()
        .filter(|k| !k.is_empty())
        .find_map(|k| self.definitions.get(&k.to_ascii_uppercase()));

        if let Some(category) = definition.and_then(|d| d.category) {
            normalized.category = category;
        }

        ResolvedCode {
            normalized,
            definition,
        }
    }
}
