//! Code normalization: manufacturer matrix codes and operational identifiers to family codes.
//!
//! The string handling is driven by [`CodeRules`], a small declarative table, so the rules can be
//! tested (and configured) separately from the scanning mechanics below.

use crate::catalog::CategoryTable;
use serde::{Deserialize, Serialize};
use toolmatrix_types::tool::Category;

/// Which leading letter counts as a feed-type marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStrip {
    /// Strip exactly one leading ASCII letter, whatever it is.
    AnyLetter,
    /// Strip exactly one leading letter from this set.
    Letters(Vec<char>),
    /// Never strip.
    None,
}

impl MarkerStrip {
    fn matches(&self, c: char) -> bool {
        match self {
            MarkerStrip::AnyLetter => c.is_ascii_alphabetic(),
            MarkerStrip::Letters(set) => set.iter().any(|m| m.eq_ignore_ascii_case(&c)),
            MarkerStrip::None => false,
        }
    }
}

/// How many digits of the cleaned code make up the family code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthRule {
    /// Digit strings at least this long carry a diameter variant at the tail.
    pub variant_min_len: usize,
    /// Length of that diameter variant.
    pub variant_digits: usize,
    /// Family length for shorter digit strings.
    pub short_family_len: usize,
}

impl Default for LengthRule {
    fn default() -> Self {
        Self {
            variant_min_len: 6,
            variant_digits: 3,
            short_family_len: 4,
        }
    }
}

impl LengthRule {
    /// Splits a digit string into `(family, diameter variant)`.
    ///
    /// The family never gets shorter than `short_family_len`; a variant that would eat into it is
    /// truncated instead.
    pub fn split<'a>(&self, digits: &'a str) -> (&'a str, Option<&'a str>) {
        if digits.len() >= self.variant_min_len && digits.len() > self.variant_digits {
            let cut = (digits.len() - self.variant_digits).max(self.short_family_len);
            if cut >= digits.len() {
                return (digits, None);
            }
            (&digits[..cut], Some(&digits[cut..]))
        } else {
            let end = digits.len().min(self.short_family_len);
            (&digits[..end], None)
        }
    }
}

/// Family extraction for operational identifiers such as `FRA-P8201-S15.2R0_H100W16L100X`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalRule {
    pub marker: char,
    pub min_digits: usize,
    pub max_digits: usize,
}

impl Default for OperationalRule {
    fn default() -> Self {
        Self {
            marker: 'P',
            min_digits: 4,
            max_digits: 5,
        }
    }
}

impl OperationalRule {
    /// First occurrence of the marker followed by at least `min_digits` digits.
    ///
    /// At most `max_digits` digits are taken, so a longer run yields its leading digits.
    pub fn extract<'a>(&self, id: &'a str) -> Option<&'a str> {
        let bytes = id.as_bytes();
        for (i, c) in id.char_indices() {
            if c != self.marker {
                continue;
            }
            let start = i + c.len_utf8();
            let run = bytes[start..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if run >= self.min_digits {
                let end = start + run.min(self.max_digits);
                return Some(&id[start..end]);
            }
        }
        None
    }
}

/// Ordered rule table applied to manufacturer matrix codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeRules {
    /// Manufacturer prefixes, matched case-insensitively; the first match is stripped.
    pub prefix_strip: Vec<String>,
    /// Separator of the trailing `_<digits>` instance suffix.
    pub suffix_separator: char,
    pub marker_strip: MarkerStrip,
    pub length_rule: LengthRule,
    pub operational: OperationalRule,
}

impl Default for CodeRules {
    fn default() -> Self {
        Self {
            prefix_strip: vec!["RT-".to_string()],
            suffix_separator: '_',
            marker_strip: MarkerStrip::AnyLetter,
            length_rule: LengthRule::default(),
            operational: OperationalRule::default(),
        }
    }
}

/// Result of normalizing one matrix code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedCode {
    /// Code with the manufacturer prefix and variant suffix removed.
    pub cleaned: String,
    pub family_code: String,
    pub diameter_code: Option<String>,
    pub category: Category,
}

impl NormalizedCode {
    /// The record returned for blank input.
    pub fn neutral() -> Self {
        Self::default()
    }
}

impl CodeRules {
    /// Steps 1 and 2: prefix and variant suffix, then one feed marker letter.
    pub fn clean<'a>(&self, code: &'a str) -> &'a str {
        let mut s = code.trim();

        if let Some(prefix) = self
            .prefix_strip
            .iter()
            .find(|p| !p.is_empty() && starts_with_ignore_case(s, p))
        {
            s = &s[prefix.len()..];
        }

        if let Some(pos) = s.rfind(self.suffix_separator) {
            let tail = &s[pos + self.suffix_separator.len_utf8()..];
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                s = &s[..pos];
            }
        }

        s
    }

    /// Family code and diameter variant of a matrix code. Blank input yields `("", None)`.
    pub fn family_of(&self, code: &str) -> (String, Option<String>) {
        let cleaned = self.clean(code);
        let mut rest = cleaned;
        if let Some(first) = rest.chars().next()
            && self.marker_strip.matches(first)
        {
            rest = &rest[first.len_utf8()..];
        }

        let digit_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let digits = &rest[..digit_len];
        let (family, variant) = self.length_rule.split(digits);
        (family.to_string(), variant.map(str::to_string))
    }

    /// Full normalization against a category table. Never panics; blank input is neutral.
    pub fn normalize(&self, code: &str, table: &CategoryTable) -> NormalizedCode {
        if code.trim().is_empty() {
            return NormalizedCode::neutral();
        }
        let (family_code, diameter_code) = self.family_of(code);
        let category = table.classify(&family_code);
        NormalizedCode {
            cleaned: self.clean(code).to_string(),
            family_code,
            diameter_code,
            category,
        }
    }

    /// Family code of an operational identifier, if it can be attributed at all.
    pub fn operational_family(&self, id: &str) -> Option<String> {
        self.operational.extract(id).map(str::to_string)
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Normalizes with the default rules and the built-in category patterns.
pub fn normalize(code: &str) -> NormalizedCode {
    CodeRules::default().normalize(code, &CategoryTable::builtin())
}

/// Operational family with the default rules.
pub fn operational_family(id: &str) -> Option<String> {
    CodeRules::default().operational_family(id)
}
