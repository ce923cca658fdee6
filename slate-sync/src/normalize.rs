// Player name normalization shared by the salary slate and the reference table.
//
// Both sides of a match must go through the exact same function, otherwise
// keys drift apart ("P.J. Washington Jr." vs "PJ Washington").

use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Generational suffixes removed from the end of a name. " III" is listed
/// before " II" so the longer token wins; only one suffix is ever removed.
const SUFFIXES: [&str; 5] = [" Jr", " III", " II", " IV", " Sr"];

/// Canonicalize a display name into a comparison key.
///
/// Folds accents away (NFKD, combining marks dropped), drops every character
/// that is not alphanumeric or whitespace, strips one trailing generational
/// suffix, then removes whitespace and lowercases. Never fails: garbage in
/// yields a reduced (possibly empty) key.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim_end();

    let stem = SUFFIXES
        .iter()
        .find_map(|suffix| cleaned.strip_suffix(suffix))
        .unwrap_or(cleaned);

    // Lowercasing can emit combining marks, so filter after it too.
    stem.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() && !is_combining_mark(*c))
        .collect()
}

// ---------------------------------------------------------------------------
// Manual overrides
// ---------------------------------------------------------------------------

/// Known aliases that defeat the automatic rules (nicknames, spelling
/// variants), mapped to the key the reference table produces.
#[derive(Debug, Clone, Default)]
pub struct NameOverrides {
    map: HashMap<String, String>,
}

impl NameOverrides {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    /// The built-in corrections for names known to mismatch between the
    /// contest export and the league's player list.
    pub fn builtin() -> Self {
        let map = [("jakobpoltl", "jakobpoeltl"), ("ggjackson", "gregoryjackson")]
            .into_iter()
            .map(|(alias, key)| (alias.to_string(), key.to_string()))
            .collect();
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Comparison key for a display name: the override target when the
    /// name's key is a known alias, otherwise the normalized key itself.
    pub fn key_for(&self, name: &str) -> String {
        let key = normalize_name(name);
        match self.map.get(&key) {
            Some(corrected) => corrected.clone(),
            None => key,
        }
    }
}
