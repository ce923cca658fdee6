// Side-channel publishing of derived lists (slate ids, team lists) as
// comma-joined strings under well-known keys.

use anyhow::Result;

use crate::db::Database;

/// Key/value target for published lists. `set` overwrites.
pub trait Publisher {
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
}

impl Publisher for Database {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.kv_set(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.kv_get(key)
    }
}

/// Key holding the team list of one slate, e.g. `react_slate_teams_Main`.
pub fn team_list_key(prefix: &str, slate_id: &str) -> String {
    format!("{prefix}{slate_id}")
}

pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`join_list`]. Blank segments are dropped, so an empty value
/// is an empty list.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
