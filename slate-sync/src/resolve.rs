// Identity resolution: team abbreviations to team ids, display names to
// player ids through an index built once per run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::Database;
use crate::normalize::NameOverrides;
use crate::reference::PlayerIdentity;

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Read access to the reference tables. Not-found is `Ok(None)`; `Err` means
/// the store itself failed.
pub trait ReferenceStore {
    fn team_id(&self, abbrev: &str) -> Result<Option<i64>>;
    fn player_reference(&self) -> Result<Vec<PlayerIdentity>>;
}

impl ReferenceStore for Database {
    fn team_id(&self, abbrev: &str) -> Result<Option<i64>> {
        self.team_id_by_abbrev(abbrev)
    }

    fn player_reference(&self) -> Result<Vec<PlayerIdentity>> {
        Database::player_reference(self)
    }
}

// ---------------------------------------------------------------------------
// Team resolver
// ---------------------------------------------------------------------------

/// Per-run memo of abbreviation lookups. Misses are cached too, so each
/// distinct abbreviation costs at most one store round-trip.
#[derive(Debug, Default)]
pub struct TeamResolver {
    cache: HashMap<String, Option<i64>>,
}

impl TeamResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<S: ReferenceStore + ?Sized>(
        &mut self,
        store: &S,
        abbrev: &str,
    ) -> Result<Option<i64>> {
        let key = abbrev.trim().to_uppercase();
        if let Some(hit) = self.cache.get(&key) {
            return Ok(*hit);
        }
        let id = store.team_id(&key)?;
        if id.is_none() {
            debug!(abbrev = %key, "team abbreviation not in reference table");
        }
        self.cache.insert(key, id);
        Ok(id)
    }

    /// Number of distinct abbreviations looked up so far.
    pub fn lookups(&self) -> usize {
        self.cache.len()
    }
}

// ---------------------------------------------------------------------------
// Player index
// ---------------------------------------------------------------------------

/// Which id keeps a normalized key when two reference players share it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    LastWins,
    FirstWins,
}

/// Normalized name key to player id.
#[derive(Debug)]
pub struct PlayerIndex {
    by_key: HashMap<String, i64>,
    overrides: NameOverrides,
    collisions: usize,
}

impl PlayerIndex {
    /// Key every reference player with the same scheme used for slate names.
    /// Distinct ids landing on one key are counted and logged; `policy`
    /// decides which one stays.
    pub fn build(
        reference: &[PlayerIdentity],
        overrides: &NameOverrides,
        policy: CollisionPolicy,
    ) -> Self {
        let mut by_key: HashMap<String, i64> = HashMap::with_capacity(reference.len());
        let mut collisions = 0;

        for player in reference {
            let key = overrides.key_for(&player.full_name);
            if key.is_empty() {
                continue;
            }
            match by_key.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(player.id);
                }
                Entry::Occupied(mut slot) => {
                    let existing = *slot.get();
                    if existing == player.id {
                        continue;
                    }
                    collisions += 1;
                    let kept = match policy {
                        CollisionPolicy::LastWins => {
                            slot.insert(player.id);
                            player.id
                        }
                        CollisionPolicy::FirstWins => existing,
                    };
                    warn!(
                        key = %slot.key(),
                        existing,
                        incoming = player.id,
                        kept,
                        "player name key collision"
                    );
                }
            }
        }

        Self {
            by_key,
            overrides: overrides.clone(),
            collisions,
        }
    }

    /// Player id for a display name, or `None` when unmatched.
    pub fn resolve(&self, display_name: &str) -> Option<i64> {
        self.by_key.get(&self.overrides.key_for(display_name)).copied()
    }

    /// The comparison key a display name is looked up under.
    pub fn key_for(&self, display_name: &str) -> String {
        self.overrides.key_for(display_name)
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingStore {
        teams: HashMap<String, i64>,
        team_calls: Cell<usize>,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                teams: HashMap::from([("BOS".to_string(), 1), ("NYK".to_string(), 2)]),
                team_calls: Cell::new(0),
            }
        }
    }

    impl ReferenceStore for CountingStore {
        fn team_id(&self, abbrev: &str) -> Result<Option<i64>> {
            self.team_calls.set(self.team_calls.get() + 1);
            Ok(self.teams.get(abbrev).copied())
        }

        fn player_reference(&self) -> Result<Vec<PlayerIdentity>> {
            Ok(Vec::new())
        }
    }

    struct BrokenStore;

    impl ReferenceStore for BrokenStore {
        fn team_id(&self, _abbrev: &str) -> Result<Option<i64>> {
            anyhow::bail!("connection refused")
        }

        fn player_reference(&self) -> Result<Vec<PlayerIdentity>> {
            anyhow::bail!("connection refused")
        }
    }

    fn player(id: i64, name: &str) -> PlayerIdentity {
        PlayerIdentity {
            id,
            full_name: name.to_string(),
            is_active: true,
        }
    }

    // -- team resolver --

    #[test]
    fn team_lookups_are_memoized_including_misses() {
        let store = CountingStore::new();
        let mut resolver = TeamResolver::new();

        for _ in 0..3 {
            assert_eq!(resolver.resolve(&store, "NYK").unwrap(), Some(2));
            assert_eq!(resolver.resolve(&store, "XXX").unwrap(), None);
        }
        assert_eq!(resolver.resolve(&store, "nyk").unwrap(), Some(2));
        assert_eq!(store.team_calls.get(), 2);
        assert_eq!(resolver.lookups(), 2);
    }

    #[test]
    fn team_store_failure_propagates() {
        let mut resolver = TeamResolver::new();
        assert!(resolver.resolve(&BrokenStore, "BOS").is_err());
    }

    // -- player index --

    #[test]
    fn resolves_across_punctuation_and_suffixes() {
        let reference = vec![player(1, "P.J. Washington"), player(2, "Jaren Jackson Jr.")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::LastWins);

        assert_eq!(index.resolve("PJ Washington Jr."), Some(1));
        assert_eq!(index.resolve("Jaren Jackson"), Some(2));
        assert_eq!(index.resolve("Nobody Here"), None);
        assert_eq!(index.collisions(), 0);
    }

    #[test]
    fn accented_reference_names_match_ascii_slate_names() {
        let reference = vec![player(203999, "Nikola Jokić"), player(1629029, "Luka Dončić")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::LastWins);

        assert_eq!(index.resolve("Nikola Jokic"), Some(203999));
        assert_eq!(index.resolve("Luka Doncic"), Some(1629029));
        assert_eq!(index.key_for("Nikola Jokić"), index.key_for("Nikola Jokic"));
    }

    #[test]
    fn overrides_apply_to_slate_names() {
        let reference = vec![player(1627832, "Jakob Poeltl"), player(1630581, "Gregory Jackson")];
        let index = PlayerIndex::build(&reference, &NameOverrides::builtin(), CollisionPolicy::LastWins);

        assert_eq!(index.resolve("Jakob Poltl"), Some(1627832));
        assert_eq!(index.resolve("GG Jackson"), Some(1630581));
        assert_eq!(index.key_for("GG Jackson II"), "gregoryjackson");
    }

    #[test]
    fn collision_last_wins_by_default() {
        let reference = vec![player(10, "Marcus Morris"), player(20, "Marcus Morris Sr.")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::default());
        assert_eq!(index.collisions(), 1);
        assert_eq!(index.resolve("Marcus Morris"), Some(20));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn collision_first_wins_when_configured() {
        let reference = vec![player(10, "Marcus Morris"), player(20, "Marcus Morris Sr.")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::FirstWins);
        assert_eq!(index.collisions(), 1);
        assert_eq!(index.resolve("Marcus Morris"), Some(10));
    }

    #[test]
    fn same_id_twice_is_not_a_collision() {
        let reference = vec![player(5, "A B"), player(5, "A. B.")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::LastWins);
        assert_eq!(index.collisions(), 0);
    }

    #[test]
    fn empty_keys_are_not_indexed() {
        let reference = vec![player(1, "..."), player(2, "")];
        let index = PlayerIndex::build(&reference, &NameOverrides::default(), CollisionPolicy::LastWins);
        assert!(index.is_empty());
        assert_eq!(index.resolve("?"), None);
    }

    #[test]
    fn policy_deserializes_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: CollisionPolicy,
        }
        let w: Wrapper = toml::from_str(r#"policy = "first_wins""#).unwrap();
        assert_eq!(w.policy, CollisionPolicy::FirstWins);
    }
}
