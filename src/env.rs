//! Environment lookups used while resolving uplink credentials.
//!
//! Resolution never touches `std::env` directly; it asks an [`EnvSource`],
//! so embedders and tests can hand in a fixed snapshot.

use std::collections::{BTreeMap, HashMap};

pub trait EnvSource: Send + Sync {
    /// Returns the value of `name`, or `None` when it is unset or not UTF-8.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Builds a snapshot from `(name, value)` pairs.
pub fn snapshot<I, K, V>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    vars.into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{EnvSource, ProcessEnv, snapshot};
    use std::collections::BTreeMap;

    #[test]
    fn snapshot_returns_only_known_names() {
        let env = snapshot([("NPM_TOKEN", "abc")]);
        assert_eq!(env.var("NPM_TOKEN").as_deref(), Some("abc"));
        assert_eq!(env.var("npm_token"), None);
        assert_eq!(env.var("OTHER"), None);
    }

    #[test]
    fn process_env_treats_empty_name_as_unset() {
        assert_eq!(ProcessEnv.var(""), None);
    }

    #[test]
    fn btree_map_serves_as_snapshot() {
        let env = BTreeMap::from([("NPM_TOKEN_TEST".to_string(), "fromBTree".to_string())]);
        let source: &dyn EnvSource = &env;
        assert_eq!(source.var("NPM_TOKEN_TEST").as_deref(), Some("fromBTree"));
        assert_eq!(source.var("NPM_TOKEN"), None);
    }
}
