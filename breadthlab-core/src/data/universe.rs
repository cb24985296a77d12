//! Universe configuration: sector-organized instrument lists.
//!
//! The universe is stored as a TOML file mapping sector names to member
//! identifiers. Breadth is computed over the flattened list; sectors only
//! exist to keep hand-maintained lists readable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All identifiers across sectors, in sector order, without duplicates.
    pub fn identifiers(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.sectors
            .values()
            .flatten()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn sector(&self, name: &str) -> Option<&[String]> {
        self.sectors.get(name).map(|v| v.as_slice())
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.identifiers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.values().all(|v| v.is_empty())
    }

    /// Large-cap Taiwan Stock Exchange names.
    pub fn default_twse() -> Self {
        let mut sectors = BTreeMap::new();
        let mut add = |name: &str, ids: &[&str]| {
            sectors.insert(name.to_string(), ids.iter().map(|s| s.to_string()).collect());
        };

        add("Semiconductors", &["2330.TW", "2454.TW", "2303.TW"]);
        add("Electronics", &["2317.TW"]);
        add("Plastics", &["1301.TW", "1303.TW"]);
        add("Financials", &["2881.TW", "2882.TW"]);

        Self { sectors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_has_eight_names() {
        let u = Universe::default_twse();
        assert_eq!(u.len(), 8);
        assert!(u.sector_names().contains(&"Semiconductors"));
        assert!(u.identifiers().contains(&"2330.TW".to_string()));
    }

    #[test]
    fn toml_roundtrip() {
        let u = Universe::default_twse();
        let parsed = Universe::from_toml(&u.to_toml().unwrap()).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn identifiers_are_deduplicated() {
        let u = Universe::from_toml(
            r#"
            [sectors]
            A = ["X", "Y"]
            B = ["Y", "Z"]
            "#,
        )
        .unwrap();
        assert_eq!(u.identifiers(), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn empty_sectors_are_empty_universe() {
        let u = Universe::from_toml("[sectors]\nA = []\n").unwrap();
        assert!(u.is_empty());
    }
}
