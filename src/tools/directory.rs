//! Counterparty reference data behind the `search_places` tool.

use serde::{Deserialize, Serialize};

/// A business the assistant can look up and call.  Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    pub name: String,
    pub location: String,
    pub rating: f32,
}

impl Counterparty {
    pub fn new(id: &str, name: &str, location: &str, rating: f32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            rating,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaceDirectory
// ---------------------------------------------------------------------------

/// Injectable lookup of counterparties by location.
pub trait PlaceDirectory: Send + Sync {
    /// Every entry whose location tag contains `location`, ignoring case.
    fn search(&self, location: &str) -> Vec<Counterparty>;
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// In-memory directory over a fixed list of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<Counterparty>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<Counterparty>) -> Self {
        Self { entries }
    }

    /// The four-entry sample directory shipped with the bridge.
    pub fn sample() -> Self {
        Self::new(vec![
            Counterparty::new("1", "Tony & Guy", "Adyar", 4.5),
            Counterparty::new("2", "Green Trends", "Adyar", 4.2),
            Counterparty::new("3", "Naturals", "Velachery", 4.0),
            Counterparty::new("4", "Vurve Signature", "Nungambakkam", 4.8),
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PlaceDirectory for StaticDirectory {
    fn search(&self, location: &str) -> Vec<Counterparty> {
        let needle = location.to_lowercase();
        self.entries
            .iter()
            .filter(|c| c.location.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_has_four_entries() {
        assert_eq!(StaticDirectory::sample().len(), 4);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let dir = StaticDirectory::sample();
        let names: Vec<_> = dir.search("adyar").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Tony & Guy", "Green Trends"]);

        assert_eq!(dir.search("NUNGAM").len(), 1);
    }

    #[test]
    fn search_without_match_is_empty() {
        assert!(StaticDirectory::sample().search("Nowhere").is_empty());
    }
}
