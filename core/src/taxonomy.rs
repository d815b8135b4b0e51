/*
    spotify-genres-rs | Genre taxonomy analysis for Spotify listening history.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parent assigned to every genre the taxonomy does not know.
pub const OTHER_GENRE: &str = "other";

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Failed to read taxonomy source: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid taxonomy JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed taxonomy entry ({location}): {reason}")]
    Malformed { location: String, reason: String },
    #[error("Taxonomy source contains no entries")]
    Empty,
}

/// Canonical form used for every taxonomy lookup: trimmed and lowercased.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Static sub-genre -> meta-genre mapping.
///
/// Built once at startup and shared read-only afterwards. Every parent that is
/// not itself a key is inserted mapped to itself, so resolving a meta-genre
/// name yields that same name.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyTable {
    parents: HashMap<String, String>,
    meta_genres: HashSet<String>,
}

impl TaxonomyTable {
    /// Loads the table from disk.
    ///
    /// Files ending in `.json` are read as a `{ "sub genre": "parent" }` object.
    /// Anything else is read as `sub genre,parent` lines; blank lines and lines
    /// starting with `#` are skipped, extra columns are ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let table = if is_json {
            Self::from_json(&contents)?
        } else {
            Self::from_csv(&contents)?
        };

        info!(
            "Loaded genre taxonomy from {} ({} entries, {} meta-genres)",
            path.display(),
            table.len(),
            table.meta_genres.len()
        );
        Ok(table)
    }

    pub fn from_csv(contents: &str) -> Result<Self, TaxonomyError> {
        let mut pairs = Vec::new();

        for (index, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (sub, rest) = line
                .split_once(',')
                .ok_or_else(|| TaxonomyError::Malformed {
                    location: format!("line {}", index + 1),
                    reason: "expected `sub_genre,parent_genre`".to_string(),
                })?;
            let parent = rest.split(',').next().unwrap_or_default();

            pairs.push((format!("line {}", index + 1), sub, parent));
        }

        Self::build(pairs)
    }

    pub fn from_json(contents: &str) -> Result<Self, TaxonomyError> {
        let raw: HashMap<String, String> = serde_json::from_str(contents)?;
        let mut entries: Vec<(String, String)> = raw.into_iter().collect();
        // Deterministic duplicate handling when two keys normalize to the same name.
        entries.sort();

        let pairs = entries
            .iter()
            .map(|(sub, parent)| (format!("key {:?}", sub), sub.as_str(), parent.as_str()));
        Self::build(pairs)
    }

    /// Builds a table from in-memory pairs. Later duplicates win.
    pub fn from_pairs<I, S, P>(pairs: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let owned: Vec<(S, P)> = pairs.into_iter().collect();
        let pairs = owned.iter().enumerate().map(|(i, (sub, parent))| {
            (format!("pair {}", i + 1), sub.as_ref(), parent.as_ref())
        });
        Self::build(pairs)
    }

    fn build<'a, I>(pairs: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = (String, &'a str, &'a str)>,
    {
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut meta_genres: HashSet<String> = HashSet::new();

        for (location, sub, parent) in pairs {
            let sub = normalize(sub);
            let parent = normalize(parent);

            if sub.is_empty() || parent.is_empty() {
                return Err(TaxonomyError::Malformed {
                    location,
                    reason: "sub-genre and parent genre must both be non-empty".to_string(),
                });
            }

            if let Some(previous) = parents.insert(sub.clone(), parent.clone()) {
                if previous != parent {
                    debug!(
                        "Taxonomy remaps '{}' from '{}' to '{}' ({})",
                        sub, previous, parent, location
                    );
                }
            }
            meta_genres.insert(parent);
        }

        if parents.is_empty() {
            return Err(TaxonomyError::Empty);
        }

        for parent in &meta_genres {
            parents
                .entry(parent.clone())
                .or_insert_with(|| parent.clone());
        }

        Ok(Self {
            parents,
            meta_genres,
        })
    }

    /// Parent meta-genre for `name`, or [`OTHER_GENRE`] when unknown.
    pub fn resolve(&self, name: &str) -> &str {
        self.lookup(name).unwrap_or(OTHER_GENRE)
    }

    /// Parent meta-genre for `name`, without the "other" fallback.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.parents.get(&normalize(name)).map(String::as_str)
    }

    /// True when `name` appears as a parent in the source table.
    pub fn is_meta_genre(&self, name: &str) -> bool {
        self.meta_genres.contains(&normalize(name))
    }

    /// Meta-genre names in alphabetical order.
    pub fn meta_genres(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.meta_genres.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}
