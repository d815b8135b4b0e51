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

use crate::taxonomy::{normalize, TaxonomyTable, OTHER_GENRE};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Caller-owned tally of genres that fell through to "other".
///
/// Purely diagnostic: nothing in the classifier reads it back.
#[derive(Debug, Default)]
pub struct UnmappedGenres {
    counts: Mutex<HashMap<String, u64>>,
}

impl UnmappedGenres {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds one occurrence. Returns `true` the first time a genre is seen.
    pub fn record(&self, genre: &str) -> bool {
        let mut counts = self.counts();
        let entry = counts.entry(genre.to_string()).or_insert(0);
        *entry += 1;
        *entry == 1
    }

    pub fn count(&self, genre: &str) -> u64 {
        self.counts().get(genre).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }

    /// Recorded genres, most frequent first (ties alphabetical).
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts()
            .iter()
            .map(|(genre, count)| (genre.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub fn clear(&self) {
        self.counts().clear();
    }

    pub fn log_report(&self) {
        let entries = self.snapshot();
        if entries.is_empty() {
            return;
        }

        info!("Genres categorized as '{}':", OTHER_GENRE);
        for (genre, count) in entries {
            info!("  '{}' -> {} (x{})", genre, OTHER_GENRE, count);
        }
    }
}

/// Resolves raw genre tags to meta-genres, recording the ones it cannot place.
#[derive(Debug, Clone)]
pub struct Classifier {
    taxonomy: Arc<TaxonomyTable>,
    unmapped: Arc<UnmappedGenres>,
}

impl Classifier {
    pub fn new(taxonomy: Arc<TaxonomyTable>, unmapped: Arc<UnmappedGenres>) -> Self {
        Self { taxonomy, unmapped }
    }

    /// Same taxonomy, recording misses into a different counter.
    pub fn with_unmapped(&self, unmapped: Arc<UnmappedGenres>) -> Self {
        Self {
            taxonomy: Arc::clone(&self.taxonomy),
            unmapped,
        }
    }

    /// Parent meta-genre of `raw_tag`, or "other".
    ///
    /// Unknown tags are recorded under their normalized name. The literal
    /// "other" and tags that are blank after trimming are never recorded:
    /// neither names a genre the taxonomy could be missing.
    pub fn classify(&self, raw_tag: &str) -> &str {
        let tag = normalize(raw_tag);
        let parent = self.taxonomy.resolve(&tag);

        if parent == OTHER_GENRE && tag != OTHER_GENRE && !tag.is_empty() {
            let first_sighting = self.unmapped.record(&tag);
            if first_sighting {
                info!("Unmapped genre: '{}'", tag);
            }
        }

        parent
    }

    /// Same answer as [`Classifier::classify`] without touching the diagnostics.
    pub fn resolve(&self, raw_tag: &str) -> &str {
        self.taxonomy.resolve(raw_tag)
    }

    pub fn taxonomy(&self) -> &TaxonomyTable {
        &self.taxonomy
    }

    pub fn unmapped(&self) -> &UnmappedGenres {
        &self.unmapped
    }
}
