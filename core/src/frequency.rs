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

use crate::classifier::Classifier;
use crate::taxonomy::normalize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many sub-genres the aggregator keeps before the analysis cut.
pub const DEFAULT_SUBGENRE_LIMIT: usize = 20;

/// Whether tags that are themselves meta-genre names count as sub-genres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubGenrePolicy {
    #[default]
    IncludeMetaGenres,
    ExcludeMetaGenres,
}

/// Occurrence counts, most frequent first.
///
/// `total` is the sum over every counted tag, including any entries dropped
/// by a top-N cut, so portions stay relative to the whole distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frequencies {
    pub counts: Vec<(String, u64)>,
    pub total: u64,
}

impl Frequencies {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, genre: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|(name, _)| name == genre)
            .map(|(_, count)| *count)
    }

    pub fn portion_of(&self, count: u64) -> f64 {
        portion(count, self.total)
    }

    pub fn portions(&self) -> Vec<(&str, f64)> {
        self.counts
            .iter()
            .map(|(name, count)| (name.as_str(), self.portion_of(*count)))
            .collect()
    }

    fn truncate(mut self, limit: usize) -> Self {
        self.counts.truncate(limit);
        self
    }
}

/// Percentage of `total`, rounded to one decimal. An empty total counts as 1.
pub fn portion(count: u64, total: u64) -> f64 {
    let denominator = total.max(1) as f64;
    round_to_tenth(100.0 * count as f64 / denominator)
}

/// Whole-number percentage of `total`. An empty total counts as 1.
pub fn whole_percent(count: u64, total: u64) -> u64 {
    let denominator = total.max(1) as f64;
    (100.0 * count as f64 / denominator).round_ties_even() as u64
}

// Halves go to the even neighbour: 6.25 -> 6.2, 12.5 -> 12.
fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Counts names, then orders by count descending with ties in first-seen order.
fn tally<I>(names: I) -> Frequencies
where
    I: IntoIterator<Item = String>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, u64)> = Vec::new();

    for name in names {
        match positions.get(&name).copied() {
            Some(index) => counts[index].1 += 1,
            None => {
                positions.insert(name.clone(), counts.len());
                counts.push((name, 1));
            }
        }
    }

    let total: u64 = counts.iter().map(|(_, count)| count).sum();
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    Frequencies { counts, total }
}

fn normalized_tags<S: AsRef<str>>(tags: &[S]) -> impl Iterator<Item = String> + '_ {
    tags.iter()
        .map(|tag| normalize(tag.as_ref()))
        .filter(|tag| !tag.is_empty())
}

/// Turns a flat list of raw tags into sub-genre and meta-genre distributions.
#[derive(Debug, Clone)]
pub struct FrequencyAggregator {
    classifier: Classifier,
    policy: SubGenrePolicy,
}

impl FrequencyAggregator {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            policy: SubGenrePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SubGenrePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SubGenrePolicy {
        self.policy
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Top `limit` normalized tags by occurrence. Blank tags are ignored.
    pub fn subgenre_frequencies<S: AsRef<str>>(&self, tags: &[S], limit: usize) -> Frequencies {
        let taxonomy = self.classifier.taxonomy();
        let policy = self.policy;

        let counted = normalized_tags(tags).filter(|tag| match policy {
            SubGenrePolicy::IncludeMetaGenres => true,
            SubGenrePolicy::ExcludeMetaGenres => !taxonomy.is_meta_genre(tag),
        });

        tally(counted).truncate(limit)
    }

    /// Occurrences per resolved parent. Unknown tags merge into "other".
    pub fn meta_genre_frequencies<S: AsRef<str>>(&self, tags: &[S]) -> Frequencies {
        let parents = normalized_tags(tags).map(|tag| self.classifier.classify(&tag).to_string());
        tally(parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::UnmappedGenres;
    use crate::taxonomy::{TaxonomyTable, OTHER_GENRE};
    use std::sync::Arc;

    fn aggregator() -> FrequencyAggregator {
        let taxonomy = TaxonomyTable::from_pairs([
            ("dream pop", "pop"),
            ("bedroom pop", "pop"),
            ("uk drill", "hip hop"),
            ("rock", "rock"),
        ])
        .unwrap();
        let classifier = Classifier::new(Arc::new(taxonomy), Arc::new(UnmappedGenres::new()));
        FrequencyAggregator::new(classifier)
    }

    #[test]
    fn test_portion_rounds_to_one_decimal() {
        assert_eq!(portion(1, 3), 33.3);
        assert_eq!(portion(2, 3), 66.7);
        assert_eq!(portion(1, 4), 25.0);
    }

    #[test]
    fn test_portion_halves_round_to_even() {
        assert_eq!(portion(1, 16), 6.2);
        assert_eq!(portion(5, 16), 31.2);
        assert_eq!(portion(3, 16), 18.8);
        assert_eq!(whole_percent(1, 8), 12);
        assert_eq!(whole_percent(7, 8), 88);
        assert_eq!(whole_percent(0, 0), 0);
    }

    #[test]
    fn test_portion_with_zero_total() {
        assert_eq!(portion(0, 0), 0.0);
    }

    #[test]
    fn test_subgenre_counts_normalized_tags() {
        let freq = aggregator()
            .subgenre_frequencies(&["Dream Pop", "dream pop ", "uk drill"], DEFAULT_SUBGENRE_LIMIT);
        assert_eq!(
            freq.counts,
            vec![("dream pop".to_string(), 2), ("uk drill".to_string(), 1)]
        );
        assert_eq!(freq.total, 3);
    }

    #[test]
    fn test_subgenre_ties_keep_first_seen_order() {
        let freq = aggregator().subgenre_frequencies(&["b", "a", "c", "a", "b"], 10);
        let names: Vec<&str> = freq.counts.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_subgenre_limit_keeps_full_total() {
        let tags = ["a", "a", "a", "b", "b", "c"];
        let freq = aggregator().subgenre_frequencies(&tags, 2);
        assert_eq!(freq.len(), 2);
        assert_eq!(freq.total, 6);
        assert_eq!(freq.portion_of(3), 50.0);
        assert_eq!(freq.get("c"), None);
    }

    #[test]
    fn test_subgenre_includes_meta_names_by_default() {
        let freq = aggregator().subgenre_frequencies(&["rock", "Pop", "dream pop"], 20);
        assert_eq!(freq.get("rock"), Some(1));
        assert_eq!(freq.get("pop"), Some(1));
        assert_eq!(freq.total, 3);
    }

    #[test]
    fn test_subgenre_exclude_policy_drops_meta_names() {
        let aggregator = aggregator().with_policy(SubGenrePolicy::ExcludeMetaGenres);
        let freq = aggregator.subgenre_frequencies(&["rock", "Pop", "dream pop", "hyperpop"], 20);
        assert_eq!(freq.get("rock"), None);
        assert_eq!(freq.get("pop"), None);
        assert_eq!(freq.get("dream pop"), Some(1));
        assert_eq!(freq.get("hyperpop"), Some(1));
        assert_eq!(freq.total, 2);
    }

    #[test]
    fn test_subgenre_does_not_touch_diagnostics() {
        let aggregator = aggregator();
        aggregator.subgenre_frequencies(&["hyperpop"], 20);
        assert!(aggregator.classifier().unmapped().is_empty());
    }

    #[test]
    fn test_meta_merges_siblings() {
        let freq = aggregator().meta_genre_frequencies(&["dream pop", "Bedroom Pop", "uk drill"]);
        assert_eq!(
            freq.counts,
            vec![("pop".to_string(), 2), ("hip hop".to_string(), 1)]
        );
    }

    #[test]
    fn test_meta_unknown_tags_share_other_bucket() {
        let aggregator = aggregator();
        let freq = aggregator.meta_genre_frequencies(&["hyperpop", "zouk", "hyperpop", "rock"]);
        assert_eq!(freq.get(OTHER_GENRE), Some(3));
        assert_eq!(freq.get("rock"), Some(1));
        assert_eq!(aggregator.classifier().unmapped().count("hyperpop"), 2);
        assert_eq!(aggregator.classifier().unmapped().count("zouk"), 1);
    }

    #[test]
    fn test_blank_tags_are_ignored() {
        let aggregator = aggregator();
        let tags = ["", "   ", "rock"];
        assert_eq!(aggregator.subgenre_frequencies(&tags, 20).total, 1);
        assert_eq!(aggregator.meta_genre_frequencies(&tags).total, 1);
    }

    #[test]
    fn test_empty_input_yields_empty_distributions() {
        let aggregator = aggregator();
        let tags: [&str; 0] = [];
        assert!(aggregator.subgenre_frequencies(&tags, 20).is_empty());
        let meta = aggregator.meta_genre_frequencies(&tags);
        assert!(meta.is_empty());
        assert_eq!(meta.total, 0);
    }

    #[test]
    fn test_meta_portions_sum_to_hundred() {
        let freq = aggregator().meta_genre_frequencies(&["dream pop", "uk drill", "rock"]);
        let sum: f64 = freq.portions().iter().map(|(_, p)| p).sum();
        assert!((sum - 100.0).abs() <= 0.1 * freq.len() as f64);
    }
}
