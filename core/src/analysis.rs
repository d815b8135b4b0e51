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

use crate::classifier::{Classifier, UnmappedGenres};
use crate::frequency::{
    whole_percent, Frequencies, FrequencyAggregator, SubGenrePolicy, DEFAULT_SUBGENRE_LIMIT,
};
use crate::gradient::GradientTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Entries kept per distribution in a finished analysis.
pub const TOP_GENRES: usize = 10;

/// One meta-genre bucket of a user's listening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaGenreShare {
    pub genre: String,
    pub portion: f64,
    pub gradient: String,
}

/// One sub-genre bucket, with the meta-genre it resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGenreShare {
    pub genre: String,
    pub portion: f64,
    pub parent_genre: String,
    pub gradient: String,
}

/// The headline sub-genre. Both names are `None` when nothing qualifies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopSubGenre {
    pub sub_genre: Option<String>,
    pub parent_genre: Option<String>,
    #[serde(default)]
    pub gradient: Option<String>,
}

/// Per-user genre analysis. Both lists are sorted by portion, largest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreAnalysis {
    pub sub_genres: Vec<SubGenreShare>,
    pub meta_genres: Vec<MetaGenreShare>,
    pub top_subgenre: TopSubGenre,
    /// Plain-language line built by [`summarize`]. Absent in older documents.
    #[serde(default)]
    pub summary: String,
}

impl GenreAnalysis {
    /// Reads a stored analysis document. `None` if any required field is missing.
    pub fn from_document(document: &Value) -> Option<Self> {
        serde_json::from_value(document.clone()).ok()
    }

    pub fn sub_genre(&self, genre: &str) -> Option<&SubGenreShare> {
        self.sub_genres.iter().find(|share| share.genre == genre)
    }

    pub fn meta_genre(&self, genre: &str) -> Option<&MetaGenreShare> {
        self.meta_genres.iter().find(|share| share.genre == genre)
    }
}

/// Decides whether a stored analysis has to be rebuilt.
///
/// Recompute when forced, when nothing is stored, or when the stored document
/// no longer has the shape of a [`GenreAnalysis`]. There is no expiry.
pub fn should_recompute(cached: Option<&Value>, force: bool) -> bool {
    if force {
        return true;
    }

    match cached {
        None => true,
        Some(document) => GenreAnalysis::from_document(document).is_none(),
    }
}

/// One-line plain-language description of the two largest meta-genres.
///
/// Percentages are whole numbers taken from the raw counts, halves rounded
/// to even.
pub fn summarize(meta: &Frequencies) -> String {
    let mut top = meta.counts.iter();

    let Some((primary, primary_count)) = top.next() else {
        return "We couldn't find enough genre data to summarize your taste.".to_string();
    };

    let mut summary = format!(
        "You mostly listen to {} music ({}%).",
        primary,
        whole_percent(*primary_count, meta.total)
    );
    if let Some((secondary, secondary_count)) = top.next() {
        summary.push_str(&format!(
            " You also listen to a lot of {} ({}%).",
            secondary,
            whole_percent(*secondary_count, meta.total)
        ));
    }
    summary
}

/// Builds [`GenreAnalysis`] results from raw tag lists.
#[derive(Debug, Clone)]
pub struct Analyzer {
    aggregator: FrequencyAggregator,
    gradients: Arc<GradientTable>,
}

impl Analyzer {
    pub fn new(classifier: Classifier, gradients: Arc<GradientTable>) -> Self {
        Self {
            aggregator: FrequencyAggregator::new(classifier),
            gradients,
        }
    }

    pub fn with_policy(mut self, policy: SubGenrePolicy) -> Self {
        self.aggregator = self.aggregator.with_policy(policy);
        self
    }

    pub fn classifier(&self) -> &Classifier {
        self.aggregator.classifier()
    }

    /// Same tables and policy, with unmapped genres counted in `unmapped`.
    pub fn with_unmapped(&self, unmapped: Arc<UnmappedGenres>) -> Self {
        let classifier = self.classifier().with_unmapped(unmapped);
        Self {
            aggregator: FrequencyAggregator::new(classifier).with_policy(self.aggregator.policy()),
            gradients: Arc::clone(&self.gradients),
        }
    }

    /// Never fails: empty or unrecognised input produces a trivial result.
    pub fn analyze<S: AsRef<str>>(&self, raw_tags: &[S]) -> GenreAnalysis {
        let classifier = self.aggregator.classifier();

        let meta = self.aggregator.meta_genre_frequencies(raw_tags);
        let mut meta_genres: Vec<MetaGenreShare> = meta
            .counts
            .iter()
            .map(|(genre, count)| MetaGenreShare {
                genre: genre.clone(),
                portion: meta.portion_of(*count),
                gradient: self.gradients.gradient_for(genre).to_string(),
            })
            .collect();
        meta_genres.sort_by(|a, b| b.portion.total_cmp(&a.portion));
        meta_genres.truncate(TOP_GENRES);

        let subs = self
            .aggregator
            .subgenre_frequencies(raw_tags, DEFAULT_SUBGENRE_LIMIT);
        let mut sub_genres: Vec<SubGenreShare> = subs
            .counts
            .iter()
            .map(|(genre, count)| {
                let parent = classifier.resolve(genre);
                SubGenreShare {
                    genre: genre.clone(),
                    portion: subs.portion_of(*count),
                    parent_genre: parent.to_string(),
                    gradient: self.gradients.gradient_for(parent).to_string(),
                }
            })
            .collect();
        sub_genres.sort_by(|a, b| b.portion.total_cmp(&a.portion));

        // Picked before the cut so a real sub-genre below the top ten still qualifies.
        let top_subgenre = sub_genres
            .iter()
            .find(|share| share.genre != share.parent_genre)
            .map(|share| TopSubGenre {
                sub_genre: Some(share.genre.clone()),
                parent_genre: Some(share.parent_genre.clone()),
                gradient: Some(share.gradient.clone()),
            })
            .unwrap_or_default();
        sub_genres.truncate(TOP_GENRES);

        GenreAnalysis {
            sub_genres,
            meta_genres,
            top_subgenre,
            summary: summarize(&meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{TaxonomyTable, OTHER_GENRE};
    use serde_json::json;

    fn analyzer_with(pairs: &[(&str, &str)]) -> Analyzer {
        let taxonomy = TaxonomyTable::from_pairs(pairs.iter().copied()).unwrap();
        let classifier = Classifier::new(Arc::new(taxonomy), Arc::new(UnmappedGenres::new()));
        Analyzer::new(classifier, Arc::new(GradientTable::default()))
    }

    fn analyzer() -> Analyzer {
        analyzer_with(&[
            ("dream pop", "pop"),
            ("uk drill", "hip hop"),
            ("rock", "rock"),
        ])
    }

    fn portions_meta(analysis: &GenreAnalysis) -> Vec<(&str, f64)> {
        analysis
            .meta_genres
            .iter()
            .map(|s| (s.genre.as_str(), s.portion))
            .collect()
    }

    fn portions_sub(analysis: &GenreAnalysis) -> Vec<(&str, f64)> {
        analysis
            .sub_genres
            .iter()
            .map(|s| (s.genre.as_str(), s.portion))
            .collect()
    }

    #[test]
    fn test_mixed_listening_history() {
        let analysis = analyzer().analyze(&["dream pop", "dream pop", "uk drill", "rock"]);

        assert_eq!(
            portions_meta(&analysis),
            vec![("pop", 50.0), ("hip hop", 25.0), ("rock", 25.0)]
        );
        assert_eq!(
            portions_sub(&analysis),
            vec![("dream pop", 50.0), ("uk drill", 25.0), ("rock", 25.0)]
        );
        assert_eq!(analysis.top_subgenre.sub_genre.as_deref(), Some("dream pop"));
        assert_eq!(analysis.top_subgenre.parent_genre.as_deref(), Some("pop"));
        assert_eq!(
            analysis.top_subgenre.gradient.as_deref(),
            Some("linear-gradient(to right, #90D5FF, #c6e8ff)")
        );
    }

    #[test]
    fn test_sub_genre_entries_carry_parent_and_gradient() {
        let analysis = analyzer().analyze(&["uk drill"]);
        let drill = analysis.sub_genre("uk drill").unwrap();
        assert_eq!(drill.parent_genre, "hip hop");
        assert_eq!(drill.gradient, "linear-gradient(to right, #f7cac9, #fadcdc)");
        assert_eq!(
            analysis.meta_genre("hip hop").unwrap().gradient,
            "linear-gradient(to right, #f7cac9, #fadcdc)"
        );
    }

    #[test]
    fn test_only_meta_genre_names_leaves_no_top_subgenre() {
        let analysis = analyzer_with(&[("jazz", "jazz")]).analyze(&["jazz"]);

        assert_eq!(portions_meta(&analysis), vec![("jazz", 100.0)]);
        assert_eq!(portions_sub(&analysis), vec![("jazz", 100.0)]);
        assert_eq!(analysis.top_subgenre, TopSubGenre::default());
        assert_eq!(analysis.top_subgenre.sub_genre, None);
        assert_eq!(analysis.top_subgenre.parent_genre, None);
    }

    #[test]
    fn test_empty_tags() {
        let tags: [&str; 0] = [];
        let analysis = analyzer().analyze(&tags);

        assert!(analysis.meta_genres.is_empty());
        assert!(analysis.sub_genres.is_empty());
        assert_eq!(analysis.top_subgenre, TopSubGenre::default());
    }

    #[test]
    fn test_all_unmapped_tags_collapse_into_other() {
        let analyzer = analyzer();
        let analysis = analyzer.analyze(&["hyperpop", "zouk", "hyperpop"]);

        assert_eq!(portions_meta(&analysis), vec![(OTHER_GENRE, 100.0)]);
        assert_eq!(analysis.top_subgenre.sub_genre.as_deref(), Some("hyperpop"));
        assert_eq!(analysis.top_subgenre.parent_genre.as_deref(), Some(OTHER_GENRE));
        assert_eq!(analyzer.classifier().unmapped().total(), 3);
    }

    #[test]
    fn test_with_unmapped_keeps_policy_and_isolates_counts() {
        let shared = analyzer().with_policy(SubGenrePolicy::ExcludeMetaGenres);
        let own = Arc::new(UnmappedGenres::new());
        let scoped = shared.with_unmapped(Arc::clone(&own));

        let analysis = scoped.analyze(&["hyperpop", "rock"]);
        assert!(analysis.sub_genre("rock").is_none());
        assert_eq!(own.count("hyperpop"), 1);
        assert!(shared.classifier().unmapped().is_empty());
    }

    #[test]
    fn test_top_subgenre_skips_meta_genre_names() {
        let analysis = analyzer_with(&[("shoegaze", "rock")])
            .analyze(&["rock", "rock", "rock", "shoegaze"]);

        assert_eq!(analysis.sub_genres[0].genre, "rock");
        assert_eq!(analysis.top_subgenre.sub_genre.as_deref(), Some("shoegaze"));
        assert_eq!(analysis.top_subgenre.parent_genre.as_deref(), Some("rock"));
    }

    #[test]
    fn test_top_subgenre_can_come_from_below_the_cut() {
        let metas = [
            "rock", "pop", "jazz", "folk", "metal", "blues", "latin", "country", "reggae",
            "classical", "vocal",
        ];
        let pairs: Vec<(&str, &str)> = metas
            .iter()
            .map(|m| (*m, *m))
            .chain(std::iter::once(("shoegaze", "rock")))
            .collect();

        let mut tags: Vec<&str> = Vec::new();
        for meta in metas {
            tags.extend([meta, meta]);
        }
        tags.push("shoegaze");

        let analysis = analyzer_with(&pairs).analyze(&tags);
        assert_eq!(analysis.sub_genres.len(), TOP_GENRES);
        assert!(analysis.sub_genre("shoegaze").is_none());
        assert_eq!(analysis.top_subgenre.sub_genre.as_deref(), Some("shoegaze"));
    }

    #[test]
    fn test_distributions_are_capped_at_ten() {
        let tags: Vec<String> = (0..25)
            .flat_map(|i| vec![format!("genre {i}"); 25 - i])
            .collect();
        let pairs: Vec<(String, String)> = (0..25)
            .map(|i| (format!("genre {i}"), format!("meta {i}")))
            .collect();
        let taxonomy = TaxonomyTable::from_pairs(pairs).unwrap();
        let classifier = Classifier::new(Arc::new(taxonomy), Arc::new(UnmappedGenres::new()));
        let analysis = Analyzer::new(classifier, Arc::new(GradientTable::default())).analyze(&tags);

        assert_eq!(analysis.meta_genres.len(), TOP_GENRES);
        assert_eq!(analysis.sub_genres.len(), TOP_GENRES);
        assert_eq!(analysis.sub_genres[0].genre, "genre 0");
        assert_eq!(analysis.meta_genres[0].genre, "meta 0");

        let kept: f64 = analysis.meta_genres.iter().map(|s| s.portion).sum();
        assert!(kept < 100.0);
    }

    #[test]
    fn test_exclude_policy_removes_meta_names_from_sub_genres() {
        let analysis = analyzer()
            .with_policy(SubGenrePolicy::ExcludeMetaGenres)
            .analyze(&["dream pop", "rock", "rock", "pop"]);

        assert_eq!(portions_sub(&analysis), vec![("dream pop", 100.0)]);
        assert_eq!(
            portions_meta(&analysis),
            vec![("pop", 50.0), ("rock", 50.0)]
        );
        assert_eq!(analysis.top_subgenre.sub_genre.as_deref(), Some("dream pop"));
    }

    #[test]
    fn test_exclude_policy_with_only_meta_names() {
        let analysis = analyzer_with(&[("jazz", "jazz")])
            .with_policy(SubGenrePolicy::ExcludeMetaGenres)
            .analyze(&["jazz"]);

        assert!(analysis.sub_genres.is_empty());
        assert_eq!(portions_meta(&analysis), vec![("jazz", 100.0)]);
        assert_eq!(analysis.top_subgenre, TopSubGenre::default());
    }

    #[test]
    fn test_should_recompute_without_cache() {
        assert!(should_recompute(None, false));
        assert!(should_recompute(Some(&Value::Null), false));
    }

    #[test]
    fn test_should_recompute_when_forced() {
        let stored = serde_json::to_value(analyzer().analyze(&["rock"])).unwrap();
        assert!(should_recompute(Some(&stored), true));
        assert!(should_recompute(None, true));
    }

    #[test]
    fn test_complete_cache_is_reused() {
        let stored = serde_json::to_value(analyzer().analyze(&["rock", "dream pop"])).unwrap();
        assert!(!should_recompute(Some(&stored), false));
        assert_eq!(
            GenreAnalysis::from_document(&stored),
            Some(analyzer().analyze(&["rock", "dream pop"]))
        );
    }

    #[test]
    fn test_cache_missing_sub_genres_is_recomputed() {
        let stored = json!({
            "meta_genres": [],
            "top_subgenre": { "sub_genre": null, "parent_genre": null }
        });
        assert!(should_recompute(Some(&stored), false));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(analyzer().analyze(&["dream pop"])).unwrap();
        assert_eq!(value["sub_genres"][0]["genre"], "dream pop");
        assert_eq!(value["sub_genres"][0]["parent_genre"], "pop");
        assert_eq!(value["meta_genres"][0]["portion"], 100.0);
        assert_eq!(value["top_subgenre"]["sub_genre"], "dream pop");
    }

    #[test]
    fn test_summary_mentions_top_two_meta_genres() {
        let analysis = analyzer().analyze(&["dream pop", "dream pop", "uk drill"]);
        assert_eq!(
            analysis.summary,
            "You mostly listen to pop music (67%). You also listen to a lot of hip hop (33%)."
        );
    }

    #[test]
    fn test_summary_halves_round_to_even() {
        let mut tags = vec!["a"];
        tags.extend(["b"; 7]);
        let analysis = analyzer_with(&[("a", "x"), ("b", "y")]).analyze(&tags);

        assert_eq!(
            analysis.summary,
            "You mostly listen to y music (88%). You also listen to a lot of x (12%)."
        );
        assert_eq!(analysis.meta_genre("x").unwrap().portion, 12.5);
    }

    #[test]
    fn test_sixteenths_round_to_even() {
        let mut tags = vec!["a"];
        tags.extend(["b"; 15]);
        let analysis = analyzer_with(&[("a", "x"), ("b", "y")]).analyze(&tags);

        assert_eq!(analysis.meta_genre("x").unwrap().portion, 6.2);
        assert_eq!(analysis.sub_genre("a").unwrap().portion, 6.2);
        assert_eq!(analysis.meta_genre("y").unwrap().portion, 93.8);
    }

    #[test]
    fn test_summary_single_and_empty() {
        let analysis = analyzer().analyze(&["rock"]);
        assert_eq!(analysis.summary, "You mostly listen to rock music (100%).");

        let tags: [&str; 0] = [];
        assert!(analyzer().analyze(&tags).summary.starts_with("We couldn't find"));
    }

    #[test]
    fn test_document_without_summary_is_still_usable() {
        let mut stored = serde_json::to_value(analyzer().analyze(&["rock"])).unwrap();
        stored.as_object_mut().unwrap().remove("summary");

        assert!(!should_recompute(Some(&stored), false));
        assert_eq!(GenreAnalysis::from_document(&stored).unwrap().summary, "");
    }
}
