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

pub mod analysis;
pub mod auth;
pub mod classifier;
pub mod frequency;
pub mod gradient;
pub mod listener;
pub mod models;
pub mod service;
pub mod store;
pub mod taxonomy;

// Re-export key items for convenience
pub use analysis::{should_recompute, summarize, Analyzer, GenreAnalysis, TopSubGenre};
pub use auth::get_spotify_client;
pub use classifier::{Classifier, UnmappedGenres};
pub use frequency::{FrequencyAggregator, Frequencies, SubGenrePolicy};
pub use gradient::GradientTable;
pub use listener::{GenreSource, SpotifyListener};
pub use service::GenreService;
pub use store::{
    AnalysisSnapshot, AnalysisStore, JsonFileStore, MemoryStore, PlaylistStore, StoredPlaylists,
};
pub use taxonomy::{TaxonomyTable, OTHER_GENRE};
