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

use crate::analysis::{should_recompute, Analyzer, GenreAnalysis};
use crate::classifier::UnmappedGenres;
use crate::listener::{GenreSource, SourceError};
use crate::store::{AnalysisSnapshot, AnalysisStore, StoreError};
use log::{debug, info};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to fetch listening data: {0}")]
    Source(#[from] SourceError),
    #[error("Failed to access analysis store: {0}")]
    Store(#[from] StoreError),
}

/// Serves per-user genre analyses, recomputing only when the stored one is
/// missing, unusable, or a refresh is requested.
pub struct GenreService<S, T> {
    source: S,
    store: T,
    analyzer: Analyzer,
}

impl<S, T> GenreService<S, T>
where
    S: GenreSource,
    T: AnalysisStore,
{
    pub fn new(source: S, store: T, analyzer: Analyzer) -> Self {
        Self {
            source,
            store,
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub async fn genre_analysis(
        &self,
        user_id: &str,
        refresh: bool,
    ) -> Result<GenreAnalysis, ServiceError> {
        let cached = self.store.load(user_id).await?;

        if !should_recompute(cached.as_ref(), refresh) {
            if let Some(analysis) = cached.as_ref().and_then(GenreAnalysis::from_document) {
                debug!("Serving stored genre analysis for {}", user_id);
                return Ok(analysis);
            }
        }

        self.recompute(user_id).await
    }

    /// Drops the stored analysis and builds a fresh one.
    pub async fn refresh(&self, user_id: &str) -> Result<GenreAnalysis, ServiceError> {
        self.invalidate(user_id).await?;
        self.genre_analysis(user_id, true).await
    }

    pub async fn invalidate(&self, user_id: &str) -> Result<(), ServiceError> {
        self.store.invalidate(user_id).await?;
        info!("Invalidated genre analysis for {}", user_id);
        Ok(())
    }

    async fn recompute(&self, user_id: &str) -> Result<GenreAnalysis, ServiceError> {
        let tags = self.source.genre_tags().await?;

        // Each run reports only its own unmapped genres.
        let unmapped = Arc::new(UnmappedGenres::new());
        let analysis = self
            .analyzer
            .with_unmapped(Arc::clone(&unmapped))
            .analyze(&tags);
        unmapped.log_report();

        let snapshot = AnalysisSnapshot::new(analysis);
        self.store.save(user_id, &snapshot).await?;

        info!(
            "Computed genre analysis for {} from {} tags ({} meta-genres, {} sub-genres)",
            user_id,
            tags.len(),
            snapshot.genre_analysis.meta_genres.len(),
            snapshot.genre_analysis.sub_genres.len()
        );
        Ok(snapshot.genre_analysis)
    }
}
