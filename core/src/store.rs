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

use crate::analysis::GenreAnalysis;
use crate::models::PlaylistSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

const ANALYSIS_FIELD: &str = "genre_analysis";
const UPDATED_FIELD: &str = "genre_last_updated";
const PLAYLISTS_FIELD: &str = "playlists";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store contains invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A computed analysis together with the moment it was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub genre_analysis: GenreAnalysis,
    pub genre_last_updated: DateTime<Utc>,
}

impl AnalysisSnapshot {
    pub fn new(genre_analysis: GenreAnalysis) -> Self {
        Self {
            genre_analysis,
            genre_last_updated: Utc::now(),
        }
    }
}

/// Persistence for per-user analysis snapshots.
///
/// `load` hands back the raw stored document so callers can decide whether it
/// is still usable; see [`crate::analysis::should_recompute`].
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<Value>, StoreError>;

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn save(&self, user_id: &str, snapshot: &AnalysisSnapshot) -> Result<(), StoreError>;

    /// Unsets the stored analysis. Other fields of the user document survive.
    async fn invalidate(&self, user_id: &str) -> Result<(), StoreError>;
}

/// The playlists mirrored for one user.
///
/// `featured` only ever holds ids that are present in `all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredPlaylists {
    #[serde(default)]
    pub all: Vec<PlaylistSummary>,
    #[serde(default)]
    pub featured: Vec<String>,
}

impl StoredPlaylists {
    /// Adds playlists not yet stored and refreshes the metadata of those that
    /// are. Returns how many were new.
    pub fn add(&mut self, playlists: &[PlaylistSummary]) -> usize {
        let mut added = 0;
        for playlist in playlists {
            match self.all.iter_mut().find(|stored| stored.id == playlist.id) {
                Some(stored) => *stored = playlist.clone(),
                None => {
                    self.all.push(playlist.clone());
                    added += 1;
                }
            }
        }
        added
    }

    /// Drops the given ids from both lists. Returns how many playlists went.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let before = self.all.len();
        self.all.retain(|stored| !ids.contains(&stored.id));
        self.featured.retain(|id| !ids.contains(id));
        before - self.all.len()
    }

    /// Replaces the featured list, keeping only known ids in the given order.
    pub fn set_featured(&mut self, ids: &[String]) -> Vec<String> {
        let mut featured: Vec<String> = Vec::new();
        for id in ids {
            if self.contains(id) && !featured.contains(id) {
                featured.push(id.clone());
            }
        }
        self.featured = featured.clone();
        featured
    }

    pub fn contains(&self, id: &str) -> bool {
        self.all.iter().any(|stored| stored.id == id)
    }

    pub fn is_featured(&self, id: &str) -> bool {
        self.featured.iter().any(|featured| featured == id)
    }
}

/// Persistence for the playlists a user chose to mirror.
#[async_trait]
pub trait PlaylistStore: Send + Sync {
    async fn playlists(&self, user_id: &str) -> Result<StoredPlaylists, StoreError>;

    async fn add_playlists(
        &self,
        user_id: &str,
        playlists: &[PlaylistSummary],
    ) -> Result<usize, StoreError>;

    async fn remove_playlists(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError>;

    /// Returns the featured ids actually stored; unknown ids are dropped.
    async fn set_featured(&self, user_id: &str, ids: &[String]) -> Result<Vec<String>, StoreError>;
}

pub type UserDocument = Map<String, Value>;
type Documents = BTreeMap<String, UserDocument>;

fn analysis_of(documents: &Documents, user_id: &str) -> Option<Value> {
    documents
        .get(user_id)
        .and_then(|doc| doc.get(ANALYSIS_FIELD))
        .cloned()
}

fn last_updated_of(documents: &Documents, user_id: &str) -> Option<DateTime<Utc>> {
    documents
        .get(user_id)
        .and_then(|doc| doc.get(UPDATED_FIELD))
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn write_snapshot(
    documents: &mut Documents,
    user_id: &str,
    snapshot: &AnalysisSnapshot,
) -> Result<(), StoreError> {
    let doc = documents.entry(user_id.to_string()).or_default();
    doc.insert(
        ANALYSIS_FIELD.to_string(),
        serde_json::to_value(&snapshot.genre_analysis)?,
    );
    doc.insert(
        UPDATED_FIELD.to_string(),
        serde_json::to_value(snapshot.genre_last_updated)?,
    );
    Ok(())
}

fn unset_snapshot(documents: &mut Documents, user_id: &str) {
    if let Some(doc) = documents.get_mut(user_id) {
        doc.remove(ANALYSIS_FIELD);
        doc.remove(UPDATED_FIELD);
    }
}

fn playlists_of(documents: &Documents, user_id: &str) -> Result<StoredPlaylists, StoreError> {
    match documents.get(user_id).and_then(|doc| doc.get(PLAYLISTS_FIELD)) {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(StoredPlaylists::default()),
    }
}

fn update_playlists<R>(
    documents: &mut Documents,
    user_id: &str,
    update: impl FnOnce(&mut StoredPlaylists) -> R,
) -> Result<R, StoreError> {
    let mut playlists = playlists_of(documents, user_id)?;
    let result = update(&mut playlists);

    let doc = documents.entry(user_id.to_string()).or_default();
    doc.insert(PLAYLISTS_FIELD.to_string(), serde_json::to_value(&playlists)?);
    Ok(result)
}

/// In-process store, handy for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an arbitrary document for `user_id`, replacing any existing one.
    pub async fn insert_document(&self, user_id: &str, document: UserDocument) {
        self.documents
            .write()
            .await
            .insert(user_id.to_string(), document);
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(analysis_of(&*self.documents.read().await, user_id))
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(last_updated_of(&*self.documents.read().await, user_id))
    }

    async fn save(&self, user_id: &str, snapshot: &AnalysisSnapshot) -> Result<(), StoreError> {
        write_snapshot(&mut *self.documents.write().await, user_id, snapshot)
    }

    async fn invalidate(&self, user_id: &str) -> Result<(), StoreError> {
        unset_snapshot(&mut *self.documents.write().await, user_id);
        Ok(())
    }
}

#[async_trait]
impl PlaylistStore for MemoryStore {
    async fn playlists(&self, user_id: &str) -> Result<StoredPlaylists, StoreError> {
        playlists_of(&*self.documents.read().await, user_id)
    }

    async fn add_playlists(
        &self,
        user_id: &str,
        playlists: &[PlaylistSummary],
    ) -> Result<usize, StoreError> {
        update_playlists(&mut *self.documents.write().await, user_id, |stored| {
            stored.add(playlists)
        })
    }

    async fn remove_playlists(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        update_playlists(&mut *self.documents.write().await, user_id, |stored| {
            stored.remove(ids)
        })
    }

    async fn set_featured(&self, user_id: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        update_playlists(&mut *self.documents.write().await, user_id, |stored| {
            stored.set_featured(ids)
        })
    }
}

/// One JSON file holding a document per user. A missing file is an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_documents(&self) -> Result<Documents, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Documents::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Documents::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_documents(&self, documents: &Documents) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(documents)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} user documents to {}", documents.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for JsonFileStore {
    async fn load(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(analysis_of(&self.read_documents().await?, user_id))
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(last_updated_of(&self.read_documents().await?, user_id))
    }

    async fn save(&self, user_id: &str, snapshot: &AnalysisSnapshot) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents().await?;
        write_snapshot(&mut documents, user_id, snapshot)?;
        self.write_documents(&documents).await
    }

    async fn invalidate(&self, user_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents().await?;
        if !documents.contains_key(user_id) {
            return Ok(());
        }
        unset_snapshot(&mut documents, user_id);
        self.write_documents(&documents).await
    }
}

#[async_trait]
impl PlaylistStore for JsonFileStore {
    async fn playlists(&self, user_id: &str) -> Result<StoredPlaylists, StoreError> {
        let _guard = self.lock.lock().await;
        playlists_of(&self.read_documents().await?, user_id)
    }

    async fn add_playlists(
        &self,
        user_id: &str,
        playlists: &[PlaylistSummary],
    ) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents().await?;
        let added = update_playlists(&mut documents, user_id, |stored| stored.add(playlists))?;
        self.write_documents(&documents).await?;
        Ok(added)
    }

    async fn remove_playlists(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents().await?;
        let removed = update_playlists(&mut documents, user_id, |stored| stored.remove(ids))?;
        self.write_documents(&documents).await?;
        Ok(removed)
    }

    async fn set_featured(&self, user_id: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents().await?;
        let featured = update_playlists(&mut documents, user_id, |stored| stored.set_featured(ids))?;
        self.write_documents(&documents).await?;
        Ok(featured)
    }
}
