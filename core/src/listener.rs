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

use crate::models::{PlaylistSummary, RecentTrack, TopArtist};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use log::{debug, info, warn};
use rspotify::{
    model::{ArtistId, FullArtist, FullPlaylist, PlaylistId, TimeRange},
    prelude::*,
    AuthCodeSpotify,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Spotify caps top-artist pages and artist lookups at 50 items.
const PAGE_SIZE: u32 = 50;
const TOP_ARTIST_OFFSETS: [u32; 2] = [0, 50];
/// Upper bound Spotify accepts for recently played tracks.
pub const MAX_RECENT_TRACKS: u32 = 50;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Spotify API error: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Invalid Playlist ID: {0}")]
    InvalidId(String),
}

/// Anything that can produce the flat list of raw genre tags for a user.
#[async_trait]
pub trait GenreSource: Send + Sync {
    async fn genre_tags(&self) -> Result<Vec<String>, SourceError>;
}

/// Reads the authenticated user's listening data from Spotify.
pub struct SpotifyListener {
    spotify: Arc<AuthCodeSpotify>,
}

impl SpotifyListener {
    pub fn new(spotify: AuthCodeSpotify) -> Self {
        Self {
            spotify: Arc::new(spotify),
        }
    }

    pub async fn current_user_id(&self) -> Result<String, SourceError> {
        let user = self.spotify.current_user().await?;
        Ok(user.id.id().to_string())
    }

    /// The user's top 100 short-term artists.
    ///
    /// A page that fails to load is logged and skipped; the call only fails
    /// when no page could be read at all.
    pub async fn top_artists(&self) -> Result<Vec<TopArtist>, SourceError> {
        let mut artists = Vec::new();
        let mut last_error = None;
        let mut pages_read = 0;

        for offset in TOP_ARTIST_OFFSETS {
            match self
                .spotify
                .current_user_top_artists_manual(
                    Some(TimeRange::ShortTerm),
                    Some(PAGE_SIZE),
                    Some(offset),
                )
                .await
            {
                Ok(page) => {
                    pages_read += 1;
                    artists.extend(page.items.into_iter().map(to_top_artist));
                }
                Err(e) => {
                    warn!("Failed to fetch top artists at offset {}: {}", offset, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if pages_read == 0 => Err(e.into()),
            _ => {
                info!("Fetched {} top artists", artists.len());
                Ok(artists)
            }
        }
    }

    /// Most recent plays, newest first, each tagged with its artists' genres.
    pub async fn recently_played(&self, limit: u32) -> Result<Vec<RecentTrack>, SourceError> {
        let limit = limit.clamp(1, MAX_RECENT_TRACKS);
        let page = self
            .spotify
            .current_user_recently_played(Some(limit), None)
            .await?;

        let artist_ids: Vec<ArtistId<'static>> = page
            .items
            .iter()
            .flat_map(|item| item.track.artists.iter())
            .filter_map(|artist| artist.id.clone())
            .collect();
        let genre_cache = self.artist_genres(&artist_ids).await?;

        let tracks = page
            .items
            .into_iter()
            .map(|item| {
                let track = item.track;
                let mut seen = HashSet::new();
                let genres = track
                    .artists
                    .iter()
                    .filter_map(|artist| artist.id.as_ref())
                    .filter_map(|id| genre_cache.get(id.id()))
                    .flatten()
                    .filter(|genre| seen.insert(genre.to_string()))
                    .cloned()
                    .collect();

                RecentTrack {
                    name: track.name,
                    artists: track.artists.iter().map(|a| a.name.clone()).collect(),
                    album: track.album.name,
                    played_at: item.played_at,
                    external_url: track
                        .external_urls
                        .get("spotify")
                        .cloned()
                        .unwrap_or_default(),
                    isrc: track.external_ids.get("isrc").cloned(),
                    genres,
                }
            })
            .collect();

        Ok(tracks)
    }

    /// Genres per artist id, fetched once per distinct artist.
    async fn artist_genres(
        &self,
        ids: &[ArtistId<'static>],
    ) -> Result<HashMap<String, Vec<String>>, SourceError> {
        let mut cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut unique: Vec<ArtistId<'static>> = Vec::new();

        for id in ids {
            if cache.insert(id.id().to_string(), Vec::new()).is_none() {
                unique.push(id.clone());
            }
        }

        for chunk in unique.chunks(PAGE_SIZE as usize) {
            debug!("Looking up genres for {} artists", chunk.len());
            let artists = self.spotify.artists(chunk.iter().cloned()).await?;
            for artist in artists {
                cache.insert(artist.id.id().to_string(), artist.genres);
            }
        }

        Ok(cache)
    }

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, SourceError> {
        let mut playlists = Vec::new();
        let mut stream = self.spotify.current_user_playlists();

        while let Some(pl) = stream.try_next().await? {
            let owner_name = pl.owner.display_name.unwrap_or(pl.owner.id.id().to_string());

            playlists.push(PlaylistSummary {
                id: pl.id.id().to_string(),
                name: pl.name,
                total_tracks: pl.tracks.total,
                is_public: pl.public.unwrap_or(false),
                is_collaborative: pl.collaborative,
                owner_name,
                external_url: pl.external_urls.get("spotify").cloned(),
                image: pl.images.first().map(|image| image.url.clone()),
            });
        }

        Ok(playlists)
    }

    pub async fn playlist(&self, playlist_id_str: &str) -> Result<PlaylistSummary, SourceError> {
        let playlist_id = PlaylistId::from_id(playlist_id_str)
            .map_err(|_| SourceError::InvalidId(playlist_id_str.to_string()))?;

        let playlist = self.spotify.playlist(playlist_id, None, None).await?;
        Ok(to_playlist_summary(playlist))
    }

    /// Current metadata for each id. Playlists that cannot be read are logged
    /// and left out.
    pub async fn playlist_summaries(&self, ids: &[String]) -> Vec<PlaylistSummary> {
        let mut playlists = Vec::with_capacity(ids.len());

        for id in ids {
            match self.playlist(id).await {
                Ok(summary) => playlists.push(summary),
                Err(e) => warn!("Failed to fetch metadata for playlist {}: {}", id, e),
            }
        }

        playlists
    }
}

fn to_playlist_summary(pl: FullPlaylist) -> PlaylistSummary {
    let owner_name = pl.owner.display_name.unwrap_or(pl.owner.id.id().to_string());

    PlaylistSummary {
        id: pl.id.id().to_string(),
        name: pl.name,
        total_tracks: pl.tracks.total,
        is_public: pl.public.unwrap_or(false),
        is_collaborative: pl.collaborative,
        owner_name,
        external_url: pl.external_urls.get("spotify").cloned(),
        image: pl.images.first().map(|image| image.url.clone()),
    }
}

fn to_top_artist(artist: FullArtist) -> TopArtist {
    TopArtist {
        id: artist.id.id().to_string(),
        name: artist.name,
        genres: artist.genres,
        popularity: artist.popularity,
    }
}

#[async_trait]
impl GenreSource for SpotifyListener {
    async fn genre_tags(&self) -> Result<Vec<String>, SourceError> {
        let artists = self.top_artists().await?;
        let tags: Vec<String> = artists.into_iter().flat_map(|a| a.genres).collect();
        debug!("Collected {} raw genre tags", tags.len());
        Ok(tags)
    }
}
