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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An artist from the user's top list with the genres Spotify attaches to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopArtist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: u32,
}

/// A recently played track, with genres borrowed from its artists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTrack {
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub played_at: DateTime<Utc>,
    pub external_url: String,
    pub isrc: Option<String>,
    pub genres: Vec<String>,
}

impl fmt::Display for RecentTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let genres = if self.genres.is_empty() {
            "no genres".to_string()
        } else {
            self.genres.join(", ")
        };

        write!(
            f,
            "[{}] {} - {} (Album: {}) | {}",
            self.played_at.format("%Y-%m-%d %H:%M"),
            self.name,
            self.artists.join(", "),
            self.album,
            genres
        )
    }
}

/// Summary of a playlist, as listed live and as mirrored into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub total_tracks: u32,
    pub is_public: bool,
    pub is_collaborative: bool,
    pub owner_name: String,
    pub external_url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}
