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

use rspotify::{prelude::*, scopes, AuthCodeSpotify, Config, Credentials, OAuth};
use std::path::PathBuf;
use thiserror::Error;

/// Where the OAuth token is cached between runs.
pub const TOKEN_CACHE_PATH: &str = ".spotify_genres_token.json";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to initialize Spotify client: {0}")]
    ClientConfig(String),
    #[error("Spotify authentication failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
}

/// Initializes and authenticates a Spotify client using the Authorization Code Flow.
///
/// Credentials come from `RSPOTIFY_CLIENT_ID` / `RSPOTIFY_CLIENT_SECRET` and the
/// redirect URI from `RSPOTIFY_REDIRECT_URI`. The token is cached on disk and
/// refreshed automatically; without a cached token the user is prompted to
/// authorize in the browser.
pub async fn get_spotify_client() -> Result<AuthCodeSpotify, AuthError> {
    let creds = Credentials::from_env().ok_or_else(|| {
        AuthError::ClientConfig("Missing RSPOTIFY_CLIENT_ID or RSPOTIFY_CLIENT_SECRET".to_string())
    })?;

    // - user-top-read: top artists feed the genre analysis.
    // - user-read-recently-played: recent tracks mirror.
    // - playlist-read-*: playlist listing.
    let scopes = scopes!(
        "user-top-read",
        "user-read-recently-played",
        "playlist-read-private",
        "playlist-read-collaborative"
    );

    let oauth = OAuth::from_env(scopes)
        .ok_or_else(|| AuthError::ClientConfig("Missing RSPOTIFY_REDIRECT_URI".to_string()))?;

    let config = Config {
        token_cached: true,
        token_refreshing: true,
        cache_path: PathBuf::from(TOKEN_CACHE_PATH),
        ..Default::default()
    };

    let spotify = AuthCodeSpotify::with_config(creds, oauth, config);

    let url = spotify.get_authorize_url(false)?;

    // Reuses the cached token when present, otherwise opens the browser and
    // waits for the redirect.
    spotify.prompt_for_token(&url).await?;

    Ok(spotify)
}
