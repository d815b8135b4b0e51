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

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use genre_core::{
    get_spotify_client, Analyzer, Classifier, GenreAnalysis, GenreService, GradientTable,
    JsonFileStore, PlaylistStore, SpotifyListener, StoredPlaylists, SubGenrePolicy,
    TaxonomyTable, UnmappedGenres,
};
use genre_core::models::PlaylistSummary;
use log::debug;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spotify-genres")]
#[command(about = "Summarize the genres you listen to on Spotify", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Genre taxonomy (CSV `sub,parent` lines or a JSON object)
    #[arg(long, global = true, env = "GENRE_TAXONOMY", default_value = "data/genres.csv")]
    taxonomy: PathBuf,

    /// Optional JSON file overriding the built-in genre gradients
    #[arg(long, global = true, env = "GENRE_GRADIENTS")]
    gradients: Option<PathBuf>,

    /// Do not count meta-genre names (e.g. "rock") as sub-genres
    #[arg(long, global = true)]
    exclude_meta: bool,
}

#[derive(Args)]
struct StoreArgs {
    /// JSON file holding stored analyses
    #[arg(long, env = "GENRE_STORE", default_value = ".genre_store.json")]
    store: PathBuf,

    /// User key for stored analyses (defaults to your Spotify user id)
    #[arg(long, env = "GENRE_USER")]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyzes the genres of your top artists (served from the store when available)
    Analyze {
        #[command(flatten)]
        store: StoreArgs,
        /// Ignore the stored analysis and recompute it
        #[arg(long)]
        refresh: bool,
        /// Output the analysis to a JSON file (e.g., --json=genres.json)
        #[arg(long)]
        json: Option<String>,
    },
    /// Removes the stored analysis so the next run recomputes it
    Invalidate {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Shows the meta-genre each given genre resolves to (offline)
    Classify {
        #[arg(value_name = "GENRE", required = true)]
        genres: Vec<String>,
    },
    /// Analyzes a newline-separated file of genre tags (offline)
    Tags {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output the analysis to a JSON file
        #[arg(long)]
        json: Option<String>,
    },
    /// Lists your playlists and manages the ones mirrored in the store
    #[command(subcommand)]
    Playlists(PlaylistCommands),
    /// Shows your recently played tracks with their artists' genres
    Recent {
        /// Number of tracks (1-50)
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum PlaylistCommands {
    /// Lists all your playlists on Spotify with their IDs
    List,
    /// Copies playlists from Spotify into the store
    Save {
        #[command(flatten)]
        store: StoreArgs,
        /// Playlist IDs to save
        #[arg(value_name = "ID", required_unless_present = "all")]
        ids: Vec<String>,
        /// Save every playlist you can see
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
    /// Removes playlists from the store
    Remove {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,
    },
    /// Lists the playlists held in the store
    Stored {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Replaces the featured playlists (IDs not in the store are ignored)
    Feature {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(value_name = "ID")]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    let analyzer = match build_analyzer(&cli.engine) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("[ERROR] Invalid genre configuration: {:#}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Analyze {
            store,
            refresh,
            json,
        } => {
            handle_analyze(analyzer, &store, refresh, json.as_deref()).await;
        }
        Commands::Invalidate { store } => {
            handle_invalidate(analyzer, &store).await;
        }
        Commands::Classify { genres } => {
            handle_classify(&analyzer, &genres);
        }
        Commands::Tags { file, json } => {
            handle_tags(&analyzer, &file, json.as_deref());
        }
        Commands::Playlists(command) => {
            handle_playlists(command).await;
        }
        Commands::Recent { limit } => {
            handle_recent(limit).await;
        }
    }
}

/// Loads the taxonomy and gradients. Any failure here stops the process.
fn build_analyzer(args: &EngineArgs) -> anyhow::Result<Analyzer> {
    let taxonomy = TaxonomyTable::load(&args.taxonomy)
        .with_context(|| format!("loading taxonomy {}", args.taxonomy.display()))?;

    let gradients = match &args.gradients {
        Some(path) => GradientTable::load(path)
            .with_context(|| format!("loading gradients {}", path.display()))?,
        None => GradientTable::default(),
    };

    let policy = if args.exclude_meta {
        SubGenrePolicy::ExcludeMetaGenres
    } else {
        SubGenrePolicy::IncludeMetaGenres
    };
    debug!("Sub-genre policy: {:?}", policy);

    let classifier = Classifier::new(Arc::new(taxonomy), Arc::new(UnmappedGenres::new()));
    Ok(Analyzer::new(classifier, Arc::new(gradients)).with_policy(policy))
}

async fn get_listener() -> SpotifyListener {
    let spotify = match get_spotify_client().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error initializing Spotify client: {}", e);
            process::exit(1);
        }
    };
    SpotifyListener::new(spotify)
}

async fn resolve_user(listener: &SpotifyListener, args: &StoreArgs) -> String {
    if let Some(user) = &args.user {
        return user.clone();
    }

    match listener.current_user_id().await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("[ERROR] Could not determine your Spotify user id: {}", e);
            process::exit(1);
        }
    }
}

/// Like `resolve_user`, but only talks to Spotify when no `--user` was given.
async fn store_user(args: &StoreArgs) -> String {
    match &args.user {
        Some(user) => user.clone(),
        None => resolve_user(&get_listener().await, args).await,
    }
}

async fn handle_analyze(analyzer: Analyzer, args: &StoreArgs, refresh: bool, json_path: Option<&str>) {
    let listener = get_listener().await;
    let user = resolve_user(&listener, args).await;
    let service = GenreService::new(listener, JsonFileStore::new(&args.store), analyzer);

    println!("Analyzing genres for {} ...", user);

    let result = if refresh {
        service.refresh(&user).await
    } else {
        service.genre_analysis(&user, false).await
    };

    match result {
        Ok(analysis) => {
            print_analysis(&analysis);
            if let Some(path) = json_path {
                save_json(path, &analysis);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("Genre analysis failed: {}", e);
            process::exit(1);
        }
    }
}

async fn handle_invalidate(analyzer: Analyzer, args: &StoreArgs) {
    let listener = get_listener().await;
    let user = resolve_user(&listener, args).await;
    let service = GenreService::new(listener, JsonFileStore::new(&args.store), analyzer);

    match service.invalidate(&user).await {
        Ok(()) => println!("[OK] Stored genre analysis for {} removed.", user),
        Err(e) => {
            eprintln!("[ERROR] Invalidation failed: {}", e);
            process::exit(1);
        }
    }
}

fn handle_classify(analyzer: &Analyzer, genres: &[String]) {
    let classifier = analyzer.classifier();

    println!("{:<30} | {:<20}", "Genre", "Meta-genre");
    println!("{:-<30}-+-{:-<20}", "", "");
    for genre in genres {
        println!("{:<30} | {:<20}", genre.trim(), classifier.classify(genre));
    }

    let unmapped = classifier.unmapped().snapshot();
    if !unmapped.is_empty() {
        println!();
        println!("{} genre(s) are not in the taxonomy.", unmapped.len());
    }
}

fn handle_tags(analyzer: &Analyzer, file: &Path, json_path: Option<&str>) {
    let contents = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] Failed to read '{}': {}", file.display(), e);
            process::exit(1);
        }
    };

    let tags: Vec<&str> = contents.lines().collect();
    let analysis = analyzer.analyze(&tags);
    print_analysis(&analysis);

    let unmapped = analyzer.classifier().unmapped().snapshot();
    if !unmapped.is_empty() {
        println!();
        println!("Unmapped genres (counted as 'other'):");
        for (genre, count) in unmapped {
            println!("   - {} (x{})", genre, count);
        }
    }

    if let Some(path) = json_path {
        save_json(path, &analysis);
    }
}

fn print_analysis(analysis: &GenreAnalysis) {
    println!();
    println!("---------------------------------------------------");
    println!("GENRE ANALYSIS");
    println!("---------------------------------------------------");
    if !analysis.summary.is_empty() {
        println!("{}", analysis.summary);
    }

    match (
        &analysis.top_subgenre.sub_genre,
        &analysis.top_subgenre.parent_genre,
    ) {
        (Some(sub), Some(parent)) => println!("Top sub-genre:  {} ({})", sub, parent),
        _ => println!("Top sub-genre:  none"),
    }
    println!("---------------------------------------------------");

    if analysis.meta_genres.is_empty() {
        println!("No genre data found.");
        return;
    }

    println!();
    println!("{:<25} | {:>7}", "Meta-genre", "Share");
    println!("{:-<25}-+-{:->7}", "", "");
    for share in &analysis.meta_genres {
        println!("{:<25} | {:>6.1}%", share.genre, share.portion);
    }

    println!();
    println!("{:<30} | {:<18} | {:>7}", "Sub-genre", "Parent", "Share");
    println!("{:-<30}-+-{:-<18}-+-{:->7}", "", "", "");
    for share in &analysis.sub_genres {
        println!(
            "{:<30} | {:<18} | {:>6.1}%",
            share.genre, share.parent_genre, share.portion
        );
    }
}

fn save_json(path: &str, analysis: &GenreAnalysis) {
    match File::create(path) {
        Ok(mut file) => {
            let json_content = serde_json::to_string_pretty(analysis).unwrap_or_default();
            if let Err(e) = file.write_all(json_content.as_bytes()) {
                eprintln!();
                eprintln!("[ERROR] Failed to write analysis to file: {}", e);
            } else {
                println!();
                println!("[SAVED] Analysis saved to: {}", path);
            }
        }
        Err(e) => eprintln!("[ERROR] Failed to create file '{}': {}", path, e),
    }
}

async fn handle_playlists(command: PlaylistCommands) {
    match command {
        PlaylistCommands::List => handle_playlists_list().await,
        PlaylistCommands::Save { store, ids, all } => handle_playlists_save(&store, &ids, all).await,
        PlaylistCommands::Remove { store, ids } => {
            let user = store_user(&store).await;
            match JsonFileStore::new(&store.store).remove_playlists(&user, &ids).await {
                Ok(removed) => println!("[OK] Removed {} playlist(s) for {}.", removed, user),
                Err(e) => {
                    eprintln!("[ERROR] Failed to remove playlists: {}", e);
                    process::exit(1);
                }
            }
        }
        PlaylistCommands::Stored { store } => {
            let user = store_user(&store).await;
            match JsonFileStore::new(&store.store).playlists(&user).await {
                Ok(stored) => print_stored_playlists(&stored),
                Err(e) => {
                    eprintln!("[ERROR] Failed to read stored playlists: {}", e);
                    process::exit(1);
                }
            }
        }
        PlaylistCommands::Feature { store, ids } => {
            let user = store_user(&store).await;
            match JsonFileStore::new(&store.store).set_featured(&user, &ids).await {
                Ok(featured) => {
                    let ignored = ids.iter().filter(|id| !featured.contains(id)).count();
                    println!("[OK] {} playlist(s) featured for {}.", featured.len(), user);
                    if ignored > 0 {
                        println!("{} ID(s) ignored: not in the store.", ignored);
                    }
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to update featured playlists: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}

async fn handle_playlists_list() {
    let listener = get_listener().await;
    println!("Fetching your playlists...");

    match listener.list_playlists().await {
        Ok(playlists) => print_playlist_table(&playlists, |_| false),
        Err(e) => {
            eprintln!("Failed to list playlists: {}", e);
            process::exit(1);
        }
    }
}

async fn handle_playlists_save(args: &StoreArgs, ids: &[String], all: bool) {
    let listener = get_listener().await;
    let user = resolve_user(&listener, args).await;

    let playlists = if all {
        match listener.list_playlists().await {
            Ok(playlists) => playlists,
            Err(e) => {
                eprintln!("Failed to list playlists: {}", e);
                process::exit(1);
            }
        }
    } else {
        listener.playlist_summaries(ids).await
    };

    if playlists.is_empty() {
        println!("No playlists found to save.");
        return;
    }

    match JsonFileStore::new(&args.store).add_playlists(&user, &playlists).await {
        Ok(added) => println!(
            "[OK] Saved {} playlist(s) for {} ({} new).",
            playlists.len(),
            user,
            added
        ),
        Err(e) => {
            eprintln!("[ERROR] Failed to save playlists: {}", e);
            process::exit(1);
        }
    }
}

fn print_stored_playlists(stored: &StoredPlaylists) {
    if stored.all.is_empty() {
        println!("No playlists stored.");
        return;
    }
    print_playlist_table(&stored.all, |id| stored.is_featured(id));
}

fn print_playlist_table(playlists: &[PlaylistSummary], featured: impl Fn(&str) -> bool) {
    println!();
    println!(
        "{:<25} | {:<30} | {:<20} | {:<6} | {:<5}",
        "ID", "Name", "Owner", "Tracks", "Collab"
    );
    println!(
        "{:-<25}-+-{:-<30}-+-{:-<20}-+-{:-<6}-+-{:-<5}",
        "", "", "", "", ""
    );

    for pl in playlists {
        let collab = if pl.is_collaborative { "Yes" } else { "No" };
        let marker = if featured(&pl.id) { "*" } else { "" };
        println!(
            "{:<25} | {:<30} | {:<20} | {:<6} | {:<5}",
            pl.id,
            format!("{}{}", marker, truncate(&pl.name, 28)),
            truncate(&pl.owner_name, 18),
            pl.total_tracks,
            collab
        );
    }
}

async fn handle_recent(limit: u32) {
    let listener = get_listener().await;
    println!("Fetching your recently played tracks...");

    match listener.recently_played(limit).await {
        Ok(tracks) => {
            println!();
            if tracks.is_empty() {
                println!("Nothing played recently.");
            }
            for (i, track) in tracks.iter().enumerate() {
                println!("{}. {}", i + 1, track);
            }
        }
        Err(e) => {
            eprintln!("Failed to fetch recently played tracks: {}", e);
            process::exit(1);
        }
    }
}

/// Shortens `text` to `max` characters, marking the cut with "..".
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}..", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("Beyoncé Essentials", 7), "Beyoncé..");
        assert_eq!(truncate("Short", 28), "Short");
    }

    #[test]
    fn test_cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "spotify-genres",
            "analyze",
            "--refresh",
            "--store",
            "/tmp/store.json",
            "--taxonomy",
            "genres.json",
        ])
        .unwrap();

        assert_eq!(cli.engine.taxonomy, PathBuf::from("genres.json"));
        match cli.command {
            Commands::Analyze { store, refresh, .. } => {
                assert!(refresh);
                assert_eq!(store.store, PathBuf::from("/tmp/store.json"));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_cli_classify_requires_a_genre() {
        assert!(Cli::try_parse_from(["spotify-genres", "classify"]).is_err());
    }

    #[test]
    fn test_build_analyzer_fails_on_missing_taxonomy() {
        let args = EngineArgs {
            taxonomy: PathBuf::from("/nonexistent/genres.csv"),
            gradients: None,
            exclude_meta: false,
        };
        assert!(build_analyzer(&args).is_err());
    }

    #[test]
    fn test_cli_parses_playlist_save() {
        let cli = Cli::try_parse_from([
            "spotify-genres",
            "playlists",
            "save",
            "--user",
            "alice",
            "p1",
            "p2",
        ])
        .unwrap();

        match cli.command {
            Commands::Playlists(PlaylistCommands::Save { store, ids, all }) => {
                assert_eq!(store.user.as_deref(), Some("alice"));
                assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
                assert!(!all);
            }
            _ => panic!("expected playlists save"),
        }
    }

    #[test]
    fn test_cli_playlist_save_needs_ids_or_all() {
        assert!(Cli::try_parse_from(["spotify-genres", "playlists", "save"]).is_err());
        assert!(Cli::try_parse_from(["spotify-genres", "playlists", "save", "--all"]).is_ok());
        assert!(
            Cli::try_parse_from(["spotify-genres", "playlists", "save", "--all", "p1"]).is_err()
        );
    }

    #[test]
    fn test_cli_playlist_feature_accepts_no_ids() {
        let cli = Cli::try_parse_from(["spotify-genres", "playlists", "feature"]).unwrap();
        match cli.command {
            Commands::Playlists(PlaylistCommands::Feature { ids, .. }) => assert!(ids.is_empty()),
            _ => panic!("expected playlists feature"),
        }
    }

    #[test]
    fn test_cli_playlist_remove_requires_an_id() {
        assert!(Cli::try_parse_from(["spotify-genres", "playlists", "remove"]).is_err());
    }
}
