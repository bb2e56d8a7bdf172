//! Read-only reference tables for Kometa defaults
//!
//! Charts, awards, collections, overlays and optional services the wizard can
//! offer. Declaration order here is the order entries are emitted in the
//! generated config, so keep it stable.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Plex library kinds the wizard understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    Movie,
    Show,
}

/// Which library kinds an entry applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaScope {
    Movie,
    Show,
    Both,
}

impl MediaScope {
    pub fn includes(self, library_type: LibraryType) -> bool {
        match self {
            MediaScope::Both => true,
            MediaScope::Movie => library_type == LibraryType::Movie,
            MediaScope::Show => library_type == LibraryType::Show,
        }
    }
}

/// Media granularity an overlay is applied at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderLevel {
    #[default]
    Show,
    Season,
    Episode,
}

impl BuilderLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            BuilderLevel::Show => "show",
            BuilderLevel::Season => "season",
            BuilderLevel::Episode => "episode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionCategory {
    Chart,
    Award,
    Movie,
    Show,
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefaultCollection {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: CollectionCategory,
    pub scope: MediaScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlayInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub positions: &'static [&'static str],
    pub builder_levels: &'static [BuilderLevel],
    pub scope: MediaScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Rating images the `ratings` overlay can display
pub const RATING_SOURCES: &[&str] = &[
    "imdb", "tmdb", "rt_tomato", "rt_popcorn", "metacritic", "letterboxd", "trakt",
    "mdb", "star", "anidb", "mal", "myanimelist",
];

/// Overlay id that carries rating slots
pub const RATINGS_OVERLAY: &str = "ratings";

const ALL_LEVELS: &[BuilderLevel] = &[BuilderLevel::Show, BuilderLevel::Season, BuilderLevel::Episode];
const SHOW_EPISODE: &[BuilderLevel] = &[BuilderLevel::Show, BuilderLevel::Episode];
const SHOW_ONLY: &[BuilderLevel] = &[BuilderLevel::Show];
const EPISODE_ONLY: &[BuilderLevel] = &[BuilderLevel::Episode];

fn collection(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: CollectionCategory,
    scope: MediaScope,
) -> DefaultCollection {
    DefaultCollection { id, name, description, category, scope }
}

fn overlay(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    positions: &'static [&'static str],
    builder_levels: &'static [BuilderLevel],
    scope: MediaScope,
) -> OverlayInfo {
    OverlayInfo { id, name, description, positions, builder_levels, scope }
}

lazy_static! {
    /// Every chart, award and collection default, in emission order
    pub static ref COLLECTIONS: Vec<DefaultCollection> = {
        use CollectionCategory::*;
        use MediaScope as S;
        vec![
            // Charts
            collection("basic", "Basic Charts", "Newly released and new episodes", Chart, S::Both),
            collection("tmdb", "TMDb Charts", "Popular, trending and top rated on TMDb", Chart, S::Both),
            collection("imdb", "IMDb Charts", "IMDb top 250, popular and lowest rated", Chart, S::Both),
            collection("trakt", "Trakt Charts", "Trending, watched and recommended on Trakt", Chart, S::Both),
            collection("tautulli", "Tautulli Charts", "Most played and most popular on this server", Chart, S::Both),
            collection("letterboxd", "Letterboxd Charts", "Curated Letterboxd lists", Chart, S::Movie),
            collection("anilist", "AniList Charts", "Popular and top rated anime on AniList", Chart, S::Both),
            collection("myanimelist", "MyAnimeList Charts", "Popular and top rated anime on MyAnimeList", Chart, S::Both),
            collection("other_chart", "Other Charts", "AniDB, Common Sense and StevenLu charts", Chart, S::Both),
            // Awards
            collection("bafta", "BAFTA Awards", "British Academy Film Awards", Award, S::Movie),
            collection("berlinale", "Berlinale Awards", "Berlin International Film Festival", Award, S::Movie),
            collection("cannes", "Cannes Awards", "Cannes Film Festival", Award, S::Movie),
            collection("cesar", "César Awards", "French César Awards", Award, S::Movie),
            collection("choice", "Critics Choice Awards", "Critics Choice Awards", Award, S::Both),
            collection("emmy", "Emmy Awards", "Primetime Emmy Awards", Award, S::Show),
            collection("golden", "Golden Globe Awards", "Golden Globe Awards", Award, S::Both),
            collection("oscars", "Academy Awards", "Academy Awards (Oscars)", Award, S::Movie),
            collection("razzie", "Razzie Awards", "Golden Raspberry Awards", Award, S::Movie),
            collection("sag", "SAG Awards", "Screen Actors Guild Awards", Award, S::Both),
            collection("spirit", "Independent Spirit Awards", "Film Independent Spirit Awards", Award, S::Movie),
            collection("sundance", "Sundance Awards", "Sundance Film Festival", Award, S::Movie),
            collection("tiff", "TIFF Awards", "Toronto International Film Festival", Award, S::Movie),
            collection("venice", "Venice Awards", "Venice Film Festival", Award, S::Movie),
            collection("nfr", "National Film Registry", "US National Film Registry", Award, S::Movie),
            collection("separator_award", "Award Separator", "Separator above the award collections", Award, S::Both),
            // Movie only
            collection("universe", "Universes", "Shared universes such as the MCU", Movie, S::Movie),
            collection("seasonal", "Seasonal", "Holiday and seasonal collections", Movie, S::Movie),
            collection("director", "Directors", "Collections per director", Movie, S::Movie),
            collection("producer", "Producers", "Collections per producer", Movie, S::Movie),
            collection("writer", "Writers", "Collections per writer", Movie, S::Movie),
            collection("collectionless", "Collectionless", "Items not in any other collection", Movie, S::Movie),
            // Show only
            collection("network", "Networks", "Collections per TV network", Show, S::Show),
            // Both
            collection("genre", "Genres", "Collections per genre", Both, S::Both),
            collection("franchise", "Franchises", "Franchise collections", Both, S::Both),
            collection("actor", "Actors", "Collections per popular actor", Both, S::Both),
            collection("content_rating_us", "US Content Ratings", "Collections per US content rating", Both, S::Both),
            collection("content_rating_uk", "UK Content Ratings", "Collections per UK content rating", Both, S::Both),
            collection("country", "Countries", "Collections per country of origin", Both, S::Both),
            collection("studio", "Studios", "Collections per studio", Both, S::Both),
            collection("streaming", "Streaming Services", "Collections per streaming service", Both, S::Both),
            collection("resolution", "Resolutions", "Collections per video resolution", Both, S::Both),
            collection("audio_language", "Audio Languages", "Collections per audio language", Both, S::Both),
            collection("subtitle_language", "Subtitle Languages", "Collections per subtitle language", Both, S::Both),
            collection("year", "Years", "Collections per release year", Both, S::Both),
            collection("decade", "Decades", "Collections per release decade", Both, S::Both),
            collection("based", "Based On", "Based on books, comics, true stories and video games", Both, S::Both),
        ]
    };

    /// Every overlay default, in emission order
    pub static ref OVERLAYS: Vec<OverlayInfo> = {
        use MediaScope as S;
        vec![
            overlay("resolution", "Resolution", "Resolution and edition badge", &["top_left"], ALL_LEVELS, S::Both),
            overlay("audio_codec", "Audio Codec", "Audio codec badge", &["top"], ALL_LEVELS, S::Both),
            overlay("mediastinger", "MediaStinger", "Marks movies with a post-credit scene", &["bottom_right"], SHOW_ONLY, S::Movie),
            overlay("ratings", "Ratings", "Up to three rating badges", &["left", "right"], SHOW_EPISODE, S::Both),
            overlay("streaming", "Streaming", "Streaming service badge", &["bottom_left"], SHOW_ONLY, S::Both),
            overlay("network", "Network", "Network logo", &["bottom_left"], ALL_LEVELS, S::Show),
            overlay("studio", "Studio", "Studio logo", &["bottom_left"], ALL_LEVELS, S::Both),
            overlay("video_format", "Video Format", "Remux, WEB-DL, Blu-ray and similar", &["bottom_left"], ALL_LEVELS, S::Both),
            overlay("versions", "Versions", "Multiple versions available", &["top_right"], ALL_LEVELS, S::Both),
            overlay("language_count", "Language Count", "Dual or multi audio badge", &["bottom_left"], ALL_LEVELS, S::Both),
            overlay("languages", "Languages", "Audio language flags", &["top_left"], ALL_LEVELS, S::Both),
            overlay("runtimes", "Runtimes", "Runtime text", &["bottom_right"], SHOW_EPISODE, S::Both),
            overlay("direct_play", "Direct Play", "Direct play only badge", &["top_right"], ALL_LEVELS, S::Both),
            overlay("ribbon", "Ribbon", "Award and top list ribbon", &["bottom_right"], SHOW_ONLY, S::Both),
            overlay("commonsense", "Common Sense Age", "Common Sense age rating", &["bottom_left"], SHOW_ONLY, S::Both),
            overlay("content_rating_us_movie", "US Movie Rating", "US movie content rating badge", &["bottom_left"], SHOW_ONLY, S::Movie),
            overlay("content_rating_us_show", "US Show Rating", "US show content rating badge", &["bottom_left"], ALL_LEVELS, S::Show),
            overlay("status", "Status", "Airing, returning, canceled or ended", &["top_left"], SHOW_ONLY, S::Show),
            overlay("episode_info", "Episode Info", "Season and episode number", &["bottom_right"], EPISODE_ONLY, S::Show),
        ]
    };

    /// Optional third-party services, in emission order
    pub static ref SERVICES: Vec<ServiceInfo> = vec![
        ServiceInfo { id: "tautulli", name: "Tautulli", description: "Plex watch statistics" },
        ServiceInfo { id: "omdb", name: "OMDb", description: "Open Movie Database ratings" },
        ServiceInfo { id: "mdblist", name: "MDBList", description: "Aggregated ratings and lists" },
        ServiceInfo { id: "notifiarr", name: "Notifiarr", description: "Notification relay" },
        ServiceInfo { id: "gotify", name: "Gotify", description: "Self-hosted push notifications" },
        ServiceInfo { id: "ntfy", name: "ntfy", description: "HTTP push notifications" },
        ServiceInfo { id: "anidb", name: "AniDB", description: "Anime database account" },
        ServiceInfo { id: "radarr", name: "Radarr", description: "Add missing movies to Radarr" },
        ServiceInfo { id: "sonarr", name: "Sonarr", description: "Add missing shows to Sonarr" },
        ServiceInfo { id: "trakt", name: "Trakt", description: "Trakt account authorization" },
        ServiceInfo { id: "mal", name: "MyAnimeList", description: "MyAnimeList account authorization" },
    ];

    static ref COLLECTION_INDEX: HashMap<&'static str, usize> =
        COLLECTIONS.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    static ref OVERLAY_INDEX: HashMap<&'static str, usize> =
        OVERLAYS.iter().enumerate().map(|(i, o)| (o.id, i)).collect();

    static ref SERVICE_INDEX: HashMap<&'static str, usize> =
        SERVICES.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
}

pub fn find_collection(id: &str) -> Option<&'static DefaultCollection> {
    COLLECTION_INDEX.get(id).map(|&i| &COLLECTIONS[i])
}

pub fn find_overlay(id: &str) -> Option<&'static OverlayInfo> {
    OVERLAY_INDEX.get(id).map(|&i| &OVERLAYS[i])
}

pub fn find_service(id: &str) -> Option<&'static ServiceInfo> {
    SERVICE_INDEX.get(id).map(|&i| &SERVICES[i])
}

/// Collections belonging to one category, in declaration order
pub fn collections_in(category: CollectionCategory) -> impl Iterator<Item = &'static DefaultCollection> {
    COLLECTIONS.iter().filter(move |c| c.category == category)
}
