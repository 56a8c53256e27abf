use regex::Regex;
use reqwest::StatusCode;

use crate::{
    config::Mode,
    sigi_state::{RoomExtraction, SigiState, SigiStateError},
    util::{self, HttpClient},
    webcast,
};

/// Marker the platform WAF serves instead of the live page when it has
/// flagged the client IP.
const WAF_MARKER: &str = "Please wait...";

/// A resolved broadcaster. The room id is empty exactly when the user has
/// never been live.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastIdentity {
    pub username: String,
    pub room_id: String,
}

/// The single identifier a run starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetInput {
    Url(String),
    Username(String),
    RoomId(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Supply only one of -url, -user and -room_id")]
    AmbiguousInput,
    #[error("Missing -url, -user or -room_id")]
    MissingInput,
    #[error("Account is not accessible from this country, use a VPN or proxy")]
    RegionBlocked,
    #[error("Automatic mode is not available for region blocked accounts")]
    AutomaticUnavailable,
    #[error("IP blocked by WAF, change your IP or wait a few minutes")]
    IpBlocked,
    #[error("No live found at the given URL")]
    NotFound,
    #[error("Could not resolve username: {0}")]
    UsernameResolution(webcast::WebcastError),
    #[error("Could not extract room id: {0}")]
    RoomIdExtraction(#[from] SigiStateError),
    #[error("http error: {0}")]
    Http(#[from] util::DownloadError),
}

impl TargetInput {
    /// Builds the input from the three CLI options. Fails before any network
    /// access when zero or more than one identifier is supplied.
    pub fn from_options(
        url: Option<String>,
        user: Option<String>,
        room_id: Option<String>,
    ) -> Result<Self, ResolveError> {
        match (url, user, room_id) {
            (Some(url), None, None) => Ok(TargetInput::Url(url)),
            (None, Some(user), None) => Ok(TargetInput::Username(user)),
            (None, None, Some(room_id)) => Ok(TargetInput::RoomId(room_id)),
            (None, None, None) => Err(ResolveError::MissingInput),
            _ => Err(ResolveError::AmbiguousInput),
        }
    }
}

pub fn live_page_url(username: &str) -> String {
    format!("https://www.tiktok.com/@{}/live", username)
}

fn username_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"https?://(?:www\.)?tiktok\.com/@([^/]+)/live").ok()?;
    re.captures(url).map(|caps| caps[1].to_string())
}

fn username_from_body(body: &str) -> Option<String> {
    let re = Regex::new(r"com/@(.*?)/live").ok()?;
    re.captures(body).map(|caps| caps[1].to_string())
}

/// Probes the profile's live page without following redirects; a redirect
/// status means the account is not reachable from this region.
pub async fn is_region_blocked(
    client: &HttpClient,
    username: &str,
) -> Result<bool, util::DownloadError> {
    let (status, _) = client.fetch_noredirect(&live_page_url(username)).await?;
    Ok(status == StatusCode::FOUND)
}

/// Resolves an input into a canonical (username, room id) pair.
pub async fn resolve(
    client: &HttpClient,
    input: &TargetInput,
    mode: Mode,
) -> Result<BroadcastIdentity, ResolveError> {
    let probe_user = match input {
        TargetInput::Username(user) => user.clone(),
        TargetInput::Url(url) => username_from_url(url).unwrap_or_default(),
        TargetInput::RoomId(_) => String::new(),
    };

    if is_region_blocked(client, &probe_user).await? {
        match input {
            // Room-id based access bypasses the block, but cannot be polled.
            TargetInput::RoomId(_) if mode == Mode::Automatic => {
                return Err(ResolveError::AutomaticUnavailable)
            }
            TargetInput::RoomId(_) => (),
            _ => return Err(ResolveError::RegionBlocked),
        }
    }

    match input {
        TargetInput::Url(url) => {
            let username = resolve_user_from_url(client, url).await?;
            let room_id = room_id_from_username(client, &username).await?;
            Ok(BroadcastIdentity { username, room_id })
        }
        TargetInput::Username(username) => {
            let room_id = room_id_from_username(client, username).await?;
            Ok(BroadcastIdentity {
                username: username.clone(),
                room_id,
            })
        }
        TargetInput::RoomId(room_id) => {
            let username = webcast::user_from_room_id(client, room_id)
                .await
                .map_err(ResolveError::UsernameResolution)?;
            Ok(BroadcastIdentity {
                username,
                room_id: room_id.clone(),
            })
        }
    }
}

async fn resolve_user_from_url(client: &HttpClient, url: &str) -> Result<String, ResolveError> {
    let (status, body) = client.fetch_noredirect(url).await?;

    if status == StatusCode::FOUND {
        return Err(ResolveError::RegionBlocked);
    }

    if status == StatusCode::MOVED_PERMANENTLY {
        // The canonical username is embedded in the response body
        return username_from_body(&body).ok_or(ResolveError::NotFound);
    }

    username_from_url(url).ok_or(ResolveError::NotFound)
}

/// Fetches the user's live page and extracts the room id from the embedded
/// state. An empty room id means the user has never been live.
pub async fn room_id_from_username(
    client: &HttpClient,
    username: &str,
) -> Result<String, ResolveError> {
    let html = client.fetch_text(&live_page_url(username)).await?;

    if html.contains(WAF_MARKER) {
        return Err(ResolveError::IpBlocked);
    }

    let state = SigiState::from_html(&html)?;
    match state.room()? {
        RoomExtraction::Live(room_id) => Ok(room_id),
        RoomExtraction::NeverLive => Ok(String::new()),
    }
}
