use serde::Deserialize;
use serde_aux::prelude::*;

use crate::util::{self, HttpClient};

const ROOM_INFO_URL: &str = "https://webcast.tiktok.com/webcast/room/info/?aid=1988&room_id=";
const CHECK_ALIVE_URL: &str =
    "https://webcast.tiktok.com/webcast/room/check_alive/?aid=1988&region=CH&user_is_login=true&room_ids=";
const LIVE_DETAIL_URL: &str = "https://www.tiktok.com/api/live/detail/?aid=1988&roomID=";

/// Status code room/info returns when the live is region or feature gated.
const STATUS_LIVE_RESTRICTION: i64 = 4003110;
const PRIVATE_ACCOUNT_MARKER: &str = "This account is private";

#[derive(thiserror::Error, Debug)]
pub enum WebcastError {
    #[error("Account is private, login required to access it")]
    AccountPrivate,
    #[error("Live is restricted for this region or account")]
    LiveRestriction,
    #[error("No pull URL found for this live")]
    UrlNotFound,
    #[error("Could not resolve username from room id")]
    UsernameNotFound,
    #[error("http error: {0}")]
    Http(#[from] util::DownloadError),
    #[error("Could not parse webcast response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomInfo {
    pub status_code: Option<i64>,
    pub data: Option<RoomInfoData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomInfoData {
    pub stream_url: Option<StreamUrl>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamUrl {
    pub rtmp_pull_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckAlive {
    #[serde(default)]
    pub data: Vec<AliveEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AliveEntry {
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveDetail {
    #[serde(rename = "LiveRoomInfo")]
    pub live_room_info: Option<LiveRoomInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRoomInfo {
    pub owner_info: Option<OwnerInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInfo {
    pub unique_id: Option<String>,
}

/// Whether the room currently represents an active broadcast. An absent
/// alive flag means not live; retry policy is left to the caller.
pub async fn is_live(client: &HttpClient, room_id: &str) -> Result<bool, WebcastError> {
    let url = format!("{}{}", CHECK_ALIVE_URL, room_id);
    let res: CheckAlive = client.fetch_json(&url).await?;
    Ok(res.data.first().map(|entry| entry.alive).unwrap_or(false))
}

/// Fetches the FLV pull URL for a live room, classifying platform-side
/// restriction responses.
pub async fn pull_url(client: &HttpClient, room_id: &str) -> Result<String, WebcastError> {
    let url = format!("{}{}", ROOM_INFO_URL, room_id);
    let body = client.fetch_text(&url).await?;
    classify_room_info(&body)
}

/// Classifies a raw room/info response body: private account, restricted
/// live, missing pull URL, or the URL itself.
fn classify_room_info(body: &str) -> Result<String, WebcastError> {
    if body.contains(PRIVATE_ACCOUNT_MARKER) {
        return Err(WebcastError::AccountPrivate);
    }

    let info: RoomInfo = serde_json::from_str(body)?;

    if let Some(url) = info
        .data
        .as_ref()
        .and_then(|data| data.stream_url.as_ref())
        .and_then(|stream| stream.rtmp_pull_url.clone())
    {
        return Ok(url);
    }

    if info.status_code == Some(STATUS_LIVE_RESTRICTION) {
        Err(WebcastError::LiveRestriction)
    } else {
        Err(WebcastError::UrlNotFound)
    }
}

/// Looks up the owner's unique id for a room id.
pub async fn user_from_room_id(client: &HttpClient, room_id: &str) -> Result<String, WebcastError> {
    let url = format!("{}{}", LIVE_DETAIL_URL, room_id);
    let detail: LiveDetail = client.fetch_json(&url).await?;

    detail
        .live_room_info
        .and_then(|info| info.owner_info)
        .and_then(|owner| owner.unique_id)
        .filter(|id| !id.is_empty())
        .ok_or(WebcastError::UsernameNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_url_present() {
        let body =
            r#"{"data":{"stream_url":{"rtmp_pull_url":"https://pull-flv.example/live.flv"}},"status_code":0}"#;
        assert_eq!(
            classify_room_info(body).expect("No pull url"),
            "https://pull-flv.example/live.flv"
        );
    }

    #[test]
    fn pull_url_private_account() {
        let body = r#"{"data":{"message":"This account is private"},"status_code":0}"#;
        assert!(matches!(
            classify_room_info(body),
            Err(WebcastError::AccountPrivate)
        ));
    }

    #[test]
    fn pull_url_restricted() {
        let body = r#"{"data":{},"status_code":4003110}"#;
        assert!(matches!(
            classify_room_info(body),
            Err(WebcastError::LiveRestriction)
        ));
    }

    #[test]
    fn pull_url_absent() {
        let body = r#"{"data":{"stream_url":{}},"status_code":0}"#;
        assert!(matches!(
            classify_room_info(body),
            Err(WebcastError::UrlNotFound)
        ));
    }

    #[test]
    fn alive_flag_defaults_to_false() {
        let res: CheckAlive = serde_json::from_str(r#"{"data":[{}]}"#).expect("Could not parse");
        assert_eq!(res.data.first().map(|e| e.alive), Some(false));

        let res: CheckAlive = serde_json::from_str(r#"{"data":[]}"#).expect("Could not parse");
        assert_eq!(res.data.first().map(|e| e.alive).unwrap_or(false), false);

        let res: CheckAlive =
            serde_json::from_str(r#"{"data":[{"alive":true}]}"#).expect("Could not parse");
        assert_eq!(res.data.first().map(|e| e.alive), Some(true));
    }

    #[test]
    fn live_detail_owner() {
        let detail: LiveDetail = serde_json::from_str(
            r#"{"LiveRoomInfo":{"ownerInfo":{"uniqueId":"alice"}}}"#,
        )
        .expect("Could not parse live detail");
        assert_eq!(
            detail
                .live_room_info
                .and_then(|i| i.owner_info)
                .and_then(|o| o.unique_id),
            Some("alice".to_string())
        );
    }
}
