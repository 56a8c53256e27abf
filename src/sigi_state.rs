use serde::Deserialize;

/// Typed view of the state blob TikTok embeds in its live pages. Only the
/// paths the resolver needs are modelled; everything else is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SigiState {
    #[serde(rename = "LiveRoom")]
    pub live_room: Option<LiveRoom>,
    #[serde(rename = "CurrentRoom")]
    pub current_room: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRoom {
    pub live_room_user_info: Option<LiveRoomUserInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRoomUserInfo {
    pub user: Option<LiveRoomUser>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRoomUser {
    pub room_id: Option<String>,
    pub unique_id: Option<String>,
}

/// Outcome of looking for a room id in the embedded state.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomExtraction {
    Live(String),
    /// The page has a room reference but no live room: the user exists and
    /// has never been live.
    NeverLive,
}

#[derive(thiserror::Error, Debug)]
pub enum SigiStateError {
    #[error("Could not find SIGI_STATE in page")]
    NoSigiState,
    #[error("Could not parse SIGI_STATE: {0}")]
    ParseSigiState(#[from] serde_json::Error),
    #[error("Room id not found in SIGI_STATE")]
    NoRoomId,
}

const SIGI_STR: &str = r#"<script id="SIGI_STATE" type="application/json">"#;

fn get_sigi_str(html: &str) -> Option<&str> {
    let idx_start = html.find(SIGI_STR)? + SIGI_STR.len();
    let idx_end = html[idx_start..].find("</script>")? + idx_start;
    Some(&html[idx_start..idx_end])
}

impl SigiState {
    pub fn from_html(html: &str) -> Result<Self, SigiStateError> {
        let sigi_str = get_sigi_str(html).ok_or(SigiStateError::NoSigiState)?;
        serde_json::from_str(sigi_str).map_err(SigiStateError::ParseSigiState)
    }

    /// Extracts the room id. A page carrying a `CurrentRoom` reference but no
    /// `LiveRoom` belongs to a user who has never been live; a `LiveRoom`
    /// without a room id is a parse failure.
    pub fn room(&self) -> Result<RoomExtraction, SigiStateError> {
        if self.live_room.is_none() && self.current_room.is_some() {
            return Ok(RoomExtraction::NeverLive);
        }

        self.live_room
            .as_ref()
            .and_then(|lr| lr.live_room_user_info.as_ref())
            .and_then(|info| info.user.as_ref())
            .and_then(|user| user.room_id.clone())
            .map(RoomExtraction::Live)
            .ok_or(SigiStateError::NoRoomId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigi_str() {
        let test_str = r#"<script id="SIGI_STATE" type="application/json">{"a": 1}</script>"#;
        let result = get_sigi_str(test_str).expect("Could not find SIGI_STATE");
        assert_eq!(result, r#"{"a": 1}"#);

        let test_str = r#"<script id="SIGI_STATE" type="application/json">{"a": 1}"#;
        assert!(get_sigi_str(test_str).is_none());

        let test_str = r#"<script id="OTHER" type="application/json">{}</script>"#;
        assert!(get_sigi_str(test_str).is_none());
    }

    fn wrap(json: &str) -> String {
        format!(
            r#"<html><head></head><body><script id="SIGI_STATE" type="application/json">{}</script></body></html>"#,
            json
        )
    }

    #[test]
    fn room_live() {
        let html = wrap(
            r#"{"LiveRoom":{"liveRoomUserInfo":{"user":{"roomId":"7318296342189919011","uniqueId":"alice"}}}}"#,
        );
        let state = SigiState::from_html(&html).expect("Could not parse SIGI_STATE");
        assert_eq!(
            state.room().expect("No room extraction"),
            RoomExtraction::Live("7318296342189919011".to_string())
        );
    }

    #[test]
    fn room_never_live() {
        let html = wrap(r#"{"CurrentRoom":{}}"#);
        let state = SigiState::from_html(&html).expect("Could not parse SIGI_STATE");
        assert_eq!(
            state.room().expect("No room extraction"),
            RoomExtraction::NeverLive
        );
    }

    #[test]
    fn room_missing() {
        // Neither LiveRoom nor CurrentRoom
        let html = wrap(r#"{"AppContext":{}}"#);
        let state = SigiState::from_html(&html).expect("Could not parse SIGI_STATE");
        assert!(matches!(state.room(), Err(SigiStateError::NoRoomId)));

        // LiveRoom present but no room id inside
        let html = wrap(r#"{"LiveRoom":{"liveRoomUserInfo":{"user":{"uniqueId":"alice"}}}}"#);
        let state = SigiState::from_html(&html).expect("Could not parse SIGI_STATE");
        assert!(matches!(state.room(), Err(SigiStateError::NoRoomId)));
    }

    #[test]
    fn no_script_tag() {
        assert!(matches!(
            SigiState::from_html("<html></html>"),
            Err(SigiStateError::NoSigiState)
        ));
    }
}
