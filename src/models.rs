use std::time::Duration;

pub const UNKNOWN_TRACK_TITLE: &str = "UNKNOWN TRACK";

/// Metadata about a single video, as reported by the extractor.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub duration: Option<Duration>,
    pub uploader: Option<String>,
    pub playable: bool,
}

/// One exchange of a direct-message conversation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub user_id: String,
    pub user_name: String,
    pub user: String,
    pub ai: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub link: String,
}
