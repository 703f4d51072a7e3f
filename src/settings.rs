use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::BotResult;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the per-guild configuration API at `{endpoint}/api/{guildId}/...`.
pub struct SettingsClient {
    http: reqwest::Client,
    endpoint: String,
    member_count_channels: Mutex<HashMap<GuildId, Option<ChannelId>>>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WelcomeLeave {
    pub welcome_channel: Option<ChannelId>,
    pub leave_channel: Option<ChannelId>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    config: Option<T>,
}

#[derive(Deserialize)]
struct WelcomeLeaveConfig {
    #[serde(default, deserialize_with = "flexible_id")]
    welcome_channel_id: Option<u64>,
    #[serde(default, deserialize_with = "flexible_id")]
    leave_channel_id: Option<u64>,
}

#[derive(Deserialize)]
struct LogChannelConfig {
    #[serde(default, deserialize_with = "flexible_id")]
    log_channel_id: Option<u64>,
}

#[derive(Deserialize)]
struct DynamicVoiceConfig {
    #[serde(default, deserialize_with = "flexible_id")]
    base_channel_id: Option<u64>,
}

#[derive(Deserialize)]
struct TrackingMembersConfig {
    #[serde(default, deserialize_with = "flexible_id")]
    trackingmembers_channel_id: Option<u64>,
}

#[derive(Deserialize)]
struct ReactionRolesResponse {
    #[serde(default)]
    success: bool,
    data: Option<Vec<ReactionRoleRow>>,
}

#[derive(Clone, Debug, Deserialize)]
struct ReactionRoleRow {
    #[serde(default, deserialize_with = "flexible_id")]
    message_id: Option<u64>,
    emoji: String,
    #[serde(default, deserialize_with = "flexible_id")]
    role_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionRole {
    pub emoji: String,
    pub role_id: RoleId,
}

/// Reaction-role bindings grouped by the message they are attached to.
#[derive(Debug, Default)]
pub struct ReactionRoleTable {
    by_message: HashMap<MessageId, Vec<ReactionRole>>,
}

impl ReactionRoleTable {
    fn from_rows(rows: Vec<ReactionRoleRow>) -> Self {
        let mut by_message: HashMap<MessageId, Vec<ReactionRole>> = HashMap::new();

        for row in rows {
            let (Some(message_id), Some(role_id)) = (row.message_id, row.role_id) else {
                warn!("Skipping incomplete reaction role entry {row:?}");
                continue;
            };

            by_message.entry(MessageId(message_id)).or_default().push(ReactionRole {
                emoji: row.emoji,
                role_id: RoleId(role_id),
            });
        }

        ReactionRoleTable { by_message }
    }

    /// `emoji` is the custom emoji id, or the unicode character itself.
    pub fn role_for(&self, message_id: MessageId, emoji: &str) -> Option<RoleId> {
        self.by_message
            .get(&message_id)?
            .iter()
            .find(|binding| binding.emoji == emoji)
            .map(|binding| binding.role_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_message.is_empty()
    }
}

impl SettingsClient {
    pub fn new(endpoint: impl Into<String>, accept_invalid_certs: bool) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(SettingsClient {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            member_count_channels: Mutex::new(HashMap::new()),
        })
    }

    pub async fn welcome_leave(&self, guild_id: GuildId) -> WelcomeLeave {
        let config: Option<WelcomeLeaveConfig> = self.config(guild_id, "getWelcomeLeave").await;

        match config {
            Some(config) => WelcomeLeave {
                welcome_channel: config.welcome_channel_id.map(ChannelId),
                leave_channel: config.leave_channel_id.map(ChannelId),
            },
            None => WelcomeLeave::default(),
        }
    }

    pub async fn log_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let config: LogChannelConfig = self.config(guild_id, "log-channel").await?;
        config.log_channel_id.map(ChannelId)
    }

    pub async fn dynamic_voice_base(&self, guild_id: GuildId) -> Option<ChannelId> {
        let config: DynamicVoiceConfig = self.config(guild_id, "dynamic-voice-channels").await?;
        config.base_channel_id.map(ChannelId)
    }

    /// Cached after the first successful lookup, including "not configured".
    pub async fn member_count_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        if let Some(cached) = self.member_count_channels.lock().await.get(&guild_id) {
            return *cached;
        }

        let lookup: BotResult<Envelope<TrackingMembersConfig>> =
            self.get(guild_id, "trackingMembers").await;
        let response = match lookup {
            Ok(response) => response,
            Err(why) => {
                error!("Error fetching member count channel for guild {}: {why}", guild_id.0);
                return None;
            }
        };

        let channel_id = response
            .config
            .and_then(|config| config.trackingmembers_channel_id)
            .map(ChannelId);

        match channel_id {
            Some(channel_id) => {
                info!("Fetched member count channel for guild {}: {}", guild_id.0, channel_id.0)
            }
            None => warn!("No member count channel for guild {}", guild_id.0),
        }

        self.member_count_channels.lock().await.insert(guild_id, channel_id);

        channel_id
    }

    pub async fn reaction_roles(&self, guild_id: GuildId) -> ReactionRoleTable {
        let response: ReactionRolesResponse = match self.get(guild_id, "reaction-roles").await {
            Ok(response) => response,
            Err(why) => {
                error!("Error fetching reaction roles for guild {}: {why}", guild_id.0);
                return ReactionRoleTable::default();
            }
        };

        match response {
            ReactionRolesResponse {
                success: true,
                data: Some(rows),
            } => ReactionRoleTable::from_rows(rows),
            _ => {
                warn!("Reaction role response was unsuccessful for guild {}", guild_id.0);
                ReactionRoleTable::default()
            }
        }
    }

    async fn config<T: DeserializeOwned>(&self, guild_id: GuildId, path: &str) -> Option<T> {
        match self.get::<Envelope<T>>(guild_id, path).await {
            Ok(envelope) => envelope.config,
            Err(why) => {
                error!("Error fetching {path} for guild {}: {why}", guild_id.0);
                None
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, guild_id: GuildId, path: &str) -> BotResult<T> {
        let response = self
            .http
            .get(self.url(guild_id, path))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }

    fn url(&self, guild_id: GuildId, path: &str) -> String {
        format!("{}/api/{}/{path}", self.endpoint, guild_id.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Snowflakes arrive either as JSON strings or numbers; empty, zero or garbage means unset.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(id)) => Some(id),
        Some(RawId::Text(text)) => text.trim().parse().ok(),
        None => None,
    };

    Ok(id.filter(|id| *id != 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_endpoint_guild_and_path() {
        let client = SettingsClient::new("https://api.example/", false).unwrap();

        assert_eq!(client.url(GuildId(5), "log-channel"), "https://api.example/api/5/log-channel");
    }

    #[test]
    fn test_ids_accept_strings_and_numbers() {
        let raw = r#"{"config":{"welcome_channel_id":"123","leave_channel_id":456}}"#;

        let envelope: Envelope<WelcomeLeaveConfig> = serde_json::from_str(raw).unwrap();
        let config = envelope.config.unwrap();

        assert_eq!(config.welcome_channel_id, Some(123));
        assert_eq!(config.leave_channel_id, Some(456));
    }

    #[test]
    fn test_blank_and_null_ids_are_unset() {
        let raw = r#"{"config":{"welcome_channel_id":"","leave_channel_id":null}}"#;

        let envelope: Envelope<WelcomeLeaveConfig> = serde_json::from_str(raw).unwrap();
        let config = envelope.config.unwrap();

        assert_eq!(config.welcome_channel_id, None);
        assert_eq!(config.leave_channel_id, None);
    }

    #[test]
    fn test_missing_config_object() {
        let envelope: Envelope<LogChannelConfig> = serde_json::from_str(r#"{"error":"not found"}"#).unwrap();

        assert!(envelope.config.is_none());
    }

    #[test]
    fn test_reaction_roles_are_grouped_by_message() {
        // Arrange
        let raw = r#"{"success":true,"data":[
            {"message_id":"100","channel_id":"1","emoji":"👍","role_id":"7"},
            {"message_id":"100","channel_id":"1","emoji":"998877","role_id":"8"},
            {"message_id":"200","channel_id":"2","emoji":"👍","role_id":"9"},
            {"message_id":"300","channel_id":"2","emoji":"🔥","role_id":""}
        ]}"#;
        let response: ReactionRolesResponse = serde_json::from_str(raw).unwrap();

        // Act
        let table = ReactionRoleTable::from_rows(response.data.unwrap());

        // Assert
        assert_eq!(table.role_for(MessageId(100), "👍"), Some(RoleId(7)));
        assert_eq!(table.role_for(MessageId(100), "998877"), Some(RoleId(8)));
        assert_eq!(table.role_for(MessageId(200), "👍"), Some(RoleId(9)));
        assert_eq!(table.role_for(MessageId(200), "🔥"), None);
        assert_eq!(table.role_for(MessageId(300), "🔥"), None);
        assert_eq!(table.role_for(MessageId(999), "👍"), None);
    }

    #[test]
    fn test_unsuccessful_reaction_role_response_parses() {
        let response: ReactionRolesResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();

        assert!(!response.success);
        assert!(response.data.is_none());
    }
}
