use serenity::client::Context;
use serenity::model::guild::Member;
use serenity::model::id::{ChannelId, GuildId, RoleId};
use serenity::model::voice::VoiceState;
use tracing::{error, warn};

use crate::settings::SettingsClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceTransition {
    Joined(ChannelId),
    Left(ChannelId),
    Unchanged,
}

/// Logs nickname and role changes.
pub async fn member_updated(
    ctx: &Context,
    settings: &SettingsClient,
    old: Option<&Member>,
    new: &Member,
) {
    let Some(old) = old else {
        return;
    };

    let mut lines = Vec::new();

    if let Some(line) = nickname_line(old.nick.as_deref(), new.nick.as_deref(), &new.user.name) {
        lines.push(line);
    }

    let (added, removed) = role_changes(&old.roles, &new.roles);
    let tag = new.user.tag();

    for role_id in added {
        if let Some(role) = role_id.to_role_cached(&ctx.cache) {
            lines.push(format!("➕ **{tag}** was given the role **{}**", role.name));
        }
    }

    for role_id in removed {
        if let Some(role) = role_id.to_role_cached(&ctx.cache) {
            lines.push(format!("➖ **{tag}** was removed from the role **{}**", role.name));
        }
    }

    if !lines.is_empty() {
        relay(ctx, settings, new.guild_id, lines).await;
    }
}

/// Logs voice channel joins and leaves.
pub async fn voice_state_changed(
    ctx: &Context,
    settings: &SettingsClient,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };

    let line = match voice_transition(old.and_then(|state| state.channel_id), new.channel_id) {
        VoiceTransition::Joined(channel_id) => {
            let tag = user_tag(ctx, new).await;
            format!("🔊 **{tag}** joined voice channel **{}**", channel_label(ctx, channel_id))
        }
        VoiceTransition::Left(channel_id) => {
            let tag = user_tag(ctx, new).await;
            format!("🔇 **{tag}** left voice channel **{}**", channel_label(ctx, channel_id))
        }
        VoiceTransition::Unchanged => return,
    };

    relay(ctx, settings, guild_id, vec![line]).await;
}

async fn relay(ctx: &Context, settings: &SettingsClient, guild_id: GuildId, lines: Vec<String>) {
    let Some(log_channel) = settings.log_channel(guild_id).await else {
        return;
    };

    if ctx.cache.guild_channel(log_channel).is_none() {
        warn!("Log channel {} not found in guild {}", log_channel.0, guild_id.0);
        return;
    }

    for line in lines {
        if let Err(why) = log_channel.say(&ctx.http, line).await {
            error!("Failed to relay to log channel: {why:?}");
        }
    }
}

async fn user_tag(ctx: &Context, state: &VoiceState) -> String {
    if let Some(member) = &state.member {
        return member.user.tag();
    }

    match state.user_id.to_user(ctx).await {
        Ok(user) => user.tag(),
        Err(_) => state.user_id.0.to_string(),
    }
}

fn channel_label(ctx: &Context, channel_id: ChannelId) -> String {
    ctx.cache
        .guild_channel(channel_id)
        .map(|channel| channel.name)
        .unwrap_or_else(|| channel_id.0.to_string())
}

/// Nicknames fall back to the username when unset.
pub fn nickname_line(old: Option<&str>, new: Option<&str>, username: &str) -> Option<String> {
    if old == new {
        return None;
    }

    Some(format!(
        "🔄 **{}** changed their nickname to **{}**",
        old.unwrap_or(username),
        new.unwrap_or(username)
    ))
}

/// Roles present only in `new`, then roles present only in `old`.
pub fn role_changes(old: &[RoleId], new: &[RoleId]) -> (Vec<RoleId>, Vec<RoleId>) {
    let added = new.iter().filter(|role| !old.contains(role)).copied().collect();
    let removed = old.iter().filter(|role| !new.contains(role)).copied().collect();

    (added, removed)
}

/// Moving between channels is not logged.
pub fn voice_transition(old: Option<ChannelId>, new: Option<ChannelId>) -> VoiceTransition {
    match (old, new) {
        (None, Some(channel_id)) => VoiceTransition::Joined(channel_id),
        (Some(channel_id), None) => VoiceTransition::Left(channel_id),
        _ => VoiceTransition::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_line_only_for_changes() {
        assert_eq!(nickname_line(Some("a"), Some("a"), "user"), None);
        assert_eq!(
            nickname_line(None, Some("Cat"), "user").as_deref(),
            Some("🔄 **user** changed their nickname to **Cat**")
        );
        assert_eq!(
            nickname_line(Some("Cat"), None, "user").as_deref(),
            Some("🔄 **Cat** changed their nickname to **user**")
        );
    }

    #[test]
    fn test_role_changes() {
        let (added, removed) = role_changes(&[RoleId(1), RoleId(2)], &[RoleId(2), RoleId(3)]);

        assert_eq!(added, vec![RoleId(3)]);
        assert_eq!(removed, vec![RoleId(1)]);
    }

    #[test]
    fn test_voice_transitions() {
        assert_eq!(voice_transition(None, Some(ChannelId(1))), VoiceTransition::Joined(ChannelId(1)));
        assert_eq!(voice_transition(Some(ChannelId(1)), None), VoiceTransition::Left(ChannelId(1)));
        assert_eq!(voice_transition(Some(ChannelId(1)), Some(ChannelId(2))), VoiceTransition::Unchanged);
        assert_eq!(voice_transition(None, None), VoiceTransition::Unchanged);
    }
}
