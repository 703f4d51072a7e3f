use serenity::client::Context;
use serenity::model::channel::{ChannelType, PermissionOverwrite, PermissionOverwriteType};
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::model::permissions::Permissions;
use serenity::model::voice::VoiceState;
use tracing::{error, info, warn};

use crate::error::BotResult;
use crate::settings::SettingsClient;

const CHANNEL_SUFFIX: &str = "'s Channel";
const FALLBACK_NAME: &str = "Default Channel";

/// Creates a private voice channel when someone joins the base channel, and removes dynamic
/// channels once their last member leaves.
pub async fn voice_state_changed(
    ctx: &Context,
    settings: &SettingsClient,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };

    let old_channel = old.and_then(|state| state.channel_id);
    if old_channel == new.channel_id {
        return;
    }

    let Some(base_channel) = settings.dynamic_voice_base(guild_id).await else {
        warn!("Guild {} does not have a configured dynamic voice base channel", guild_id.0);
        return;
    };

    if new.channel_id == Some(base_channel) {
        if let Err(why) = create_channel_for(ctx, guild_id, base_channel, new).await {
            error!("Failed to create dynamic channel: {why}");
        }
    }

    if let Some(old_channel) = old_channel {
        if let Err(why) = delete_if_abandoned(ctx, guild_id, old_channel).await {
            error!("Failed to delete empty channel: {why}");
        }
    }
}

async fn create_channel_for(
    ctx: &Context,
    guild_id: GuildId,
    base_channel: ChannelId,
    state: &VoiceState,
) -> BotResult {
    let user_id = state.user_id;
    let username = match &state.member {
        Some(member) => member.user.name.clone(),
        None => user_id.to_user(ctx).await?.name,
    };

    let name = channel_name(&username);
    let category = ctx.cache.guild_channel(base_channel).and_then(|channel| channel.parent_id);

    let channel = guild_id
        .create_channel(&ctx.http, |c| {
            c.name(&name)
                .kind(ChannelType::Voice)
                .permissions(vec![owner_overwrite(user_id)]);

            if let Some(category) = category {
                c.category(category);
            }

            c
        })
        .await?;

    guild_id.move_member(&ctx.http, user_id, channel.id).await?;

    info!("Created and moved member to channel: {}", channel.id.0);

    Ok(())
}

async fn delete_if_abandoned(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> BotResult {
    let Some(channel) = ctx.cache.guild_channel(channel_id) else {
        return Ok(());
    };

    if !is_dynamic_channel(&channel.name) {
        return Ok(());
    }

    let occupants = ctx
        .cache
        .guild(guild_id)
        .map(|guild| {
            guild
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel_id))
                .count()
        })
        .unwrap_or(0);

    if occupants == 0 {
        channel_id.delete(&ctx.http).await?;
        info!("Deleted empty channel: {}", channel_id.0);
    }

    Ok(())
}

fn owner_overwrite(user_id: UserId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::MANAGE_CHANNELS
            | Permissions::MOVE_MEMBERS
            | Permissions::MUTE_MEMBERS
            | Permissions::DEAFEN_MEMBERS,
        deny: Permissions::empty(),
        kind: PermissionOverwriteType::Member(user_id),
    }
}

/// `"<name>'s Channel"`, keeping only `[A-Za-z0-9-_ ]` from the username.
pub fn channel_name(username: &str) -> String {
    let cleaned: String = username
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();

    let base = if cleaned.is_empty() { FALLBACK_NAME } else { cleaned.as_str() };

    format!("{base}{CHANNEL_SUFFIX}")
}

pub fn is_dynamic_channel(name: &str) -> bool {
    name.contains(CHANNEL_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_strips_unsupported_characters() {
        assert_eq!(channel_name("  Neko_Chan-42 "), "Neko_Chan-42's Channel");
        assert_eq!(channel_name("ねこ★cat"), "cat's Channel");
    }

    #[test]
    fn test_channel_name_falls_back_when_nothing_is_left() {
        assert_eq!(channel_name("★★★"), "Default Channel's Channel");
        assert_eq!(channel_name(""), "Default Channel's Channel");
    }

    #[test]
    fn test_dynamic_channels_are_recognised_by_suffix() {
        assert!(is_dynamic_channel(&channel_name("neko")));
        assert!(!is_dynamic_channel("General"));
    }

    #[test]
    fn test_owner_gets_moderation_permissions() {
        let overwrite = owner_overwrite(UserId(7));

        assert!(overwrite.allow.contains(Permissions::MOVE_MEMBERS));
        assert!(overwrite.deny.is_empty());
        assert!(matches!(overwrite.kind, PermissionOverwriteType::Member(UserId(7))));
    }
}
