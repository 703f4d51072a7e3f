use serenity::client::Context;
use serenity::model::channel::{Reaction, ReactionType};
use tracing::{debug, error, info, warn};

use crate::error::BotResult;
use crate::settings::SettingsClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    Removed,
}

/// Grants or revokes the role bound to this message and emoji, if any.
pub async fn handle_reaction(
    ctx: &Context,
    settings: &SettingsClient,
    reaction: &Reaction,
    change: ReactionChange,
) {
    if let Err(why) = apply(ctx, settings, reaction, change).await {
        error!("Error handling reaction {change:?}: {why}");
    }
}

async fn apply(
    ctx: &Context,
    settings: &SettingsClient,
    reaction: &Reaction,
    change: ReactionChange,
) -> BotResult {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };

    let user = reaction.user(ctx).await?;
    if user.bot {
        return Ok(());
    }

    let Some(emoji) = emoji_key(&reaction.emoji) else {
        debug!("Ignoring reaction without a usable emoji key");
        return Ok(());
    };

    let table = settings.reaction_roles(guild_id).await;
    let Some(role_id) = table.role_for(reaction.message_id, &emoji) else {
        if !table.is_empty() {
            warn!("No reaction role for message {} and emoji {emoji}", reaction.message_id.0);
        }
        return Ok(());
    };

    let mut member = guild_id.member(ctx, user_id).await?;

    match change {
        ReactionChange::Added => {
            member.add_role(&ctx.http, role_id).await?;
            info!("Added role {} to {} for reaction {emoji}", role_id.0, user.tag());
        }
        ReactionChange::Removed => {
            member.remove_role(&ctx.http, role_id).await?;
            info!("Removed role {} from {} for reaction {emoji}", role_id.0, user.tag());
        }
    }

    Ok(())
}

/// Custom emojis are keyed by id, unicode ones by the character itself.
pub fn emoji_key(emoji: &ReactionType) -> Option<String> {
    match emoji {
        ReactionType::Custom { id, .. } => Some(id.0.to_string()),
        ReactionType::Unicode(name) => Some(name.clone()),
        _ => None,
    }
}
