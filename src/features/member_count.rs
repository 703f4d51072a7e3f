use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serenity::client::Context;
use serenity::model::channel::ChannelType;
use serenity::model::id::GuildId;
use tracing::{error, info};

use crate::error::{BotError, BotResult};
use crate::settings::SettingsClient;

/// Keeps a voice channel named `Members: N` in sync with the guild size.
#[derive(Clone, Default)]
pub struct MemberCounter {
    in_flight: Arc<Mutex<HashSet<GuildId>>>,
}

/// Held while a guild's channel is being renamed.
struct UpdateGuard {
    in_flight: Arc<Mutex<HashSet<GuildId>>>,
    guild_id: GuildId,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.guild_id);
        }
    }
}

impl MemberCounter {
    fn begin(&self, guild_id: GuildId) -> Option<UpdateGuard> {
        let mut in_flight = self.in_flight.lock().ok()?;

        if !in_flight.insert(guild_id) {
            return None;
        }

        Some(UpdateGuard {
            in_flight: self.in_flight.clone(),
            guild_id,
        })
    }

    /// Skipped when an update for the same guild is already running.
    pub async fn refresh(&self, ctx: &Context, settings: &SettingsClient, guild_id: GuildId) {
        let Some(_guard) = self.begin(guild_id) else {
            info!("Update already in progress for guild {}. Skipping...", guild_id.0);
            return;
        };

        if let Err(why) = update_channel_name(ctx, settings, guild_id).await {
            error!("Failed to update member count channel for guild {}: {why}", guild_id.0);
        }
    }
}

async fn update_channel_name(ctx: &Context, settings: &SettingsClient, guild_id: GuildId) -> BotResult {
    let Some(channel_id) = settings.member_count_channel(guild_id).await else {
        return Ok(());
    };

    let member_count = ctx
        .cache
        .guild(guild_id)
        .map(|guild| guild.member_count)
        .ok_or_else(|| BotError::from(format!("Guild not found: {}", guild_id.0)))?;

    match ctx.cache.guild_channel(channel_id) {
        Some(channel) if channel.kind == ChannelType::Voice => {}
        _ => return Err(BotError::from("Invalid or missing voice channel")),
    }

    let name = channel_label(member_count);
    channel_id.edit(&ctx.http, |c| c.name(&name)).await?;

    info!("Updated channel name for guild {} to: {name}", guild_id.0);

    Ok(())
}

pub fn channel_label(member_count: u64) -> String {
    format!("Members: {member_count}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        assert_eq!(channel_label(1234), "Members: 1234");
    }

    #[test]
    fn test_concurrent_updates_for_one_guild_are_deduplicated() {
        // Arrange
        let counter = MemberCounter::default();

        // Act
        let first = counter.begin(GuildId(1));
        let second = counter.begin(GuildId(1));
        let other_guild = counter.begin(GuildId(2));

        // Assert
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other_guild.is_some());
    }

    #[test]
    fn test_finished_update_releases_the_guild() {
        let counter = MemberCounter::default();

        drop(counter.begin(GuildId(1)));

        assert!(counter.begin(GuildId(1)).is_some());
    }
}
