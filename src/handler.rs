use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Context, EventHandler},
    model::{
        application::interaction::Interaction,
        channel::{Message, Reaction},
        gateway::{Activity, Ready},
        guild::Member,
        id::{ChannelId, GuildId, UserId},
        prelude::{OnlineStatus, User, VoiceState},
    },
};
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::commands;
use crate::config::Config;
use crate::features::{
    ai_chat::AiChat,
    dynamic_voice,
    member_count::MemberCounter,
    reaction_roles::{self, ReactionChange},
    server_log, welcome,
};
use crate::music::{MusicManager, SongbirdBackend};
use crate::settings::SettingsClient;

pub struct Handler {
    pub config: Arc<Config>,
    pub settings: Arc<SettingsClient>,
    pub music: MusicManager<SongbirdBackend>,
    pub chat: Option<Arc<AiChat>>,
    pub member_counter: MemberCounter,
    bot_id: OnceCell<UserId>,
}

impl Handler {
    pub fn new(
        config: Arc<Config>,
        settings: Arc<SettingsClient>,
        music: MusicManager<SongbirdBackend>,
        chat: Option<Arc<AiChat>>,
    ) -> Self {
        Handler {
            config,
            settings,
            music,
            chat,
            member_counter: MemberCounter::default(),
            bot_id: OnceCell::new(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    /// Sets the presence and registers the slash commands once the gateway is ready.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        let _ = self.bot_id.set(ready.user.id);

        ctx.set_presence(Some(Activity::playing("/help")), OnlineStatus::DoNotDisturb)
            .await;

        if let Err(why) = commands::register_commands(&ctx).await {
            error!("Failed to register application commands: {why:?}");
        }
    }

    /// Routes slash commands to their handlers.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(command) = interaction {
            commands::dispatch(self, &ctx, &command).await;
        }
    }

    /// Direct messages go to the AI companion when one is configured.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id.is_some() || msg.author.bot {
            return;
        }

        if let Some(chat) = &self.chat {
            chat.handle_direct_message(&ctx, &msg).await;
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        reaction_roles::handle_reaction(&ctx, &self.settings, &reaction, ReactionChange::Added).await;
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        reaction_roles::handle_reaction(&ctx, &self.settings, &reaction, ReactionChange::Removed).await;
    }

    /// Greets the new member and refreshes the member counter.
    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        welcome::member_joined(&ctx, &self.settings, &self.config.welcome_banner, &new_member).await;

        self.member_counter
            .refresh(&ctx, &self.settings, new_member.guild_id)
            .await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        welcome::member_left(&ctx, &self.settings, guild_id, &user).await;

        self.member_counter.refresh(&ctx, &self.settings, guild_id).await;
    }

    /// Nickname and role changes are relayed to the server log.
    async fn guild_member_update(&self, ctx: Context, old: Option<Member>, new: Member) {
        server_log::member_updated(&ctx, &self.settings, old.as_ref(), &new).await;
    }

    /// Logs voice activity, then tracks the bot being kicked from voice and dynamic channels.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        server_log::voice_state_changed(&ctx, &self.settings, old.as_ref(), &new).await;

        let bot_id = self.bot_id.get().copied();
        if let Some(guild_id) = own_disconnect(bot_id, new.user_id, new.channel_id, new.guild_id) {
            info!("Bot was disconnected from voice in guild {}", guild_id.0);
            self.music.disconnected(guild_id).await;
            return;
        }

        dynamic_voice::voice_state_changed(&ctx, &self.settings, old.as_ref(), &new).await;
    }
}

/// The guild the bot just lost its voice connection in, if this update is that event.
fn own_disconnect(
    bot_id: Option<UserId>,
    user_id: UserId,
    channel_id: Option<ChannelId>,
    guild_id: Option<GuildId>,
) -> Option<GuildId> {
    if channel_id.is_some() || bot_id != Some(user_id) {
        return None;
    }

    guild_id
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: UserId = UserId(1);
    const GUILD: GuildId = GuildId(10);

    #[test]
    fn test_own_disconnect_is_detected() {
        // Act
        let guild = own_disconnect(Some(BOT), BOT, None, Some(GUILD));

        // Assert
        assert_eq!(guild, Some(GUILD));
    }

    #[test]
    fn test_other_updates_are_not_own_disconnects() {
        assert_eq!(own_disconnect(Some(BOT), UserId(2), None, Some(GUILD)), None);
        assert_eq!(own_disconnect(Some(BOT), BOT, Some(ChannelId(5)), Some(GUILD)), None);
        assert_eq!(own_disconnect(None, BOT, None, Some(GUILD)), None);
        assert_eq!(own_disconnect(Some(BOT), BOT, None, None), None);
    }
}
