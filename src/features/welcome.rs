use std::borrow::Cow;
use std::path::Path;

use serenity::client::Context;
use serenity::model::channel::AttachmentType;
use serenity::model::guild::Member;
use serenity::model::id::GuildId;
use serenity::model::user::User;
use serenity::prelude::Mentionable;
use tracing::{error, info, warn};

use crate::settings::SettingsClient;

const BANNER_FILENAME: &str = "welcome-banner.png";

/// Greets a new member with an embed and, when readable, the banner image.
pub async fn member_joined(ctx: &Context, settings: &SettingsClient, banner: &Path, member: &Member) {
    let Some(channel_id) = settings.welcome_leave(member.guild_id).await.welcome_channel else {
        info!("❕Welcome channel configuration not found for guild {}", member.guild_id.0);
        return;
    };

    let banner = match tokio::fs::read(banner).await {
        Ok(bytes) => Some(bytes),
        Err(why) => {
            warn!("Unable to read welcome banner {}: {why}", banner.display());
            None
        }
    };

    let user = &member.user;
    let title = welcome_title(&user.tag());
    let description = format!("{} welcome to the server!", user.mention());
    let avatar = user.face();

    let sent = channel_id
        .send_message(&ctx.http, |m| {
            m.embed(|e| e.title(title).description(description).thumbnail(avatar));

            if let Some(bytes) = banner {
                m.add_file(AttachmentType::Bytes {
                    data: Cow::Owned(bytes),
                    filename: BANNER_FILENAME.to_string(),
                });
            }

            m
        })
        .await;

    if let Err(why) = sent {
        error!("An error occurred while sending the welcome message: {why:?}");
    }
}

pub async fn member_left(ctx: &Context, settings: &SettingsClient, guild_id: GuildId, user: &User) {
    let Some(channel_id) = settings.welcome_leave(guild_id).await.leave_channel else {
        info!("❕Leave channel configuration not found for guild {}", guild_id.0);
        return;
    };

    if let Err(why) = channel_id.say(&ctx.http, farewell_line(&user.tag())).await {
        error!("An error occurred while sending the leave message: {why:?}");
    }
}

fn welcome_title(tag: &str) -> String {
    format!("Welcome {tag} to the server!")
}

fn farewell_line(tag: &str) -> String {
    format!("**{tag}** has left the server.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_the_user_tag() {
        assert_eq!(welcome_title("neko#0420"), "Welcome neko#0420 to the server!");
        assert_eq!(farewell_line("neko#0420"), "**neko#0420** has left the server.");
    }
}
