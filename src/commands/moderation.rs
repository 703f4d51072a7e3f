use serenity::{
    builder::CreateApplicationCommands,
    client::Context,
    model::{
        application::{
            command::CommandOptionType,
            interaction::application_command::ApplicationCommandInteraction,
        },
        permissions::Permissions,
    },
};
use tracing::info;

use super::{boolean_option, defer, edit_reply, guild_id, integer_option, reply};
use crate::error::BotResult;
use crate::features::message_delete::{summary, DiscordChannel, MessageDeleter};

pub fn register(commands: &mut CreateApplicationCommands) -> &mut CreateApplicationCommands {
    commands.create_application_command(|command| {
        command
            .name("mod_delete_message")
            .description("Delete recent messages in this channel")
            .dm_permission(false)
            .default_member_permissions(Permissions::MANAGE_MESSAGES)
            .create_option(|option| {
                option
                    .name("message_number")
                    .description("How many messages to delete")
                    .kind(CommandOptionType::Integer)
                    .min_int_value(1)
                    .required(true)
            })
            .create_option(|option| {
                option
                    .name("reliable_vintage_model")
                    .description("Delete one by one, which also reaches messages older than two weeks")
                    .kind(CommandOptionType::Boolean)
                    .required(false)
            })
    })
}

pub async fn delete_messages(ctx: &Context, command: &ApplicationCommandInteraction) -> BotResult {
    let guild_id = guild_id(command)?;

    let count = match integer_option(command, "message_number") {
        Some(count) if count > 0 => count as u64,
        _ => {
            reply(ctx, command, "❌ Please provide a positive number of messages.", true).await?;
            return Ok(());
        }
    };
    let large_range = boolean_option(command, "reliable_vintage_model").unwrap_or(true);

    defer(ctx, command, true).await?;

    info!(
        "{} is deleting {count} messages in channel {} of guild {} (one by one: {large_range})",
        command.user.tag(),
        command.channel_id.0,
        guild_id.0
    );

    let deleter = MessageDeleter::new(DiscordChannel::new(ctx.http.clone(), command.channel_id));
    let deleted = deleter
        .delete_messages(count, large_range, chrono::Utc::now().timestamp())
        .await;

    edit_reply(ctx, command, summary(deleted)).await?;

    Ok(())
}
