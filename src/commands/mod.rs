//! Slash commands: registration, dispatch and the small helpers every command shares.

mod download;
mod moderation;
mod music;
mod utilities;

use serenity::{
    client::Context,
    model::{
        application::{
            command::Command,
            interaction::{
                application_command::{ApplicationCommandInteraction, CommandDataOptionValue},
                InteractionResponseType,
            },
        },
        channel::Message,
        id::{ChannelId, GuildId},
    },
    Result as SerenityResult,
};
use tracing::{error, info};

use crate::error::{BotError, BotResult};
use crate::handler::Handler;

const GENERIC_FAILURE: &str = "An error occurred while executing this command!";

/// Replaces the global command set with the one defined here.
pub async fn register_commands(ctx: &Context) -> BotResult {
    let commands = Command::set_global_application_commands(&ctx.http, |commands| {
        music::register(commands);
        download::register(commands);
        moderation::register(commands);
        utilities::register(commands)
    })
    .await?;

    info!("Registered {} application commands", commands.len());

    Ok(())
}

pub async fn dispatch(handler: &Handler, ctx: &Context, command: &ApplicationCommandInteraction) {
    let name = command.data.name.as_str();
    info!("/{name} invoked by {} in {:?}", command.user.tag(), command.guild_id);

    let result = match name {
        "music_add" => music::add(handler, ctx, command).await,
        "music_play" => music::play(handler, ctx, command).await,
        "music_showplaylist" => music::show_playlist(handler, ctx, command).await,
        "music_remove" => music::remove(handler, ctx, command).await,
        "music_skip" => music::skip(handler, ctx, command).await,
        "music_stop" => music::stop(handler, ctx, command).await,
        "download_video" => download::download_video(handler, ctx, command).await,
        "mod_delete_message" => moderation::delete_messages(ctx, command).await,
        "bot_test" => utilities::bot_test(ctx, command).await,
        "randomchar" => utilities::random_word(ctx, command).await,
        "bot_anonymousmessage" => utilities::anonymous_message(ctx, command).await,
        "help" => utilities::help(ctx, command).await,
        other => Err(BotError::from(format!("No command matching {other} found."))),
    };

    if let Err(why) = result {
        error!("Error executing /{name}: {why}");
        report_failure(ctx, command).await;
    }
}

/// Tells the user something went wrong, whether or not the interaction was already answered.
async fn report_failure(ctx: &Context, command: &ApplicationCommandInteraction) {
    if reply(ctx, command, GENERIC_FAILURE, true).await.is_ok() {
        return;
    }

    let followup = command
        .create_followup_message(&ctx.http, |message| message.content(GENERIC_FAILURE).ephemeral(true))
        .await;

    check_msg(followup);
}

pub(crate) async fn reply(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: impl ToString,
    ephemeral: bool,
) -> SerenityResult<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(content).ephemeral(ephemeral))
        })
        .await
}

/// Acknowledges a command whose answer takes longer than Discord's three second window.
pub(crate) async fn defer(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    ephemeral: bool,
) -> SerenityResult<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::DeferredChannelMessageWithSource)
                .interaction_response_data(|message| message.ephemeral(ephemeral))
        })
        .await
}

pub(crate) async fn edit_reply(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: impl ToString,
) -> SerenityResult<Message> {
    command
        .edit_original_interaction_response(&ctx.http, |response| response.content(content))
        .await
}

pub(crate) fn guild_id(command: &ApplicationCommandInteraction) -> BotResult<GuildId> {
    command
        .guild_id
        .ok_or_else(|| BotError::from("This command can only be used in a server."))
}

/// The voice channel the invoking user currently sits in, read from the cache.
pub(crate) fn user_voice_channel(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Option<ChannelId> {
    let guild = ctx.cache.guild(command.guild_id?)?;

    guild
        .voice_states
        .get(&command.user.id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn option<'a>(
    command: &'a ApplicationCommandInteraction,
    name: &str,
) -> Option<&'a CommandDataOptionValue> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.resolved.as_ref())
}

pub(crate) fn string_option(command: &ApplicationCommandInteraction, name: &str) -> Option<String> {
    match option(command, name)? {
        CommandDataOptionValue::String(value) => Some(value.trim().to_string()),
        _ => None,
    }
}

pub(crate) fn integer_option(command: &ApplicationCommandInteraction, name: &str) -> Option<i64> {
    match option(command, name)? {
        CommandDataOptionValue::Integer(value) => Some(*value),
        _ => None,
    }
}

pub(crate) fn boolean_option(command: &ApplicationCommandInteraction, name: &str) -> Option<bool> {
    match option(command, name)? {
        CommandDataOptionValue::Boolean(value) => Some(*value),
        _ => None,
    }
}

/// Checks that a message successfully sent; if not, then logs why.
pub(crate) fn check_msg<T>(result: SerenityResult<T>) {
    if let Err(why) = result {
        error!("Error sending message: {why:?}");
    }
}
