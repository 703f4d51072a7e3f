use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serenity::{
    builder::{CreateApplicationCommands, CreateEmbed},
    client::Context,
    model::{
        application::{
            command::CommandOptionType,
            interaction::{application_command::ApplicationCommandInteraction, InteractionResponseType},
        },
        id::MessageId,
    },
};
use tracing::{error, info};

use super::{reply, string_option};
use crate::error::{BotError, BotResult};

struct HelpCategory {
    title: &'static str,
    description: &'static str,
    commands: &'static [&'static str],
    colour: u32,
}

const HELP: [HelpCategory; 3] = [
    HelpCategory {
        title: "🎵 Music",
        description: "Control what the bot plays in voice channels.",
        commands: &[
            "`/music_add` - Add a song",
            "`/music_play` - Play the playlist",
            "`/music_skip` - Skip the current song",
            "`/music_stop` - Stop playback",
            "`/music_remove` - Remove a song",
            "`/music_showplaylist` - Show the playlist",
            "`/download_video` - Download a video as mp3",
        ],
        colour: 0x1DB954,
    },
    HelpCategory {
        title: "🛠️ Utilities",
        description: "Handy everyday commands.",
        commands: &[
            "`/bot_anonymousmessage` - Send a message anonymously",
            "`/randomchar` - Pick one of your words at random",
            "`/bot_test` - Check that the bot is alive",
        ],
        colour: 0x7289DA,
    },
    HelpCategory {
        title: "🔧 Moderation",
        description: "Server management commands.",
        commands: &["`/mod_delete_message` - Delete recent messages"],
        colour: 0xFF5733,
    },
];

pub fn register(commands: &mut CreateApplicationCommands) -> &mut CreateApplicationCommands {
    commands
        .create_application_command(|command| {
            command.name("bot_test").description("Check that the bot is running")
        })
        .create_application_command(|command| {
            command
                .name("randomchar")
                .description("Randomly returns one of the words you give")
                .create_option(|option| {
                    option
                        .name("input")
                        .description("Words separated by spaces")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
        })
        .create_application_command(|command| {
            command
                .name("bot_anonymousmessage")
                .description("Send an anonymous message in this channel")
                .create_option(|option| {
                    option
                        .name("message")
                        .description("Anonymous message to send")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
                .create_option(|option| {
                    option
                        .name("messageid")
                        .description("Message id to reply to")
                        .kind(CommandOptionType::String)
                        .required(false)
                })
        })
        .create_application_command(|command| {
            command.name("help").description("📜 Show the bot's commands")
        })
}

pub async fn bot_test(ctx: &Context, command: &ApplicationCommandInteraction) -> BotResult {
    reply(ctx, command, "The robot is running", false).await?;

    Ok(())
}

pub async fn random_word(ctx: &Context, command: &ApplicationCommandInteraction) -> BotResult {
    let input = string_option(command, "input").unwrap_or_default();

    let content = pick_word(&input, &mut thread_rng())
        .unwrap_or("You did not provide any words.")
        .to_string();

    reply(ctx, command, content, false).await?;

    Ok(())
}

pub async fn anonymous_message(ctx: &Context, command: &ApplicationCommandInteraction) -> BotResult {
    let message = string_option(command, "message")
        .ok_or_else(|| BotError::from("Missing message option"))?;

    let reference = match string_option(command, "messageid").filter(|id| !id.is_empty()) {
        Some(id) => match id.parse::<u64>() {
            Ok(id) => Some(MessageId(id)),
            Err(_) => {
                reply(ctx, command, "❌ The message id must be a number.", true).await?;
                return Ok(());
            }
        },
        None => None,
    };

    let sent = command
        .channel_id
        .send_message(&ctx.http, |m| {
            m.content(&message);
            if let Some(reference) = reference {
                m.reference_message((command.channel_id, reference));
            }
            m
        })
        .await;

    if let Err(why) = sent {
        error!("Failed to send anonymous message: {why:?}");
        reply(ctx, command, "Failed to send anonymous message. Please try again later.", true).await?;
        return Ok(());
    }

    info!("Anonymous message sent in channel {}", command.channel_id.0);

    let confirmation = match reference {
        Some(reference) => format!("Anonymous message sent: \"{message}\", reply to: {}", reference.0),
        None => format!("Anonymous message sent: \"{message}\""),
    };

    reply(ctx, command, confirmation, true).await?;

    Ok(())
}

pub async fn help(ctx: &Context, command: &ApplicationCommandInteraction) -> BotResult {
    let embeds: Vec<CreateEmbed> = HELP
        .iter()
        .enumerate()
        .map(|(page, category)| help_embed(category, page))
        .collect();

    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.ephemeral(true).add_embeds(embeds))
        })
        .await?;

    Ok(())
}

fn help_embed(category: &HelpCategory, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default();
    embed
        .title(category.title)
        .description(category.description)
        .field("📌 Commands", category.commands.join("\n"), false)
        .footer(|footer| footer.text(format!("📖 Page {} / {}", page + 1, HELP.len())))
        .colour(category.colour);

    embed
}

fn pick_word<'a, R: Rng + ?Sized>(input: &'a str, rng: &mut R) -> Option<&'a str> {
    let words: Vec<&str> = input.split_whitespace().collect();

    words.choose(rng).copied()
}
