use std::path::Path;

use serenity::{
    builder::CreateApplicationCommands,
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::ApplicationCommandInteraction,
    },
};
use tracing::{error, info, warn};

use super::{defer, edit_reply, string_option};
use crate::error::{BotError, BotResult};
use crate::extractor;
use crate::handler::Handler;
use crate::models::TrackInfo;

/// Upload limit for bots in servers without boosts.
const MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;
const EMBED_COLOUR: u32 = 0x00FF00;
const DOWNLOAD_FAILED: &str =
    "❌ An error occurred while downloading or uploading the video, please try again later.";

pub fn register(commands: &mut CreateApplicationCommands) -> &mut CreateApplicationCommands {
    commands.create_application_command(|command| {
        command
            .name("download_video")
            .description("Download the audio of a YouTube video as mp3")
            .create_option(|option| {
                option
                    .name("url")
                    .description("YouTube video URL")
                    .kind(CommandOptionType::String)
                    .required(true)
            })
    })
}

pub async fn download_video(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let url = string_option(command, "url").ok_or_else(|| BotError::from("Missing url option"))?;

    defer(ctx, command, false).await?;

    let track = match extractor::fetch_info(&url).await {
        Ok(track) => track,
        Err(why) => {
            warn!("Unable to retrieve video information for {url}: {why}");
            edit_reply(ctx, command, format!("❌ Unable to retrieve video information: {url}")).await?;
            return Ok(());
        }
    };

    edit_reply(ctx, command, format!("⬇️ Downloading **{}**...", track.title)).await?;

    let path = match extractor::download_audio(&track, &handler.config.download_dir).await {
        Ok(path) => path,
        Err(why) => {
            error!("Download failed for {url}: {why}");
            edit_reply(ctx, command, DOWNLOAD_FAILED).await?;
            return Ok(());
        }
    };

    let result = upload(ctx, command, &track, &path).await;

    if let Err(why) = tokio::fs::remove_file(&path).await {
        warn!("Could not delete {}: {why}", path.display());
    }

    if let Err(why) = result {
        error!("Upload failed for {url}: {why}");
        edit_reply(ctx, command, DOWNLOAD_FAILED).await?;
    }

    Ok(())
}

async fn upload(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    track: &TrackInfo,
    path: &Path,
) -> BotResult {
    let size = tokio::fs::metadata(path).await?.len();

    if size > MAX_UPLOAD_BYTES {
        info!("{} is too large to upload ({size} bytes)", path.display());
        edit_reply(ctx, command, too_large_message(size)).await?;
        return Ok(());
    }

    let description = track_details(track);

    command
        .create_followup_message(&ctx.http, |message| {
            message.add_file(path).embed(|embed| {
                embed
                    .title(&track.title)
                    .url(&track.url)
                    .description(&description)
                    .colour(EMBED_COLOUR)
                    .footer(|footer| footer.text("Thank you for using our music bot!"));

                if let Some(thumbnail) = &track.thumbnail {
                    embed.thumbnail(thumbnail);
                }

                embed
            })
        })
        .await?;

    edit_reply(ctx, command, format!("✅ Download complete: **{}**", track.title)).await?;
    info!("Uploaded {} for {}", path.display(), command.user.tag());

    Ok(())
}

fn track_details(track: &TrackInfo) -> String {
    let uploader = track.uploader.as_deref().unwrap_or("Unknown");
    let duration = track
        .duration
        .map(extractor::format_duration)
        .unwrap_or_else(|| "Unknown".to_string());

    format!("**Author**: {uploader}\n**Duration**: {duration}")
}

fn too_large_message(size: u64) -> String {
    let megabytes = size as f64 / (1024.0 * 1024.0);

    format!("❌ File too large ({megabytes:.2} MB), it exceeds Discord's upload limit.")
}
