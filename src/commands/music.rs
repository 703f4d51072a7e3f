use serenity::{
    builder::{CreateApplicationCommands, CreateEmbed},
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::ApplicationCommandInteraction,
    },
};
use tracing::{error, info, warn};

use super::{check_msg, defer, edit_reply, guild_id, reply, string_option, user_voice_channel};
use crate::error::{BotError, BotResult};
use crate::extractor;
use crate::handler::Handler;
use crate::models::TrackInfo;
use crate::music::{MusicError, PlaybackState, StopBehavior};

/// Discord caps an embed at 25 fields.
const PLAYLIST_DISPLAY_LIMIT: usize = 25;
const EMBED_COLOUR: u32 = 0xFF0000;

const JOIN_VOICE_FIRST: &str = "❌ Please join a voice channel first!";
const PLAYLIST_EMPTY: &str = "🎵 The playlist is currently empty. Please add some songs first!";
const PLAYBACK_FAILED: &str = "❌ Unable to play the song, please try again later.";
const NOTHING_PLAYING: &str = "❌ No songs are currently playing, the playlist is empty.";

pub fn register(commands: &mut CreateApplicationCommands) -> &mut CreateApplicationCommands {
    commands
        .create_application_command(|command| {
            command
                .name("music_add")
                .description("Add a YouTube video to the playlist")
                .dm_permission(false)
                .create_option(|option| {
                    option
                        .name("url")
                        .description("YouTube video URL")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
        })
        .create_application_command(|command| {
            command
                .name("music_play")
                .description("Play the playlist in your voice channel")
                .dm_permission(false)
        })
        .create_application_command(|command| {
            command
                .name("music_showplaylist")
                .description("Show the songs in the playlist")
                .dm_permission(false)
        })
        .create_application_command(|command| {
            command
                .name("music_remove")
                .description("Remove a song from the playlist")
                .dm_permission(false)
                .create_option(|option| {
                    option
                        .name("url")
                        .description("URL of the song to remove")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
        })
        .create_application_command(|command| {
            command
                .name("music_skip")
                .description("Skip to the next song")
                .dm_permission(false)
        })
        .create_application_command(|command| {
            command
                .name("music_stop")
                .description("Stop playback and leave the voice channel")
                .dm_permission(false)
        })
}

pub async fn add(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;
    let url = string_option(command, "url").ok_or_else(|| BotError::from("Missing url option"))?;

    defer(ctx, command, false).await?;

    let track = match extractor::playable_track(&url).await {
        Some(track) => track,
        None => {
            let content = format!("The provided URL \"{url}\" is not a valid YouTube video.");
            edit_reply(ctx, command, content).await?;
            return Ok(());
        }
    };

    handler.music.add_song(guild_id, &url).await?;
    info!("Added {url} to the playlist of guild {}", guild_id.0);

    let embed = track_embed(&track, extractor::short_description(track.description.as_deref()));

    command
        .edit_original_interaction_response(&ctx.http, |response| {
            response.content("✅ Song added to the playlist!").set_embed(embed)
        })
        .await?;

    Ok(())
}

pub async fn play(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;

    let voice_channel = match user_voice_channel(ctx, command) {
        Some(channel) => channel,
        None => {
            reply(ctx, command, JOIN_VOICE_FIRST, true).await?;
            return Ok(());
        }
    };

    if handler.music.playlist(guild_id).await.is_empty() {
        reply(ctx, command, PLAYLIST_EMPTY, false).await?;
        return Ok(());
    }

    defer(ctx, command, false).await?;

    let content = match handler.music.play(guild_id, voice_channel, command.channel_id).await {
        Ok(url) => format!("🎶 Now playing: {url}"),
        Err(MusicError::AlreadyPlaying) => {
            "🎵 Music is already playing. Use /music_skip or /music_stop.".to_string()
        }
        Err(MusicError::EmptyPlaylist) => PLAYLIST_EMPTY.to_string(),
        Err(MusicError::Cancelled) => "⏹️ Playback was stopped before it started.".to_string(),
        Err(why) => {
            error!("Error playing music in guild {}: {why}", guild_id.0);
            PLAYBACK_FAILED.to_string()
        }
    };

    edit_reply(ctx, command, content).await?;

    Ok(())
}

pub async fn show_playlist(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;
    let playlist = handler.music.playlist(guild_id).await;

    if playlist.is_empty() {
        reply(ctx, command, "🎵 The playlist is currently empty!", false).await?;
        return Ok(());
    }

    defer(ctx, command, false).await?;

    let lookups: Vec<_> = playlist
        .iter()
        .take(PLAYLIST_DISPLAY_LIMIT)
        .cloned()
        .map(|url| {
            tokio::spawn(async move {
                let info = extractor::fetch_info(&url).await;
                (url, info)
            })
        })
        .collect();

    let mut fields = Vec::with_capacity(lookups.len());
    let mut thumbnail = None;

    for (index, lookup) in lookups.into_iter().enumerate() {
        let track = match lookup.await {
            Ok((_, Ok(track))) => Some(track),
            Ok((url, Err(why))) => {
                warn!("Could not look up {url}: {why}");
                None
            }
            Err(why) => {
                error!("Playlist lookup task failed: {why}");
                None
            }
        };

        if thumbnail.is_none() {
            thumbnail = track.as_ref().and_then(|track| track.thumbnail.clone());
        }

        fields.push(playlist_field(index, track.as_ref()));
    }

    let mut embed = CreateEmbed::default();
    embed
        .title("🎶 Current playlist")
        .colour(EMBED_COLOUR)
        .fields(fields.into_iter().map(|(name, value)| (name, value, false)));

    if let Some(thumbnail) = thumbnail {
        embed.thumbnail(thumbnail);
    }

    if playlist.len() > PLAYLIST_DISPLAY_LIMIT {
        let hidden = playlist.len() - PLAYLIST_DISPLAY_LIMIT;
        embed.footer(|footer| footer.text(format!("⚠️ More songs... {hidden} not shown")));
    }

    command
        .edit_original_interaction_response(&ctx.http, |response| response.set_embed(embed))
        .await?;

    Ok(())
}

pub async fn remove(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;
    let url = string_option(command, "url").ok_or_else(|| BotError::from("Missing url option"))?;

    if !handler.music.playlist(guild_id).await.contains(&url) {
        reply(ctx, command, format!("❌ The song URL ({url}) is not in the playlist."), false).await?;
        return Ok(());
    }

    defer(ctx, command, false).await?;

    let removed = handler.music.remove_song(guild_id, &url).await?;
    info!("Removed {removed} entries of {url} from guild {}", guild_id.0);

    match extractor::fetch_info(&url).await {
        Ok(track) => {
            let embed = track_embed(&track, format!("[Click to open]({})", track.url));

            command
                .edit_original_interaction_response(&ctx.http, |response| {
                    response
                        .content("✅ The song has been successfully removed from the playlist!")
                        .set_embed(embed)
                })
                .await?;
        }
        Err(why) => {
            warn!("Could not look up removed song {url}: {why}");
            let content = format!("🎵 The song has been successfully removed from the playlist: {url}");
            check_msg(edit_reply(ctx, command, content).await);
        }
    }

    Ok(())
}

pub async fn skip(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;

    if handler.music.state(guild_id).await == PlaybackState::Idle
        && handler.music.playlist(guild_id).await.is_empty()
    {
        reply(ctx, command, NOTHING_PLAYING, false).await?;
        return Ok(());
    }

    defer(ctx, command, false).await?;

    let content = match handler.music.skip(guild_id).await {
        Ok(Some(next)) => format!("⏭️ Skipped to the next song: {next}"),
        Ok(None) => "⏹️ Skipped. The playlist is now empty.".to_string(),
        Err(MusicError::NotPlaying) => "❌ Nothing is playing right now. Use /music_play to start.".to_string(),
        Err(why) => {
            error!("Error skipping in guild {}: {why}", guild_id.0);
            PLAYBACK_FAILED.to_string()
        }
    };

    edit_reply(ctx, command, content).await?;

    Ok(())
}

pub async fn stop(
    handler: &Handler,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> BotResult {
    let guild_id = guild_id(command)?;

    if handler.music.state(guild_id).await == PlaybackState::Idle
        && handler.music.playlist(guild_id).await.is_empty()
    {
        reply(ctx, command, NOTHING_PLAYING, false).await?;
        return Ok(());
    }

    defer(ctx, command, false).await?;

    handler.music.stop(guild_id).await?;

    edit_reply(ctx, command, stop_message(handler.music.stop_behavior())).await?;

    Ok(())
}

fn stop_message(behavior: StopBehavior) -> &'static str {
    match behavior {
        StopBehavior::ClearPlaylist => "⏹️ Playback has been stopped and the playlist has been cleared.",
        StopBehavior::KeepPlaylist => "⏹️ Playback has been stopped. The playlist was kept.",
    }
}

fn track_embed(track: &TrackInfo, description: String) -> CreateEmbed {
    let mut embed = CreateEmbed::default();
    embed
        .title(&track.title)
        .url(&track.url)
        .description(description)
        .colour(EMBED_COLOUR);

    if let Some(thumbnail) = &track.thumbnail {
        embed.thumbnail(thumbnail);
    }

    embed
}

fn playlist_field(index: usize, track: Option<&TrackInfo>) -> (String, String) {
    match track {
        Some(track) => (
            format!("{}. {}", index + 1, track.title),
            format!("[Click to open]({})", track.url),
        ),
        None => (
            "⚠️ Error".to_string(),
            format!("{}. Unable to fetch song information.", index + 1),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_field_numbers_from_one() {
        // Arrange
        let track = TrackInfo {
            title: "Song".to_string(),
            url: "https://youtu.be/abc".to_string(),
            thumbnail: None,
            description: None,
            duration: None,
            uploader: None,
            playable: true,
        };

        // Act
        let field = playlist_field(0, Some(&track));

        // Assert
        assert_eq!(field.0, "1. Song");
        assert_eq!(field.1, "[Click to open](https://youtu.be/abc)");
    }

    #[test]
    fn test_failed_lookups_become_error_fields() {
        let field = playlist_field(2, None);

        assert_eq!(field.0, "⚠️ Error");
        assert!(field.1.starts_with("3."));
    }

    #[test]
    fn test_stop_message_reflects_the_behavior() {
        assert!(stop_message(StopBehavior::ClearPlaylist).contains("cleared"));
        assert!(stop_message(StopBehavior::KeepPlaylist).contains("kept"));
    }
}
