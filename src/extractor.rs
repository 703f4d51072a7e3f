use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{BotError, BotResult};
use crate::models::{TrackInfo, UNKNOWN_TRACK_TITLE};

const DESCRIPTION_PREVIEW: usize = 200;
const NO_DESCRIPTION: &str = "No description available.";

/// Availability values yt-dlp reports for videos we cannot stream.
const RESTRICTED: [&str; 3] = ["needs_auth", "premium_only", "subscriber_only"];

#[derive(Deserialize)]
struct VideoMetadata {
    title: Option<String>,
    #[serde(rename = "webpage_url")]
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    availability: Option<String>,
    #[serde(rename = "is_live")]
    is_live: Option<bool>,
}

/// Looks up a single video without downloading it.
pub async fn fetch_info(url: &str) -> BotResult<TrackInfo> {
    info!("Getting info for {url}");

    let output = run_ytdlp(&["-j", "--no-playlist", "--skip-download"], url).await?;

    parse_metadata(url, &output)
}

/// Looks `url` up and returns it only when it can be streamed: reachable, not restricted and
/// not live.
pub async fn playable_track(url: &str) -> Option<TrackInfo> {
    match fetch_info(url).await {
        Ok(track) => {
            info!("URL validation for {url}: playable = {}", track.playable);
            track.playable.then_some(track)
        }
        Err(why) => {
            warn!("URL validation failed for {url}: {why}");
            None
        }
    }
}

/// Extracts the audio of `track` as an mp3 inside `dir` and returns the file path.
pub async fn download_audio(track: &TrackInfo, dir: &Path) -> BotResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let stem = safe_file_stem(&track.title);
    let template = dir.join(format!("{stem}.%(ext)s"));
    let template = template.to_string_lossy();

    run_ytdlp(
        &["-x", "--audio-format", "mp3", "--no-playlist", "-o", template.as_ref()],
        &track.url,
    )
    .await?;

    let path = dir.join(format!("{stem}.mp3"));
    if tokio::fs::metadata(&path).await.is_err() {
        return Err(BotError::Extractor {
            url: track.url.clone(),
            reason: format!("expected output {} was not written", path.display()),
        });
    }

    Ok(path)
}

async fn run_ytdlp(args: &[&str], url: &str) -> BotResult<String> {
    let output = Command::new("yt-dlp")
        .args(args)
        .arg(url)
        .output()
        .await
        .map_err(|why| BotError::Extractor {
            url: url.to_string(),
            reason: format!("yt-dlp command failed to start: {why}"),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        error!("yt-dlp exited with {} for {url}: {stderr}", output.status);

        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("unknown error")
            .to_string();

        return Err(BotError::Extractor {
            url: url.to_string(),
            reason,
        });
    }

    String::from_utf8(output.stdout).map_err(|_| BotError::Extractor {
        url: url.to_string(),
        reason: "Error reading stdout".to_string(),
    })
}

fn parse_metadata(url: &str, output: &str) -> BotResult<TrackInfo> {
    let line = output
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| BotError::Extractor {
            url: url.to_string(),
            reason: "no metadata returned".to_string(),
        })?;

    let metadata: VideoMetadata = serde_json::from_str(line)?;

    let restricted = metadata
        .availability
        .as_deref()
        .map_or(false, |availability| RESTRICTED.contains(&availability));
    let playable = !restricted && !metadata.is_live.unwrap_or(false);

    let duration = metadata
        .duration
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64);

    Ok(TrackInfo {
        title: metadata.title.unwrap_or_else(|| UNKNOWN_TRACK_TITLE.to_string()),
        url: metadata.webpage_url.unwrap_or_else(|| url.to_string()),
        thumbnail: metadata.thumbnail,
        description: metadata.description,
        duration,
        uploader: metadata.uploader,
        playable,
    })
}

/// First 200 characters of the description followed by `...`.
pub fn short_description(description: Option<&str>) -> String {
    match description {
        Some(text) => {
            let preview: String = text.chars().take(DESCRIPTION_PREVIEW).collect();
            format!("{preview}...")
        }
        None => NO_DESCRIPTION.to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();

    format!("{} min {} sec", seconds / 60, seconds % 60)
}

/// Replaces everything outside `[A-Za-z0-9_-]` with `_`.
pub fn safe_file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
