use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serenity::model::id::GuildId;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::music::MusicError;

type Table = HashMap<GuildId, Vec<String>>;

/// Guild playlists, persisted as `{ "<guildId>": ["url", ...] }` after every change.
pub struct PlaylistStore {
    path: PathBuf,
    playlists: Mutex<Table>,
}

impl PlaylistStore {
    /// Loads the table from `path`. A missing or unreadable file yields an empty table.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let playlists = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match parse_table(&raw) {
                Ok(table) => {
                    info!("Loaded playlists for {} guilds from {}", table.len(), path.display());
                    table
                }
                Err(why) => {
                    error!("Failed to load playlists from {}: {why}", path.display());
                    Table::new()
                }
            },
            Err(why) if why.kind() == ErrorKind::NotFound => Table::new(),
            Err(why) => {
                error!("Failed to read playlists from {}: {why}", path.display());
                Table::new()
            }
        };

        PlaylistStore {
            path,
            playlists: Mutex::new(playlists),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn add_song(&self, guild_id: GuildId, url: &str) -> Result<(), MusicError> {
        self.mutate(|table| table.entry(guild_id).or_default().push(url.to_string()))
            .await
    }

    pub async fn playlist(&self, guild_id: GuildId) -> Vec<String> {
        self.playlists
            .lock()
            .await
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes every occurrence of `url` and returns how many entries were dropped.
    pub async fn remove_song(&self, guild_id: GuildId, url: &str) -> Result<usize, MusicError> {
        self.mutate(|table| {
            let Some(songs) = table.get_mut(&guild_id) else {
                return 0;
            };
            let before = songs.len();
            songs.retain(|song| song != url);
            before - songs.len()
        })
        .await
    }

    /// Drops the first occurrence of a track that just finished playing.
    pub async fn consume(&self, guild_id: GuildId, url: &str) -> Result<bool, MusicError> {
        self.mutate(|table| {
            let Some(songs) = table.get_mut(&guild_id) else {
                return false;
            };
            match songs.iter().position(|song| song == url) {
                Some(index) => {
                    songs.remove(index);
                    true
                }
                None => false,
            }
        })
        .await
    }

    pub async fn clear(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.mutate(|table| {
            if let Some(songs) = table.get_mut(&guild_id) {
                songs.clear();
            }
        })
        .await
    }

    /// Single entry point for every change. The change is applied to a copy, written out while
    /// the lock is held, and only committed once the file is on disk.
    async fn mutate<R>(&self, change: impl FnOnce(&mut Table) -> R) -> Result<R, MusicError> {
        let mut playlists = self.playlists.lock().await;

        let mut updated = playlists.clone();
        let result = change(&mut updated);
        self.persist(&updated).await?;

        *playlists = updated;
        Ok(result)
    }

    async fn persist(&self, table: &Table) -> Result<(), MusicError> {
        let serialized: BTreeMap<String, &Vec<String>> = table
            .iter()
            .map(|(guild_id, songs)| (guild_id.0.to_string(), songs))
            .collect();
        let json = serde_json::to_string(&serialized)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}

fn parse_table(raw: &str) -> Result<Table, serde_json::Error> {
    let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;

    let table = parsed
        .into_iter()
        .filter_map(|(key, songs)| match key.parse::<u64>() {
            Ok(id) => Some((GuildId(id), songs)),
            Err(_) => {
                warn!("Skipping playlist with invalid guild id {key:?}");
                None
            }
        })
        .collect();

    Ok(table)
}
