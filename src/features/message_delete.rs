use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::{error, info};

use crate::error::{BotError, BotResult};

pub const BATCH_SIZE: u64 = 100;
const BATCH_DELAY: Duration = Duration::from_millis(500);
/// Discord refuses to bulk delete anything older than two weeks.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

/// A message as seen by the deleter: its id and creation time in unix seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub created_at: i64,
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Newest first, at most `limit`.
    async fn recent(&self, limit: u64) -> BotResult<Vec<StoredMessage>>;

    async fn bulk_delete(&self, ids: &[MessageId]) -> BotResult;

    async fn delete(&self, id: MessageId) -> BotResult;
}

pub struct DiscordChannel {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        DiscordChannel { http, channel_id }
    }
}

#[async_trait]
impl MessageChannel for DiscordChannel {
    async fn recent(&self, limit: u64) -> BotResult<Vec<StoredMessage>> {
        let messages = self.channel_id.messages(&self.http, |b| b.limit(limit)).await?;

        Ok(messages
            .into_iter()
            .map(|message| StoredMessage {
                id: message.id,
                created_at: message.timestamp.unix_timestamp(),
            })
            .collect())
    }

    async fn bulk_delete(&self, ids: &[MessageId]) -> BotResult {
        match ids {
            [] => {}
            [id] => self.channel_id.delete_message(&self.http, *id).await?,
            _ => self.channel_id.delete_messages(&self.http, ids).await?,
        }

        Ok(())
    }

    async fn delete(&self, id: MessageId) -> BotResult {
        self.channel_id.delete_message(&self.http, id).await?;

        Ok(())
    }
}

/// Deletes recent messages, in one bulk call when possible or in paced batches otherwise.
pub struct MessageDeleter<C> {
    channel: C,
    batch_delay: Duration,
}

impl<C: MessageChannel> MessageDeleter<C> {
    pub fn new(channel: C) -> Self {
        MessageDeleter {
            channel,
            batch_delay: BATCH_DELAY,
        }
    }

    /// Returns how many messages were removed.
    pub async fn delete_messages(&self, count: u64, large_range: bool, now: i64) -> usize {
        if large_range || count > BATCH_SIZE {
            info!("🔄 Performing multiple batch deletes...");
            return self.batched_delete(count).await;
        }

        self.simple_delete(count, now).await
    }

    async fn simple_delete(&self, count: u64, now: i64) -> usize {
        let result = async {
            let messages = self.channel.recent(count).await?;
            let ids: Vec<MessageId> = messages
                .into_iter()
                .filter(|message| now - message.created_at < BULK_DELETE_MAX_AGE_SECS)
                .map(|message| message.id)
                .collect();

            self.channel.bulk_delete(&ids).await?;

            Ok::<usize, BotError>(ids.len())
        }
        .await;

        match result {
            Ok(deleted) => {
                info!("✅ Successfully deleted {deleted} messages.");
                deleted
            }
            Err(why) => {
                error!("❌ Error in simple delete: {why}");
                0
            }
        }
    }

    async fn batched_delete(&self, count: u64) -> usize {
        let mut remaining = count;
        let mut deleted = 0;

        while remaining > 0 {
            let messages = match self.channel.recent(remaining.min(BATCH_SIZE)).await {
                Ok(messages) => messages,
                Err(why) => {
                    error!("❌ Error during batch deletion: {why}");
                    break;
                }
            };

            if messages.is_empty() {
                break;
            }

            info!("🗑️ Deleting {} messages in batch...", messages.len());

            for message in &messages {
                match self.channel.delete(message.id).await {
                    Ok(()) => deleted += 1,
                    Err(why) => error!("Failed to delete message {}: {why}", message.id.0),
                }
            }

            remaining = remaining.saturating_sub(messages.len() as u64);

            if remaining > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        deleted
    }
}

pub fn summary(deleted: usize) -> String {
    if deleted > 0 {
        format!("✅ Successfully deleted {deleted} messages.")
    } else {
        "⚠️ No messages were deleted.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 24 * 60 * 60;

    /// Newest message first, like the Discord API.
    struct FakeChannel {
        messages: Mutex<Vec<StoredMessage>>,
        fetches: Mutex<Vec<u64>>,
        bulk_calls: Mutex<usize>,
    }

    impl FakeChannel {
        fn with_ages(ages_in_days: &[i64]) -> Self {
            let messages = ages_in_days
                .iter()
                .enumerate()
                .map(|(i, age)| StoredMessage {
                    id: MessageId(i as u64 + 1),
                    created_at: NOW - age * DAY,
                })
                .collect();

            FakeChannel {
                messages: Mutex::new(messages),
                fetches: Mutex::new(Vec::new()),
                bulk_calls: Mutex::new(0),
            }
        }

        fn remaining(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageChannel for FakeChannel {
        async fn recent(&self, limit: u64) -> BotResult<Vec<StoredMessage>> {
            self.fetches.lock().unwrap().push(limit);
            let messages = self.messages.lock().unwrap();
            Ok(messages.iter().take(limit as usize).copied().collect())
        }

        async fn bulk_delete(&self, ids: &[MessageId]) -> BotResult {
            *self.bulk_calls.lock().unwrap() += 1;
            self.messages.lock().unwrap().retain(|m| !ids.contains(&m.id));
            Ok(())
        }

        async fn delete(&self, id: MessageId) -> BotResult {
            self.messages.lock().unwrap().retain(|m| m.id != id);
            Ok(())
        }
    }

    fn deleter(channel: FakeChannel) -> MessageDeleter<FakeChannel> {
        MessageDeleter {
            channel,
            batch_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_simple_delete_skips_messages_older_than_two_weeks() {
        // Arrange
        let deleter = deleter(FakeChannel::with_ages(&[0, 1, 20, 30]));

        // Act
        let deleted = deleter.delete_messages(4, false, NOW).await;

        // Assert
        assert_eq!(deleted, 2);
        assert_eq!(*deleter.channel.bulk_calls.lock().unwrap(), 1);
        assert_eq!(deleter.channel.remaining(), 2);
    }

    #[tokio::test]
    async fn test_large_range_deletes_old_messages_one_by_one() {
        let deleter = deleter(FakeChannel::with_ages(&[0, 20, 30]));

        let deleted = deleter.delete_messages(3, true, NOW).await;

        assert_eq!(deleted, 3);
        assert_eq!(*deleter.channel.bulk_calls.lock().unwrap(), 0);
        assert_eq!(deleter.channel.remaining(), 0);
    }

    #[tokio::test]
    async fn test_more_than_a_batch_is_split() {
        let deleter = deleter(FakeChannel::with_ages(&[0; 250]));

        let deleted = deleter.delete_messages(230, false, NOW).await;

        assert_eq!(deleted, 230);
        assert_eq!(*deleter.channel.fetches.lock().unwrap(), vec![100, 100, 30]);
        assert_eq!(deleter.channel.remaining(), 20);
    }

    #[tokio::test]
    async fn test_batches_stop_when_the_channel_runs_dry() {
        let deleter = deleter(FakeChannel::with_ages(&[0; 5]));

        let deleted = deleter.delete_messages(500, true, NOW).await;

        assert_eq!(deleted, 5);
        assert_eq!(deleter.channel.remaining(), 0);
    }

    #[test]
    fn test_summary() {
        assert_eq!(summary(3), "✅ Successfully deleted 3 messages.");
        assert_eq!(summary(0), "⚠️ No messages were deleted.");
    }
}
