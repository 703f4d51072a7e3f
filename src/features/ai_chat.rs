use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serenity::client::Context;
use serenity::model::channel::Message;
use tracing::{debug, error, info, warn};

use super::web_search::WebSearch;
use crate::config::AiConfig;
use crate::error::{BotError, BotResult};
use crate::models::ConversationEntry;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DISCORD_MESSAGE_LIMIT: usize = 2000;

const THINKING: &str = "💬 Thinking about what you said…";
const APOLOGY: &str = "❌ I ran into a little problem, please try again later!";

const SEARCH_KEYWORDS: [&str; 21] = [
    "最新", "現在", "今日", "今天", "新聞", "發生什麼", "價格", "時間", "比特幣", "天氣", "發展", "現況",
    "latest", "today", "news", "price", "weather", "bitcoin", "right now", "what happened", "current",
];

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Thin client for the `generateContent` REST endpoint.
pub struct Gemini {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl Gemini {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Gemini { http, api_key, model }
    }

    pub async fn generate(&self, prompt: &str) -> BotResult<String> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self
            .http
            .post(format!("{GEMINI_URL}/{}:generateContent", self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.text())
    }
}

/// One JSON history file per user under the memory directory.
pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MemoryStore { dir: dir.into() }
    }

    pub fn path_for(&self, user_id: &str, user_name: &str) -> PathBuf {
        self.dir.join(format!("{user_id}_{}.json", safe_user_name(user_name)))
    }

    /// Missing or unreadable history starts a fresh conversation.
    pub async fn load(&self, user_id: &str, user_name: &str) -> Vec<ConversationEntry> {
        let path = self.path_for(user_id, user_name);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };

        serde_json::from_str(&raw).unwrap_or_else(|why| {
            error!("Error reading memory file {}: {why}", path.display());
            Vec::new()
        })
    }

    pub async fn save(
        &self,
        user_id: &str,
        user_name: &str,
        history: &[ConversationEntry],
    ) -> BotResult {
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_string_pretty(history)?;
        tokio::fs::write(self.path_for(user_id, user_name), json).await?;

        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Direct-message companion backed by Gemini, with optional web search.
pub struct AiChat {
    gemini: Gemini,
    search: Option<WebSearch>,
    memory: MemoryStore,
    persona: String,
}

impl AiChat {
    pub fn new(config: AiConfig, memory_dir: PathBuf) -> BotResult<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let search = config
            .search
            .map(|search| WebSearch::new(http.clone(), search));

        Ok(AiChat {
            gemini: Gemini::new(http, config.api_key, config.model),
            search,
            memory: MemoryStore::new(memory_dir),
            persona: config.persona,
        })
    }

    /// Handles a direct message: placeholder first, then the answer edited in.
    pub async fn handle_direct_message(&self, ctx: &Context, msg: &Message) {
        if msg.author.bot || msg.guild_id.is_some() {
            return;
        }

        let question = msg.content.trim();
        if question.is_empty() {
            warn!("⚠️ Empty direct message from {}", msg.author.name);
            return;
        }

        info!("💌 Direct message from {} ({})", msg.author.name, msg.author.id.0);

        let placeholder = match msg.channel_id.say(&ctx.http, THINKING).await {
            Ok(placeholder) => Some(placeholder),
            Err(why) => {
                error!("❌ Could not send the typing placeholder: {why:?}");
                None
            }
        };

        let user_id = msg.author.id.0.to_string();
        let reply = match self.ask(&user_id, &msg.author.name, question).await {
            Ok(reply) => truncate_for_discord(&reply),
            Err(why) => {
                error!("❌ Gemini API error: {why}");
                APOLOGY.to_string()
            }
        };

        let delivered = match placeholder {
            Some(mut placeholder) => placeholder.edit(ctx, |m| m.content(&reply)).await,
            None => msg.channel_id.say(&ctx.http, &reply).await.map(|_| ()),
        };

        if let Err(why) = delivered {
            error!("❌ Failed to deliver the reply: {why:?}");
        }
    }

    pub async fn ask(&self, user_id: &str, user_name: &str, question: &str) -> BotResult<String> {
        let mut history = self.memory.load(user_id, user_name).await;
        info!("🧠 Loaded {} history entries for {user_name}", history.len());

        let search_info = match &self.search {
            Some(search) if needs_web_search(question) => {
                info!("🔍 Web search enabled for question: {question}");
                Some(search.search_and_summarize(&self.gemini, question).await)
            }
            _ => None,
        };

        let prompt = build_prompt(&self.persona, search_info.as_deref(), &history, user_name, question);
        debug!("📝 Prompt starts with: {}", prompt.chars().take(200).collect::<String>());

        let reply = self.gemini.generate(&prompt).await?;
        let reply = reply.trim();

        if reply.is_empty() {
            return Err(BotError::EmptyCompletion);
        }

        history.push(ConversationEntry {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            user: question.to_string(),
            ai: reply.to_string(),
        });

        if let Err(why) = self.memory.save(user_id, user_name, &history).await {
            error!("Error saving memory in {}: {why}", self.memory.dir().display());
        }

        Ok(reply.to_string())
    }
}

pub fn needs_web_search(question: &str) -> bool {
    let lowered = question.to_lowercase();

    SEARCH_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Whitespace becomes `_`, then anything outside `[A-Za-z0-9_-]` is dropped.
pub fn safe_user_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}

pub fn build_prompt(
    persona: &str,
    search_info: Option<&str>,
    history: &[ConversationEntry],
    user_name: &str,
    question: &str,
) -> String {
    let mut prompt = format!("{persona}\n\n");

    if let Some(info) = search_info {
        prompt.push_str(&format!(
            "(Information you just looked up, for reference only. Base your answer on it.)\n{info}\n\n"
        ));
    }

    prompt.push_str("Conversation history:\n");
    for entry in history {
        prompt.push_str(&format!("{}: {}\nYou: {}\n", entry.user_name, entry.user, entry.ai));
    }

    prompt.push_str(&format!("\nUser {user_name}: {question}\n"));

    prompt
}

fn truncate_for_discord(reply: &str) -> String {
    if reply.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return reply.to_string();
    }

    let mut truncated: String = reply.chars().take(DISCORD_MESSAGE_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}
