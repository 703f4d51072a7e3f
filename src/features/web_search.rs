use serde::Deserialize;
use tracing::{error, info, warn};

use super::ai_chat::Gemini;
use crate::config::SearchConfig;
use crate::error::BotResult;
use crate::models::SearchResult;

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
const RESULT_COUNT: u8 = 5;

const NOTHING_FOUND: &str = "Sorry, I could not find anything relevant.";
const NOTHING_USEFUL: &str = "Sorry, I could not produce a useful answer from the search results.";
const FILTER_FAILED: &str = "Sorry, something went wrong while sifting through the results.";

#[derive(Deserialize)]
struct SearchResponse {
    items: Option<Vec<SearchResult>>,
}

/// Google Custom Search, condensed by a second model call.
pub struct WebSearch {
    http: reqwest::Client,
    config: SearchConfig,
}

impl WebSearch {
    pub fn new(http: reqwest::Client, config: SearchConfig) -> Self {
        WebSearch { http, config }
    }

    /// Searches for `question` and returns a short summary of the most relevant results.
    pub async fn search_and_summarize(&self, gemini: &Gemini, question: &str) -> String {
        let results = match self.search(question).await {
            Ok(results) => results,
            Err(why) => {
                error!("❌ Web search failed: {why}");
                Vec::new()
            }
        };

        if results.is_empty() {
            return NOTHING_FOUND.to_string();
        }

        info!("🔍 {} search results for: {question}", results.len());

        match gemini.generate(&filter_prompt(question, &results)).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                warn!("⚠️ Search summary was empty");
                NOTHING_USEFUL.to_string()
            }
            Err(why) => {
                error!("❌ Search summary failed: {why}");
                FILTER_FAILED.to_string()
            }
        }
    }

    async fn search(&self, query: &str) -> BotResult<Vec<SearchResult>> {
        let count = RESULT_COUNT.to_string();

        let response: SearchResponse = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.engine_id.as_str()),
                ("q", query),
                ("num", count.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.items.unwrap_or_default())
    }
}

pub fn filter_prompt(question: &str, results: &[SearchResult]) -> String {
    let listing = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "{}. Title: {}\nSnippet: {}\nLink: {}",
                i + 1,
                result.title,
                result.snippet,
                result.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a careful research assistant. From the search results below, pick the information \
most relevant to the user's question and answer concisely. Leave out anything unrelated.\n\n\
User question:\n{question}\n\nSearch results:\n{listing}\n\nGive a short, useful summary:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prompt_numbers_the_results() {
        let results = vec![
            SearchResult {
                title: "BTC hits high".to_string(),
                snippet: "Bitcoin rose".to_string(),
                link: "https://news/1".to_string(),
            },
            SearchResult {
                title: "Markets".to_string(),
                snippet: String::new(),
                link: "https://news/2".to_string(),
            },
        ];

        let prompt = filter_prompt("bitcoin price today", &results);

        assert!(prompt.contains("User question:\nbitcoin price today"));
        assert!(prompt.contains("1. Title: BTC hits high\nSnippet: Bitcoin rose\nLink: https://news/1"));
        assert!(prompt.contains("2. Title: Markets"));
    }

    #[test]
    fn test_search_response_without_items() {
        let response: SearchResponse = serde_json::from_str(r#"{"kind":"customsearch#search"}"#).unwrap();

        assert!(response.items.is_none());
    }
}
