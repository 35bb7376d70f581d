use std::sync::Arc;
use std::time::Duration;

use crate::services::{providers::CompletionProvider, with_timeout};

/// Number of titles asked of the model
pub const REQUESTED_TITLES: usize = 15;

/// Asks a language model for titles based on a user's taste
#[derive(Clone)]
pub struct GenerativeRecommender {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl GenerativeRecommender {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Raw title suggestions. Empty when the provider fails or times out.
    pub async fn recommend(&self, favorites: &[String], history: &[String]) -> Vec<String> {
        let prompt = build_prompt(favorites, history);

        let response = match with_timeout(
            self.provider.name(),
            self.timeout,
            self.provider.complete(&prompt),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    provider = self.provider.name(),
                    "Generative recommendations unavailable"
                );
                return Vec::new();
            }
        };

        let titles = parse_titles(&response);
        tracing::info!(
            count = titles.len(),
            provider = self.provider.name(),
            "Parsed generative recommendations"
        );
        titles
    }
}

pub fn build_prompt(favorites: &[String], history: &[String]) -> String {
    let favorites = if favorites.is_empty() {
        "none yet".to_string()
    } else {
        favorites.join(", ")
    };
    let history = if history.is_empty() {
        "none yet".to_string()
    } else {
        history.join(", ")
    };

    format!(
        "My favorite movies are: {favorites}. \
         Movies I watched recently: {history}. \
         Please recommend exactly {REQUESTED_TITLES} movies I might enjoy, giving my favorites \
         more weight than my watch history. List only the original title of each individual \
         film, one per line, in bullet or numbered form. Be as precise as possible with each \
         title and never name a franchise, trilogy or collection (for example, write each \
         Lord of the Rings film separately, not \"The Lord of the Rings Trilogy\")."
    )
}

/// Extracts one title per non-blank line of a free-text answer
///
/// Leading enumeration (`3.`, `3)`, `-`, `*`, `•`) and surrounding quotes are
/// stripped. Header lines ending in a colon are dropped.
pub fn parse_titles(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(strip_enumeration)
        .map(|line| line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '*')).trim())
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_enumeration(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
        return line;
    }

    line.strip_prefix(['-', '*', '•'])
        .map(str::trim_start)
        .unwrap_or(line)
}
