use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::AppError;

/// Abbreviations the grammar engine must never rewrite.
static PROTECTED_TERMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(CCG|CL|CM)\b").expect("protected term pattern is valid"));

/// A single suggestion from the grammar engine.
///
/// `offset` and `length` are UTF-16 code units into the checked text.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarMatch {
    pub offset: usize,
    pub length: usize,
    pub message: String,
    pub replacements: Vec<String>,
    pub rule_id: Option<String>,
}

impl GrammarMatch {
    #[cfg(test)]
    pub fn new(offset: usize, length: usize, replacement: &str) -> Self {
        Self {
            offset,
            length,
            message: String::new(),
            replacements: vec![replacement.to_string()],
            rule_id: None,
        }
    }

    fn end(&self) -> usize {
        self.offset + self.length
    }
}

pub trait GrammarChecker: Send + Sync {
    fn check(&self, text: &str) -> impl Future<Output = Result<Vec<GrammarMatch>, AppError>> + Send;

    /// Checks `text` and applies every suggestion that leaves the protected
    /// abbreviations alone.
    fn check_and_correct(&self, text: &str) -> impl Future<Output = Result<String, AppError>> + Send {
        async move {
            let matches = self.check(text).await?;
            let matches = protect_abbreviations(text, matches);
            Ok(apply_matches(text, &matches))
        }
    }
}

/// Drops suggestions whose span touches a whole-word `CCG`, `CL` or `CM`.
pub fn protect_abbreviations(text: &str, matches: Vec<GrammarMatch>) -> Vec<GrammarMatch> {
    let protected: Vec<(usize, usize)> = PROTECTED_TERMS
        .find_iter(text)
        .map(|m| {
            let start = text[..m.start()].encode_utf16().count();
            (start, start + m.as_str().encode_utf16().count())
        })
        .collect();

    if protected.is_empty() {
        return matches;
    }

    matches
        .into_iter()
        .filter(|m| {
            let keep = protected
                .iter()
                .all(|&(start, end)| m.end() <= start || m.offset >= end);
            if !keep {
                debug!("Dropping suggestion at offset {} touching a protected term", m.offset);
            }
            keep
        })
        .collect()
}

/// Applies the first replacement of each suggestion in order.
///
/// Suggestions without replacements are ignored. A suggestion whose target no
/// longer reads as originally flagged (because an earlier one overlapped it)
/// is skipped.
pub fn apply_matches(text: &str, matches: &[GrammarMatch]) -> String {
    let original: Vec<u16> = text.encode_utf16().collect();
    let mut units = original.clone();
    let mut shift: isize = 0;

    for m in matches.iter().filter(|m| !m.replacements.is_empty()) {
        if m.end() > original.len() {
            continue;
        }
        let flagged = &original[m.offset..m.end()];

        let from = m.offset as isize + shift;
        let to = from + m.length as isize;
        if from < 0 || to as usize > units.len() || &units[from as usize..to as usize] != flagged {
            continue;
        }

        debug!(
            "Applying {} at offset {}: {}",
            m.rule_id.as_deref().unwrap_or("unnamed rule"),
            m.offset,
            m.message
        );
        let replacement: Vec<u16> = m.replacements[0].encode_utf16().collect();
        shift += replacement.len() as isize - m.length as isize;
        units.splice(from as usize..to as usize, replacement);
    }

    String::from_utf16_lossy(&units)
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    offset: usize,
    length: usize,
    #[serde(default)]
    message: String,
    #[serde(default)]
    replacements: Vec<RawReplacement>,
    rule: Option<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawReplacement {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
}

impl From<RawMatch> for GrammarMatch {
    fn from(raw: RawMatch) -> Self {
        Self {
            offset: raw.offset,
            length: raw.length,
            message: raw.message,
            replacements: raw.replacements.into_iter().map(|r| r.value).collect(),
            rule_id: raw.rule.map(|r| r.id),
        }
    }
}

/// Client for a LanguageTool server's `/v2/check` endpoint.
#[derive(Debug, Clone)]
pub struct LanguageToolClient {
    client: Client,
    base_url: String,
    language: String,
}

impl LanguageToolClient {
    pub fn new(base_url: &str, language: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::GrammarService(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl GrammarChecker for LanguageToolClient {
    async fn check(&self, text: &str) -> Result<Vec<GrammarMatch>, AppError> {
        let url = format!("{}/v2/check", self.base_url);
        debug!("Checking {} characters against {}", text.chars().count(), url);

        let response = self
            .client
            .post(&url)
            .form(&[("text", text), ("language", self.language.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!("Grammar service unreachable: {}", e);
                AppError::GrammarService(format!("Failed to reach grammar service: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::GrammarService(format!(
                "Grammar service returned status {}",
                response.status()
            )));
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| AppError::GrammarService(format!("Invalid grammar service response: {}", e)))?;

        debug!("Grammar service returned {} matches", body.matches.len());
        Ok(body.matches.into_iter().map(GrammarMatch::from).collect())
    }
}
