use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LANGUAGETOOL_URL: &str = "https://api.languagetool.org";
const DEFAULT_LANGUAGE: &str = "en-US";

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub languagetool_url: String,
    pub language: String,
    pub grammar_timeout: Duration,
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            languagetool_url: DEFAULT_LANGUAGETOOL_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            grammar_timeout: Duration::from_secs(30),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            bind_addr: parse_var(&lookup, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            languagetool_url: lookup("LANGUAGETOOL_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.languagetool_url),
            language: lookup("LANGUAGETOOL_LANGUAGE").unwrap_or(defaults.language),
            grammar_timeout: parse_var::<u64, _>(&lookup, "GRAMMAR_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.grammar_timeout),
            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE")?.unwrap_or(defaults.max_file_size),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("Failed to parse {}={}", key, raw)))
        .transpose()
}

pub fn load_config() -> Result<Config> {
    Config::new()
}
