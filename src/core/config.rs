//! Run configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by the CLI).

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::imaging::RenderSettings;
use crate::core::pipeline::sentences::SentenceRunConfig;

pub const DEFAULT_CONFIG_FILE: &str = "kotodeck.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub text_model: String,
    pub reasoning_effort: String,
    pub image_prompt_effort: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,

    pub vocab_path: PathBuf,
    pub known_seed_path: PathBuf,
    pub sentences_path: PathBuf,
    pub start_index: usize,
    pub row_limit: Option<usize>,

    pub replicate_api_token: Option<String>,
    pub replicate_base_url: Option<String>,
    pub image_model: String,
    pub aspect_ratio: String,
    pub images_dir: PathBuf,
    pub image_ext: String,
    pub image_start_index: usize,
    pub image_row_limit: Option<usize>,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub render_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_model: "gpt-5-mini".to_string(),
            reasoning_effort: "medium".to_string(),
            image_prompt_effort: "low".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            vocab_path: PathBuf::from("vocab.tsv"),
            known_seed_path: PathBuf::from("known_seed.txt"),
            sentences_path: PathBuf::from("sentences.csv"),
            start_index: 1,
            row_limit: None,
            replicate_api_token: None,
            replicate_base_url: None,
            image_model: "black-forest-labs/flux-schnell".to_string(),
            aspect_ratio: "4:3".to_string(),
            images_dir: PathBuf::from("images"),
            image_ext: "png".to_string(),
            image_start_index: 1,
            image_row_limit: None,
            concurrency: 4,
            poll_interval_ms: 1000,
            render_timeout_secs: 300,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", name, value, e))
}

/// Empty, `0`, `none` or `all` mean "no limit".
fn parse_limit(name: &str, value: &str) -> Result<Option<usize>> {
    match value.trim().to_lowercase().as_str() {
        "" | "0" | "none" | "all" => Ok(None),
        _ => parse_var(name, value).map(Some),
    }
}

impl Config {
    /// Load from an optional TOML file, then apply `lookup` as environment.
    pub fn load<F>(file: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai_base_url = Some(v);
        }
        if let Some(v) = get("REPLICATE_API_TOKEN") {
            self.replicate_api_token = Some(v);
        }
        if let Some(v) = get("REPLICATE_BASE_URL") {
            self.replicate_base_url = Some(v);
        }
        if let Some(v) = get("KOTODECK_TEXT_MODEL") {
            self.text_model = v;
        }
        if let Some(v) = get("KOTODECK_REASONING_EFFORT") {
            self.reasoning_effort = v;
        }
        if let Some(v) = get("KOTODECK_IMAGE_PROMPT_EFFORT") {
            self.image_prompt_effort = v;
        }
        if let Some(v) = get("KOTODECK_VOCAB_PATH") {
            self.vocab_path = PathBuf::from(v);
        }
        if let Some(v) = get("KOTODECK_KNOWN_SEED_PATH") {
            self.known_seed_path = PathBuf::from(v);
        }
        if let Some(v) = get("KOTODECK_SENTENCES_PATH") {
            self.sentences_path = PathBuf::from(v);
        }
        if let Some(v) = get("KOTODECK_START_INDEX") {
            self.start_index = parse_var("KOTODECK_START_INDEX", &v)?;
        }
        if let Some(v) = lookup("KOTODECK_ROW_LIMIT") {
            self.row_limit = parse_limit("KOTODECK_ROW_LIMIT", &v)?;
        }
        if let Some(v) = get("KOTODECK_IMAGE_MODEL") {
            self.image_model = v;
        }
        if let Some(v) = get("KOTODECK_ASPECT_RATIO") {
            self.aspect_ratio = v;
        }
        if let Some(v) = get("KOTODECK_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KOTODECK_IMAGE_EXT") {
            self.image_ext = v.trim_start_matches('.').to_string();
        }
        if let Some(v) = get("KOTODECK_IMAGE_START_INDEX") {
            self.image_start_index = parse_var("KOTODECK_IMAGE_START_INDEX", &v)?;
        }
        if let Some(v) = lookup("KOTODECK_IMAGE_ROW_LIMIT") {
            self.image_row_limit = parse_limit("KOTODECK_IMAGE_ROW_LIMIT", &v)?;
        }
        if let Some(v) = get("KOTODECK_CONCURRENCY") {
            self.concurrency = parse_var("KOTODECK_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("KOTODECK_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_var("KOTODECK_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("KOTODECK_RENDER_TIMEOUT_SECS") {
            self.render_timeout_secs = parse_var("KOTODECK_RENDER_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn sentence_run(&self) -> SentenceRunConfig {
        SentenceRunConfig {
            vocab_path: self.vocab_path.clone(),
            seed_path: self.known_seed_path.clone(),
            output_path: self.sentences_path.clone(),
            start_index: self.start_index,
            limit: self.row_limit,
            image_ext: self.image_ext.clone(),
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            model: self.image_model.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            output_format: self.image_ext.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.render_timeout_secs),
        }
    }

    pub fn require_openai_key(&self) -> Result<String> {
        self.openai_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))
    }

    pub fn require_replicate_token(&self) -> Result<String> {
        self.replicate_api_token
            .clone()
            .ok_or_else(|| anyhow!("REPLICATE_API_TOKEN is not set"))
    }
}

/// Config file to use: the explicit path, `KOTODECK_CONFIG`, or
/// `kotodeck.toml` in the working directory when it exists.
pub fn resolve_config_path<F>(explicit: Option<&Path>, lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = lookup("KOTODECK_CONFIG").filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}
