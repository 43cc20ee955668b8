use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_CATALOG_URL: &str = "https://www.biblegateway.com/versions/{version}/";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Where to scrape from and where artifacts live.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub catalog_url_template: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Config {
            catalog_url_template: non_empty(lookup("BIBLE_CATALOG_URL"))
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            data_dir: non_empty(lookup("DATA_DIR"))
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
        }
    }

    pub fn catalog_url(&self, version: &str) -> String {
        self.catalog_url_template.replace("{version}", version)
    }
}

/// Credentials and endpoint for the destination database.
#[derive(Clone, PartialEq)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_url: String,
    pub notion_version: String,
}

impl NotionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            non_empty(lookup(key)).ok_or_else(|| anyhow!("{} environment variable must be set", key))
        };
        Ok(NotionConfig {
            token: required("NOTION_TOKEN")?,
            database_id: required("NOTION_DATABASE_ID")?,
            api_url: non_empty(lookup("NOTION_API_URL"))
                .unwrap_or_else(|| DEFAULT_NOTION_API_URL.to_string()),
            notion_version: non_empty(lookup("NOTION_VERSION"))
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
        })
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("token", &"***")
            .field("database_id", &self.database_id)
            .field("api_url", &self.api_url)
            .field("notion_version", &self.notion_version)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
