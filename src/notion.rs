use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::batcher::{Block, CreateRequest};
use crate::config::NotionConfig;
use crate::delivery::PageSink;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 300;

/// Creates one database page per request through the Notion REST API.
pub struct NotionClient {
    http: reqwest::Client,
    config: NotionConfig,
}

impl NotionClient {
    pub fn new(config: NotionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(NotionClient { http, config })
    }

    fn pages_url(&self) -> String {
        format!("{}/pages", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PageSink for NotionClient {
    async fn create_page(&self, request: &CreateRequest) -> Result<()> {
        let transient = |reason: String| Error::TransientDelivery {
            title: request.title.clone(),
            reason,
        };

        let response = self
            .http
            .post(self.pages_url())
            .bearer_auth(&self.config.token)
            .header("Notion-Version", &self.config.notion_version)
            .json(&page_body(&self.config.database_id, request))
            .send()
            .await
            .map_err(|e| transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        Err(transient(format!("HTTP {}: {}", status, body)))
    }
}

/// The JSON body of a "create page" call.
pub fn page_body(database_id: &str, request: &CreateRequest) -> Value {
    json!({
        "parent": { "database_id": database_id },
        "properties": {
            "Name": {
                "title": [{ "text": { "content": request.title } }]
            },
            "Chapter": { "number": request.chapter },
            "Book": {
                "select": { "name": request.book_name, "color": request.color }
            },
            "Book Index": { "number": request.book_index },
            "Testament": {
                "select": {
                    "name": request.testament.tag(),
                    "color": request.testament.color()
                }
            }
        },
        "children": request.blocks.iter().map(paragraph).collect::<Vec<_>>()
    })
}

fn paragraph(block: &Block) -> Value {
    let rich_text: Vec<Value> = block
        .spans
        .iter()
        .map(|span| {
            json!({
                "type": "text",
                "text": { "content": span.content },
                "annotations": { "bold": span.bold }
            })
        })
        .collect();
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": rich_text }
    })
}
