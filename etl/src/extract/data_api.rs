//! HTTP document store client.
//!
//! Speaks the `action/find` protocol: every page is a POST to
//! `<base_url>/action/find` with a JSON body naming the data source,
//! database and collection, and the answer carries a `documents` array.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Extractor;
use crate::config::DataApiSettings;
use crate::error::{ExtractError, ExtractResult};
use crate::models::Dataset;

/// Default number of retries per page
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Documents requested per page
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindRequest<'a> {
    data_source: &'a str,
    database: &'a str,
    collection: &'a str,
    filter: Value,
    skip: usize,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

/// Error body returned by the store
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Paged `action/find` client
#[derive(Debug, Clone)]
pub struct DataApiClient {
    settings: DataApiSettings,
    page_size: usize,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl DataApiClient {
    pub fn new(settings: DataApiSettings) -> Self {
        Self {
            settings,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set retries per page and the delay between them
    pub fn with_retries(mut self, max_retries: u32, delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay_ms = delay_ms;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/action/find", self.settings.base_url.trim_end_matches('/'))
    }

    /// Fetch every document of a collection, page by page.
    pub async fn find_all(&self, collection: &str) -> ExtractResult<Vec<Value>> {
        let client = reqwest::Client::new();
        let mut documents = Vec::new();

        loop {
            let page = self.find_page(&client, collection, documents.len()).await?;
            let received = page.len();
            documents.extend(page);
            tracing::debug!(collection, received, total = documents.len(), "Fetched page");

            if received < self.page_size {
                break;
            }
        }

        Ok(documents)
    }

    /// One page, with retries
    async fn find_page(&self, client: &reqwest::Client, collection: &str, skip: usize) -> ExtractResult<Vec<Value>> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_find_page(client, collection, skip).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!("Attempt {}/{} failed: {}", attempt, self.max_retries, e);
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        tokio::time::sleep(tokio::time::Duration::from_millis(self.retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractError::ApiError("Unknown error".to_string())))
    }

    async fn try_find_page(&self, client: &reqwest::Client, collection: &str, skip: usize) -> ExtractResult<Vec<Value>> {
        let body = FindRequest {
            data_source: &self.settings.data_source,
            database: &self.settings.database,
            collection,
            filter: json!({}),
            skip,
            limit: self.page_size,
        };

        let response = client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExtractError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(ExtractError::ApiError(format!("{}: {}", status, message)));
        }

        let page: FindResponse = serde_json::from_str(&text).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
        Ok(page.documents)
    }
}

impl Extractor for DataApiClient {
    async fn fetch(&self, collection: &str) -> ExtractResult<Dataset> {
        let documents = self.find_all(collection).await?;
        Ok(Dataset::from_documents(&documents)?)
    }

    fn describe(&self) -> String {
        format!("{} ({}/{})", self.settings.base_url, self.settings.data_source, self.settings.database)
    }
}
