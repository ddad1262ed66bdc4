//! Client for the Product Advertising API: signed search and batch detail
//! calls, plus the raw item shapes the normalizer consumes.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::signing::{self, SigningParams};

const SEARCH_PATH: &str = "/paapi5/searchitems";
const GET_ITEMS_PATH: &str = "/paapi5/getitems";
const SEARCH_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems";
const GET_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const SERVICE: &str = "ProductAdvertisingAPI";

/// The detail endpoint accepts at most this many ids per call.
pub const DETAIL_BATCH_LIMIT: usize = 10;

const BOOK_RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "ItemInfo.ByLineInfo",
    "ItemInfo.ContentInfo",
    "ItemInfo.ProductInfo",
    "ItemInfo.Classifications",
    "Images.Primary.Large",
    "Offers.Listings.MerchantInfo",
    "Offers.Listings.Price",
];
const TAXONOMY_RESOURCES: &[&str] = &["BrowseNodeInfo.BrowseNodes"];

/// Marker error for a throttling response from the catalog source.
///
/// Detected by the retry loop with `anyhow::Error::is::<Throttled>`.
#[derive(Debug)]
pub struct Throttled;

impl std::fmt::Display for Throttled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("throttled by the catalog source")
    }
}

impl std::error::Error for Throttled {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SearchResult {
    pub items: Vec<Item>,
    pub total_result_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Item {
    #[serde(rename = "ASIN")]
    pub asin: Option<String>,
    #[serde(rename = "DetailPageURL")]
    pub detail_page_url: Option<String>,
    pub item_info: Option<ItemInfo>,
    pub images: Option<Images>,
    pub offers: Option<Offers>,
    pub browse_node_info: Option<BrowseNodeInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemInfo {
    pub title: Option<DisplayValue>,
    pub by_line_info: Option<ByLineInfo>,
    pub content_info: Option<ContentInfo>,
    pub product_info: Option<ProductInfo>,
    pub classifications: Option<Classifications>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DisplayValue {
    pub display_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ByLineInfo {
    pub contributors: Vec<Contributor>,
    pub manufacturer: Option<DisplayValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Contributor {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContentInfo {
    pub publication_date: Option<DisplayValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProductInfo {
    pub binding: Option<DisplayValue>,
    pub features: Vec<DisplayValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Classifications {
    pub binding: Option<DisplayValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Images {
    pub primary: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageSet {
    pub large: Option<ImageInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageInfo {
    #[serde(rename = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Offers {
    pub listings: Vec<Listing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Listing {
    pub price: Option<Price>,
    pub merchant_info: Option<MerchantInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Price {
    pub display_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MerchantInfo {
    pub feedback_count: Option<u32>,
    pub feedback_rating: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BrowseNodeInfo {
    pub browse_nodes: Vec<BrowseNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BrowseNode {
    pub display_name: Option<String>,
    pub browse_nodes: Vec<BrowseNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SearchResponse {
    search_result: Option<SearchResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GetItemsResponse {
    items_result: Option<ItemsResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ItemsResult {
    items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    error_type: String,
    #[serde(rename = "Errors")]
    errors: Vec<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiError {
    #[serde(rename = "Message")]
    message: String,
}

/// The external catalog source as the importers see it.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Paginated keyword search with the book detail resources.
    async fn search(&self, keywords: &str, page: u32) -> anyhow::Result<SearchResult>;

    /// Keyword search requesting only browse-node taxonomy data.
    async fn discover(&self, keywords: &str) -> anyhow::Result<Vec<Item>>;

    /// Batch detail fetch; at most [`DETAIL_BATCH_LIMIT`] ids are sent.
    async fn get_items(&self, asins: &[String]) -> anyhow::Result<Vec<Item>>;
}

pub struct PaapiClient {
    client: reqwest::Client,
    config: SourceConfig,
    host: String,
    retries: u32,
    backoff: Duration,
}

impl PaapiClient {
    pub fn new(config: SourceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build catalog source http client")?;
        let host = config.host();

        Ok(Self {
            client,
            config,
            host,
            retries: 3,
            backoff: Duration::from_secs(4),
        })
    }

    pub fn with_retry_policy(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    fn search_body(&self, keywords: &str, page: u32, resources: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "Keywords": keywords,
            "PartnerTag": self.config.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": self.config.marketplace,
            "ItemPage": page,
            "SearchIndex": "Books",
            "Resources": resources,
            "Filters": {
                "Condition": "New",
                "Availability": "Available"
            }
        })
    }

    async fn send(
        &self,
        path: &str,
        target: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(path, target, body).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is::<Throttled>() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "throttled by catalog source; retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        path: &str,
        target: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let body_text = serde_json::to_string(body).context("serialize request body")?;
        let signed = signing::sign(
            &SigningParams {
                access_key: &self.config.access_key,
                secret_key: &self.config.secret_key,
                host: &self.host,
                path,
                service: SERVICE,
                region: &self.config.region,
                target,
                body: &body_text,
            },
            chrono::Utc::now(),
        )
        .context("sign catalog source request")?;

        let url = format!("{}{path}", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json, text/javascript")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US")
            .header(reqwest::header::CONTENT_TYPE, signing::CONTENT_TYPE)
            .header(reqwest::header::CONTENT_ENCODING, signing::CONTENT_ENCODING)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", signed.amz_date.as_str())
            .header(reqwest::header::AUTHORIZATION, signed.authorization.as_str())
            .body(body_text)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("read catalog source response body")?;

        if !status.is_success() {
            let parsed: ErrorResponse = serde_json::from_str(&raw).unwrap_or_default();
            if parsed.error_type.contains("TooManyRequests") {
                return Err(anyhow::Error::new(Throttled));
            }
            let message = parsed
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| raw.clone());
            anyhow::bail!("catalog source error ({status}): {message}");
        }

        serde_json::from_str(&raw).context("parse catalog source response")
    }
}

#[async_trait]
impl CatalogSource for PaapiClient {
    async fn search(&self, keywords: &str, page: u32) -> anyhow::Result<SearchResult> {
        let body = self.search_body(keywords, page, BOOK_RESOURCES);
        let value = self.send(SEARCH_PATH, SEARCH_TARGET, &body).await?;
        let response: SearchResponse =
            serde_json::from_value(value).context("parse search response")?;
        Ok(response.search_result.unwrap_or_default())
    }

    async fn discover(&self, keywords: &str) -> anyhow::Result<Vec<Item>> {
        let body = self.search_body(keywords, 1, TAXONOMY_RESOURCES);
        let value = self.send(SEARCH_PATH, SEARCH_TARGET, &body).await?;
        let response: SearchResponse =
            serde_json::from_value(value).context("parse taxonomy search response")?;
        Ok(response.search_result.unwrap_or_default().items)
    }

    async fn get_items(&self, asins: &[String]) -> anyhow::Result<Vec<Item>> {
        if asins.is_empty() {
            return Ok(Vec::new());
        }
        let ids = &asins[..asins.len().min(DETAIL_BATCH_LIMIT)];

        let body = serde_json::json!({
            "PartnerTag": self.config.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": self.config.marketplace,
            "ItemIds": ids,
            "Resources": BOOK_RESOURCES,
        });
        let value = self.send(GET_ITEMS_PATH, GET_ITEMS_TARGET, &body).await?;
        let response: GetItemsResponse =
            serde_json::from_value(value).context("parse get items response")?;
        Ok(response.items_result.unwrap_or_default().items)
    }
}
