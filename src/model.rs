use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A flattened browse-node name. `total_books` is derived by reconciliation,
/// never incremented during import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub total_books: u64,
}

/// `books` holds the ASINs of every stored book referencing this author,
/// each at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: Uuid,
    pub name: String,
    pub books: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

/// A catalog book, keyed by its external identifier (ASIN).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub asin: String,
    pub title: String,
    pub slug: String,
    pub authors: Vec<Uuid>,
    pub categories: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_number: Option<u32>,
    pub affiliate_link: String,
    pub price: String,
    pub image: String,
    pub description: String,
    pub publisher: String,
    pub release_date: Option<NaiveDate>,
    pub feedback_count: u32,
    pub feedback_rating: f32,
}
