//! Book import: keyword fan-out search, batched detail fetch, normalization,
//! and idempotent upsert per category.

use crate::model::{BookRecord, CategoryRecord};
use crate::normalize::{self, NormalizedBook};
use crate::paapi::{CatalogSource, DETAIL_BATCH_LIMIT, Item};
use crate::store::CatalogStore;
use crate::throttle::Throttle;

/// Search pages carry this many items.
const PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct ImportPolicy {
    /// Hard cap on search pages fetched per keyword. The source rejects deep
    /// pagination, so the cap is a policy knob rather than a constant.
    pub max_pages_per_keyword: u64,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            max_pages_per_keyword: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub saved: usize,
    pub skipped: usize,
}

impl ImportStats {
    fn absorb(&mut self, other: ImportStats) {
        self.saved += other.saved;
        self.skipped += other.skipped;
    }
}

/// Import books for every stored category, reconciling each category's count
/// after its books are processed.
pub async fn import_all(
    source: &dyn CatalogSource,
    store: &CatalogStore,
    throttle: &dyn Throttle,
    policy: ImportPolicy,
) -> anyhow::Result<ImportStats> {
    let categories = store.categories()?;
    let mut total = ImportStats::default();

    for category in &categories {
        tracing::info!(category = %category.name, "importing books");
        total.absorb(import_category(source, store, throttle, category, policy).await?);
        crate::reconcile::reconcile_category(store, category)?;
    }

    Ok(total)
}

/// Import every book the source surfaces for one category.
///
/// The bare category name hits the source's per-query result cap, so the
/// keyword space fans out to `"{category} {letter}"` for each letter A-Z.
/// Failed searches and detail fetches are logged and skipped; only store
/// errors abort the run.
pub async fn import_category(
    source: &dyn CatalogSource,
    store: &CatalogStore,
    throttle: &dyn Throttle,
    category: &CategoryRecord,
    policy: ImportPolicy,
) -> anyhow::Result<ImportStats> {
    let mut stats = ImportStats::default();

    for letter in 'A'..='Z' {
        let keyword = format!("{} {letter}", category.name);

        let first_page = match source.search(&keyword, 1).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(?err, keyword, "search failed; skipping keyword");
                continue;
            }
        };
        let total_pages = first_page
            .total_result_count
            .div_ceil(PAGE_SIZE)
            .min(policy.max_pages_per_keyword);
        tracing::debug!(
            keyword,
            total_count = first_page.total_result_count,
            total_pages,
            "keyword fan-out"
        );

        for page in 1..=total_pages {
            let result = if page == 1 {
                first_page.clone()
            } else {
                match source.search(&keyword, page as u32).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(?err, keyword, page, "search page failed; skipping page");
                        continue;
                    }
                }
            };

            let asins: Vec<String> = result
                .items
                .iter()
                .filter_map(|item| item.asin.clone())
                .collect();

            for batch in asins.chunks(DETAIL_BATCH_LIMIT) {
                let detailed = match source.get_items(batch).await {
                    Ok(items) => items,
                    Err(err) => {
                        tracing::warn!(?err, keyword, page, "detail fetch failed; skipping batch");
                        continue;
                    }
                };

                for item in &detailed {
                    if save_book(store, item, category)? {
                        stats.saved += 1;
                    } else {
                        stats.skipped += 1;
                    }
                    throttle.acquire().await;
                }
            }
        }
    }

    Ok(stats)
}

/// Normalize one raw item and upsert it with resolved references. Returns
/// whether the item was stored.
fn save_book(store: &CatalogStore, item: &Item, category: &CategoryRecord) -> anyhow::Result<bool> {
    let normalized = match normalize::normalize(item) {
        Ok(book) => book,
        Err(reason) => {
            tracing::debug!(%reason, "skipped item");
            return Ok(false);
        }
    };

    let record = resolve_references(store, normalized, category)?;
    let stored = store.upsert_book(record)?;
    tracing::info!(title = %stored.title, slug = %stored.slug, "saved book");
    Ok(true)
}

/// Authors, series, and the slug are resolved against the store before the
/// book itself is written, so every ref on the stored record exists.
fn resolve_references(
    store: &CatalogStore,
    book: NormalizedBook,
    category: &CategoryRecord,
) -> anyhow::Result<BookRecord> {
    let mut author_ids = Vec::new();
    for name in &book.authors {
        let author = store.find_or_create_author(name)?;
        if !author_ids.contains(&author.id) {
            author_ids.push(author.id);
        }
    }

    let series = match &book.series {
        Some(hint) => Some(store.find_or_create_series(&hint.name, Some(hint.number))?),
        None => None,
    };
    let slug = store.unique_slug(&normalize::slugify(&book.title), &book.asin)?;

    Ok(BookRecord {
        asin: book.asin,
        title: book.title,
        slug,
        authors: author_ids,
        categories: vec![category.id],
        series: series.as_ref().map(|s| s.id),
        series_number: book.series.as_ref().map(|hint| hint.number),
        affiliate_link: book.affiliate_link,
        price: book.price,
        image: book.image,
        description: book.description,
        publisher: book.publisher,
        release_date: book.release_date,
        feedback_count: book.feedback_count,
        feedback_rating: book.feedback_rating,
    })
}
