//! Count reconciliation: `total_books` is recomputed from stored books, not
//! incrementally tracked, so partial failures and duplicate upserts earlier
//! in a run self-heal here.

use crate::model::CategoryRecord;
use crate::store::CatalogStore;

pub fn reconcile_category(store: &CatalogStore, category: &CategoryRecord) -> anyhow::Result<u64> {
    let count = store.count_books_in_category(category.id)?;
    store.set_category_total(category.id, count)?;
    tracing::debug!(category = %category.name, total_books = count, "reconciled category count");
    Ok(count)
}

pub fn reconcile_all(store: &CatalogStore) -> anyhow::Result<()> {
    for category in store.categories()? {
        reconcile_category(store, &category)?;
    }
    Ok(())
}
