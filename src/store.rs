//! Persistent catalog store backed by redb.
//!
//! One table per entity keyed by its unique id, plus name/slug index tables
//! that make find-or-create and slug probing single atomic transactions.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::Context as _;
use chrono::NaiveDate;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::model::{AuthorRecord, BookRecord, CategoryRecord, SeriesRecord};

const BOOKS: TableDefinition<&str, &[u8]> = TableDefinition::new("books");
const BOOK_SLUGS: TableDefinition<&str, &str> = TableDefinition::new("book_slugs");
const AUTHORS: TableDefinition<&str, &[u8]> = TableDefinition::new("authors");
const AUTHOR_NAMES: TableDefinition<&str, &str> = TableDefinition::new("author_names");
const CATEGORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("categories");
const CATEGORY_NAMES: TableDefinition<&str, &str> = TableDefinition::new("category_names");
const SERIES: TableDefinition<&str, &[u8]> = TableDefinition::new("series");
const SERIES_NAMES: TableDefinition<&str, &str> = TableDefinition::new("series_names");

/// Filter for the book list endpoint. Reference filters use `$in` semantics:
/// a book matches when any of its refs appears in the requested list.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    pub search: Option<String>,
    pub categories: Vec<Uuid>,
    pub authors: Vec<Uuid>,
    /// Only books releasing on or after this date.
    pub on_or_after: Option<NaiveDate>,
    pub skip: usize,
    pub limit: Option<usize>,
}

pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    /// Open or create the store under `data_dir`. One handle per run.
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir: {}", data_dir.display()))?;
        let path = data_dir.join("bookdex.redb");
        let db = Database::create(&path)
            .with_context(|| format!("open catalog database: {}", path.display()))?;

        // Create every table up front so later read transactions never see a
        // missing table.
        let txn = db.begin_write().context("init catalog tables")?;
        {
            txn.open_table(BOOKS)?;
            txn.open_table(BOOK_SLUGS)?;
            txn.open_table(AUTHORS)?;
            txn.open_table(AUTHOR_NAMES)?;
            txn.open_table(CATEGORIES)?;
            txn.open_table(CATEGORY_NAMES)?;
            txn.open_table(SERIES)?;
            txn.open_table(SERIES_NAMES)?;
        }
        txn.commit().context("commit catalog table init")?;

        Ok(Self { db })
    }

    /// Insert-if-absent by trimmed name. An existing category is returned
    /// untouched; `total_books` is never reset here.
    pub fn ensure_category(&self, name: &str) -> anyhow::Result<CategoryRecord> {
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "category name must not be empty");

        let txn = self.db.begin_write()?;
        let record = {
            let mut names = txn.open_table(CATEGORY_NAMES)?;
            let mut categories = txn.open_table(CATEGORIES)?;

            let existing_id = names.get(name)?.map(|guard| guard.value().to_owned());
            match existing_id {
                Some(id) => get_json::<CategoryRecord>(&categories, &id)?
                    .with_context(|| format!("category name index points at missing id {id}"))?,
                None => {
                    let record = CategoryRecord {
                        id: Uuid::new_v4(),
                        name: name.to_owned(),
                        total_books: 0,
                    };
                    insert_json(&mut categories, &record.id.to_string(), &record)?;
                    names.insert(name, record.id.to_string().as_str())?;
                    record
                }
            }
        };
        txn.commit()?;
        Ok(record)
    }

    pub fn find_or_create_author(&self, name: &str) -> anyhow::Result<AuthorRecord> {
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "author name must not be empty");

        let txn = self.db.begin_write()?;
        let record = {
            let mut names = txn.open_table(AUTHOR_NAMES)?;
            let mut authors = txn.open_table(AUTHORS)?;

            let existing_id = names.get(name)?.map(|guard| guard.value().to_owned());
            match existing_id {
                Some(id) => get_json::<AuthorRecord>(&authors, &id)?
                    .with_context(|| format!("author name index points at missing id {id}"))?,
                None => {
                    let record = AuthorRecord {
                        id: Uuid::new_v4(),
                        name: name.to_owned(),
                        books: Vec::new(),
                    };
                    insert_json(&mut authors, &record.id.to_string(), &record)?;
                    names.insert(name, record.id.to_string().as_str())?;
                    record
                }
            }
        };
        txn.commit()?;
        Ok(record)
    }

    /// Created at most once per distinct name; an existing record keeps its
    /// original number.
    pub fn find_or_create_series(
        &self,
        name: &str,
        number: Option<u32>,
    ) -> anyhow::Result<SeriesRecord> {
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "series name must not be empty");

        let txn = self.db.begin_write()?;
        let record = {
            let mut names = txn.open_table(SERIES_NAMES)?;
            let mut series = txn.open_table(SERIES)?;

            let existing_id = names.get(name)?.map(|guard| guard.value().to_owned());
            match existing_id {
                Some(id) => get_json::<SeriesRecord>(&series, &id)?
                    .with_context(|| format!("series name index points at missing id {id}"))?,
                None => {
                    let record = SeriesRecord {
                        id: Uuid::new_v4(),
                        name: name.to_owned(),
                        number,
                    };
                    insert_json(&mut series, &record.id.to_string(), &record)?;
                    names.insert(name, record.id.to_string().as_str())?;
                    record
                }
            }
        };
        txn.commit()?;
        Ok(record)
    }

    /// Unique slug for a book: a re-imported ASIN keeps its stored slug;
    /// otherwise the base is probed with `-2`, `-3`, … suffixes.
    pub fn unique_slug(&self, base: &str, asin: &str) -> anyhow::Result<String> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        if let Some(existing) = get_json::<BookRecord>(&books, asin)? {
            return Ok(existing.slug);
        }

        let base = if base.is_empty() { "book" } else { base };
        let slugs = txn.open_table(BOOK_SLUGS)?;
        if slugs.get(base)?.is_none() {
            return Ok(base.to_owned());
        }
        let mut count = 2u64;
        loop {
            let candidate = format!("{base}-{count}");
            if slugs.get(candidate.as_str())?.is_none() {
                return Ok(candidate);
            }
            count += 1;
        }
    }

    /// Insert-or-update keyed by ASIN. On update the stored slug wins, so a
    /// book's URL never changes across import passes. Each referenced
    /// author's `books` set gains the ASIN exactly once, in the same
    /// transaction as the book write.
    pub fn upsert_book(&self, mut book: BookRecord) -> anyhow::Result<BookRecord> {
        let txn = self.db.begin_write()?;
        {
            let mut books = txn.open_table(BOOKS)?;
            let mut slugs = txn.open_table(BOOK_SLUGS)?;

            if let Some(existing) = get_json::<BookRecord>(&books, &book.asin)? {
                book.slug = existing.slug;
            }
            insert_json(&mut books, &book.asin, &book)?;
            slugs.insert(book.slug.as_str(), book.asin.as_str())?;

            let mut authors = txn.open_table(AUTHORS)?;
            for author_id in &book.authors {
                let key = author_id.to_string();
                let mut author = get_json::<AuthorRecord>(&authors, &key)?
                    .with_context(|| format!("book references unknown author {author_id}"))?;
                if !author.books.iter().any(|asin| asin == &book.asin) {
                    author.books.push(book.asin.clone());
                    insert_json(&mut authors, &key, &author)?;
                }
            }
        }
        txn.commit()?;
        Ok(book)
    }

    pub fn book_by_asin(&self, asin: &str) -> anyhow::Result<Option<BookRecord>> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        get_json(&books, asin)
    }

    pub fn book_by_slug(&self, slug: &str) -> anyhow::Result<Option<BookRecord>> {
        let txn = self.db.begin_read()?;
        let slugs = txn.open_table(BOOK_SLUGS)?;
        let Some(asin) = slugs.get(slug)?.map(|guard| guard.value().to_owned()) else {
            return Ok(None);
        };
        let books = txn.open_table(BOOKS)?;
        get_json(&books, &asin)
    }

    /// Books for the given ASINs, in input order; unknown ASINs are skipped.
    pub fn books_by_asins(&self, asins: &[String]) -> anyhow::Result<Vec<BookRecord>> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        let mut out = Vec::with_capacity(asins.len());
        for asin in asins {
            if let Some(book) = get_json::<BookRecord>(&books, asin)? {
                out.push(book);
            }
        }
        Ok(out)
    }

    pub fn books_in_series(&self, series_id: Uuid) -> anyhow::Result<Vec<BookRecord>> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        let mut out: Vec<BookRecord> = scan_json::<BookRecord>(&books)?
            .into_iter()
            .filter(|book| book.series == Some(series_id))
            .collect();
        sort_by_release_date(&mut out);
        Ok(out)
    }

    pub fn list_books(&self, query: &BookQuery) -> anyhow::Result<Vec<BookRecord>> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        let search = query.search.as_deref().map(str::to_lowercase);

        let mut matched: Vec<BookRecord> = scan_json::<BookRecord>(&books)?
            .into_iter()
            .filter(|book| {
                if let Some(needle) = &search
                    && !book.title.to_lowercase().contains(needle)
                {
                    return false;
                }
                if !query.categories.is_empty()
                    && !book.categories.iter().any(|c| query.categories.contains(c))
                {
                    return false;
                }
                if !query.authors.is_empty()
                    && !book.authors.iter().any(|a| query.authors.contains(a))
                {
                    return false;
                }
                if let Some(cutoff) = query.on_or_after {
                    return book.release_date.is_some_and(|date| date >= cutoff);
                }
                true
            })
            .collect();
        sort_by_release_date(&mut matched);

        let skipped = matched.into_iter().skip(query.skip);
        Ok(match query.limit {
            Some(limit) => skipped.take(limit).collect(),
            None => skipped.collect(),
        })
    }

    pub fn categories(&self) -> anyhow::Result<Vec<CategoryRecord>> {
        let txn = self.db.begin_read()?;
        let categories = txn.open_table(CATEGORIES)?;
        let mut out: Vec<CategoryRecord> = scan_json(&categories)?;
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn category_by_id(&self, id: Uuid) -> anyhow::Result<Option<CategoryRecord>> {
        let txn = self.db.begin_read()?;
        let categories = txn.open_table(CATEGORIES)?;
        get_json(&categories, &id.to_string())
    }

    /// Case-insensitive exact-name matches.
    pub fn categories_by_name(&self, name: &str) -> anyhow::Result<Vec<CategoryRecord>> {
        let mut out: Vec<CategoryRecord> = self
            .categories()?
            .into_iter()
            .filter(|category| category.name.eq_ignore_ascii_case(name))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn authors(
        &self,
        search: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<AuthorRecord>> {
        let txn = self.db.begin_read()?;
        let authors = txn.open_table(AUTHORS)?;
        let needle = search.map(str::to_lowercase);

        let mut out: Vec<AuthorRecord> = scan_json::<AuthorRecord>(&authors)?
            .into_iter()
            .filter(|author| match &needle {
                Some(needle) => author.name.to_lowercase().contains(needle),
                None => true,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out.into_iter().skip(skip).take(limit).collect())
    }

    pub fn author_by_id(&self, id: Uuid) -> anyhow::Result<Option<AuthorRecord>> {
        let txn = self.db.begin_read()?;
        let authors = txn.open_table(AUTHORS)?;
        get_json(&authors, &id.to_string())
    }

    /// Case-insensitive exact-name lookup.
    pub fn author_by_name(&self, name: &str) -> anyhow::Result<Option<AuthorRecord>> {
        let txn = self.db.begin_read()?;
        let authors = txn.open_table(AUTHORS)?;
        Ok(scan_json::<AuthorRecord>(&authors)?
            .into_iter()
            .find(|author| author.name.eq_ignore_ascii_case(name)))
    }

    pub fn series_list(&self) -> anyhow::Result<Vec<SeriesRecord>> {
        let txn = self.db.begin_read()?;
        let series = txn.open_table(SERIES)?;
        let mut out: Vec<SeriesRecord> = scan_json(&series)?;
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn series_by_id(&self, id: Uuid) -> anyhow::Result<Option<SeriesRecord>> {
        let txn = self.db.begin_read()?;
        let series = txn.open_table(SERIES)?;
        get_json(&series, &id.to_string())
    }

    /// Live count of books whose category set contains `category_id`.
    pub fn count_books_in_category(&self, category_id: Uuid) -> anyhow::Result<u64> {
        let txn = self.db.begin_read()?;
        let books = txn.open_table(BOOKS)?;
        let mut count = 0u64;
        for entry in books.iter()? {
            let (_, value) = entry?;
            let book: BookRecord =
                serde_json::from_slice(value.value()).context("decode book record")?;
            if book.categories.contains(&category_id) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn set_category_total(&self, category_id: Uuid, total_books: u64) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut categories = txn.open_table(CATEGORIES)?;
            let key = category_id.to_string();
            let mut record = get_json::<CategoryRecord>(&categories, &key)?
                .with_context(|| format!("set total for unknown category {category_id}"))?;
            record.total_books = total_books;
            insert_json(&mut categories, &key, &record)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore").finish()
    }
}

/// Release date ascending, unknown dates last, title as tiebreaker.
fn sort_by_release_date(books: &mut [BookRecord]) {
    books.sort_by(|a, b| match (a.release_date, b.release_date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.title.cmp(&b.title)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.title.cmp(&b.title),
    });
}

fn get_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(guard) = table.get(key)? else {
        return Ok(None);
    };
    let record = serde_json::from_slice(guard.value()).context("decode store record")?;
    Ok(Some(record))
}

fn insert_json<T: serde::Serialize>(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    record: &T,
) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(record).context("encode store record")?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

fn scan_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> anyhow::Result<Vec<T>> {
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value()).context("decode store record")?);
    }
    Ok(out)
}
