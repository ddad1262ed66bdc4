//! Read-only JSON API over the catalog store.

use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cli::ServeArgs;
use crate::model::{BookRecord, CategoryRecord, SeriesRecord};
use crate::store::{BookQuery, CatalogStore};

const DEFAULT_PAGE_LIMIT: usize = 20;

type AppState = Arc<CatalogStore>;

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let store = Arc::new(CatalogStore::open(&args.data_dir)?);
    let app = router(store);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("bind {}", args.addr))?;
    tracing::info!(addr = %args.addr, "serving catalog read api");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

pub fn router(store: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/books", get(list_books))
        .route("/books/:slug", get(get_book))
        .route("/authors", get(list_authors))
        .route("/authors/name/:name", get(get_author_by_name))
        .route("/authors/:id", get(get_author))
        .route("/categories", get(list_categories))
        .route("/categories/:name", get(get_category))
        .route("/series", get(list_series))
        .route("/series/:id", get(get_series))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        tracing::error!(?err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct EntityRef {
    id: Uuid,
    name: String,
}

/// A book with its author/category/series references populated to
/// `{id, name}` summaries.
#[derive(Debug, Serialize)]
struct BookView {
    asin: String,
    title: String,
    slug: String,
    authors: Vec<EntityRef>,
    categories: Vec<EntityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<EntityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    series_number: Option<u32>,
    affiliate_link: String,
    price: String,
    image: String,
    description: String,
    publisher: String,
    release_date: Option<NaiveDate>,
    feedback_count: u32,
    feedback_rating: f32,
}

#[derive(Debug, Serialize)]
struct AuthorView {
    id: Uuid,
    name: String,
    books: Vec<BookView>,
}

#[derive(Debug, Serialize)]
struct SeriesView {
    id: Uuid,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<u32>,
    books: Vec<BookView>,
}

fn populate(store: &CatalogStore, book: BookRecord) -> anyhow::Result<BookView> {
    let mut authors = Vec::new();
    for id in &book.authors {
        if let Some(author) = store.author_by_id(*id)? {
            authors.push(EntityRef {
                id: author.id,
                name: author.name,
            });
        }
    }

    let mut categories = Vec::new();
    for id in &book.categories {
        if let Some(category) = store.category_by_id(*id)? {
            categories.push(EntityRef {
                id: category.id,
                name: category.name,
            });
        }
    }

    let series = match book.series {
        Some(id) => store.series_by_id(id)?.map(|series| EntityRef {
            id: series.id,
            name: series.name,
        }),
        None => None,
    };

    Ok(BookView {
        asin: book.asin,
        title: book.title,
        slug: book.slug,
        authors,
        categories,
        series,
        series_number: book.series_number,
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

fn populate_all(store: &CatalogStore, books: Vec<BookRecord>) -> anyhow::Result<Vec<BookView>> {
    books
        .into_iter()
        .map(|book| populate(store, book))
        .collect()
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid id: {raw}")))
}

fn parse_id_list(raw: Option<&str>) -> Result<Vec<Uuid>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_id)
        .collect()
}

#[derive(Debug, Deserialize)]
struct BooksParams {
    search: Option<String>,
    category: Option<String>,
    author: Option<String>,
    upcoming: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

async fn list_books(
    State(store): State<AppState>,
    Query(params): Query<BooksParams>,
) -> Result<Json<Vec<BookView>>, ApiError> {
    let query = BookQuery {
        search: params.search,
        categories: parse_id_list(params.category.as_deref())?,
        authors: parse_id_list(params.author.as_deref())?,
        on_or_after: (params.upcoming.as_deref() == Some("true"))
            .then(|| chrono::Utc::now().date_naive()),
        skip: params.skip.unwrap_or(0),
        limit: Some(params.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
    };

    let books = store.list_books(&query).map_err(ApiError::internal)?;
    let views = populate_all(&store, books).map_err(ApiError::internal)?;
    Ok(Json(views))
}

async fn get_book(
    State(store): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BookView>, ApiError> {
    let book = store
        .book_by_slug(&slug)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    let view = populate(&store, book).map_err(ApiError::internal)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct AuthorsParams {
    search: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AuthorSummary {
    id: Uuid,
    name: String,
    books: Vec<String>,
}

async fn list_authors(
    State(store): State<AppState>,
    Query(params): Query<AuthorsParams>,
) -> Result<Json<Vec<AuthorSummary>>, ApiError> {
    let authors = store
        .authors(
            params.search.as_deref(),
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .map_err(ApiError::internal)?;
    let summaries = authors
        .into_iter()
        .map(|author| AuthorSummary {
            id: author.id,
            name: author.name,
            books: author.books,
        })
        .collect();
    Ok(Json(summaries))
}

async fn get_author(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuthorView>, ApiError> {
    let id = parse_id(&id)?;
    let author = store
        .author_by_id(id)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Author not found"))?;
    author_view(&store, author.id, author.name, &author.books)
}

/// Hyphens in the path segment stand in for spaces in the author name.
async fn get_author_by_name(
    State(store): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AuthorView>, ApiError> {
    let name = name.replace('-', " ");
    let author = store
        .author_by_name(&name)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Author not found"))?;
    author_view(&store, author.id, author.name, &author.books)
}

fn author_view(
    store: &CatalogStore,
    id: Uuid,
    name: String,
    asins: &[String],
) -> Result<Json<AuthorView>, ApiError> {
    let books = store.books_by_asins(asins).map_err(ApiError::internal)?;
    let books = populate_all(store, books).map_err(ApiError::internal)?;
    Ok(Json(AuthorView { id, name, books }))
}

async fn list_categories(
    State(store): State<AppState>,
) -> Result<Json<Vec<CategoryRecord>>, ApiError> {
    let categories = store.categories().map_err(ApiError::internal)?;
    Ok(Json(categories))
}

async fn get_category(
    State(store): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<CategoryRecord>>, ApiError> {
    let name = name.replace('-', " ");
    let categories = store
        .categories_by_name(&name)
        .map_err(ApiError::internal)?;
    if categories.is_empty() {
        return Err(ApiError::not_found("Category not found"));
    }
    Ok(Json(categories))
}

async fn list_series(
    State(store): State<AppState>,
) -> Result<Json<Vec<SeriesRecord>>, ApiError> {
    let series = store.series_list().map_err(ApiError::internal)?;
    Ok(Json(series))
}

async fn get_series(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SeriesView>, ApiError> {
    let id = parse_id(&id)?;
    let series = store
        .series_by_id(id)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Series not found"))?;
    let books = store.books_in_series(id).map_err(ApiError::internal)?;
    let books = populate_all(&store, books).map_err(ApiError::internal)?;
    Ok(Json(SeriesView {
        id: series.id,
        name: series.name,
        number: series.number,
        books,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use tower::ServiceExt as _;

    use super::*;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    /// One category, one author, two books (one in a series).
    fn seeded_store(dir: &TempDir) -> Arc<CatalogStore> {
        let store = CatalogStore::open(dir.path()).unwrap();
        let category = store.ensure_category("Fantasy").unwrap();
        let author = store.find_or_create_author("Jane Doe").unwrap();
        let series = store.find_or_create_series("Saga", Some(1)).unwrap();

        store
            .upsert_book(BookRecord {
                asin: "B001".to_owned(),
                title: "First Steps (Saga Book 1)".to_owned(),
                slug: "first-steps-saga-book-1".to_owned(),
                authors: vec![author.id],
                categories: vec![category.id],
                series: Some(series.id),
                series_number: Some(1),
                affiliate_link: "https://example.com/dp/B001".to_owned(),
                price: "$12.99".to_owned(),
                image: String::new(),
                description: String::new(),
                publisher: "Test Press".to_owned(),
                release_date: NaiveDate::from_ymd_opt(2021, 3, 16),
                feedback_count: 7,
                feedback_rating: 4.5,
            })
            .unwrap();
        store
            .upsert_book(BookRecord {
                asin: "B002".to_owned(),
                title: "Standalone".to_owned(),
                slug: "standalone".to_owned(),
                authors: vec![author.id],
                categories: vec![category.id],
                series: None,
                series_number: None,
                affiliate_link: String::new(),
                price: "N/A".to_owned(),
                image: String::new(),
                description: String::new(),
                publisher: "Unknown".to_owned(),
                release_date: None,
                feedback_count: 0,
                feedback_rating: 0.0,
            })
            .unwrap();

        Arc::new(store)
    }

    #[tokio::test]
    async fn books_list_and_filters() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);

        let (status, body) = get_json(router(store.clone()), "/books").await;
        assert_eq!(status, StatusCode::OK);
        let books = body.as_array().unwrap();
        assert_eq!(books.len(), 2);
        // Dated book sorts before the undated one.
        assert_eq!(books[0]["slug"], "first-steps-saga-book-1");
        assert_eq!(books[0]["authors"][0]["name"], "Jane Doe");
        assert_eq!(books[0]["categories"][0]["name"], "Fantasy");

        let (status, body) = get_json(router(store.clone()), "/books?search=standalone").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get_json(router(store), "/books?category=not-an-id").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid id"));
    }

    #[tokio::test]
    async fn book_detail_by_slug() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);

        let (status, body) = get_json(router(store.clone()), "/books/standalone").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["asin"], "B002");

        let (status, body) = get_json(router(store), "/books/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Book not found");
    }

    #[tokio::test]
    async fn author_lookup_by_id_and_name() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let author = store.author_by_name("Jane Doe").unwrap().unwrap();

        let (status, body) =
            get_json(router(store.clone()), &format!("/authors/{}", author.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Jane Doe");
        assert_eq!(body["books"].as_array().unwrap().len(), 2);

        let (status, body) = get_json(router(store.clone()), "/authors/name/jane-doe").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Jane Doe");

        let (status, _) = get_json(router(store.clone()), "/authors/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get_json(router(store), "/authors/name/nobody-here").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Author not found");
    }

    #[tokio::test]
    async fn categories_and_series_endpoints() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);

        let (status, body) = get_json(router(store.clone()), "/categories").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["name"], "Fantasy");

        let (status, body) = get_json(router(store.clone()), "/categories/fantasy").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Fantasy");

        let (status, _) = get_json(router(store.clone()), "/categories/western").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get_json(router(store.clone()), "/series").await;
        assert_eq!(status, StatusCode::OK);
        let series_id = body[0]["id"].as_str().unwrap().to_owned();

        let (status, body) = get_json(router(store), &format!("/series/{series_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Saga");
        assert_eq!(body["books"].as_array().unwrap().len(), 1);
        assert_eq!(body["books"][0]["asin"], "B001");
    }
}
