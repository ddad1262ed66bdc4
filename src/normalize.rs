//! Pure normalization of raw catalog items into book fields.
//!
//! Absent data resolves to sentinel defaults; only two conditions reject an
//! item outright: a missing external identifier and a digital-only binding.

use chrono::NaiveDate;

use crate::paapi::{DisplayValue, Item};

pub const UNKNOWN_TITLE: &str = "N/A";
pub const UNKNOWN_PRICE: &str = "N/A";
pub const UNKNOWN_PUBLISHER: &str = "Unknown";

const DIGITAL_FORMAT_MARKERS: &[&str] = &["kindle", "audible"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBook {
    pub asin: String,
    pub title: String,
    pub authors: Vec<String>,
    pub affiliate_link: String,
    pub price: String,
    pub image: String,
    pub description: String,
    pub publisher: String,
    pub release_date: Option<NaiveDate>,
    pub feedback_count: u32,
    pub feedback_rating: f32,
    pub series: Option<SeriesHint>,
}

/// Series membership derived from a "(Name Book N)" title suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesHint {
    pub name: String,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingExternalId,
    DigitalFormat(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingExternalId => f.write_str("item has no external identifier"),
            SkipReason::DigitalFormat(binding) => write!(f, "non-physical format: {binding}"),
        }
    }
}

pub fn normalize(item: &Item) -> Result<NormalizedBook, SkipReason> {
    let Some(asin) = item.asin.as_deref().map(str::trim).filter(|a| !a.is_empty()) else {
        return Err(SkipReason::MissingExternalId);
    };

    let binding = binding(item);
    let lowered = binding.to_lowercase();
    if DIGITAL_FORMAT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(SkipReason::DigitalFormat(binding));
    }

    let info = item.item_info.as_ref();
    let title = info
        .and_then(|i| display(i.title.as_ref()))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_owned());

    let authors = info
        .and_then(|i| i.by_line_info.as_ref())
        .map(|byline| {
            byline
                .contributors
                .iter()
                .filter_map(|c| c.name.as_deref())
                .map(reorder_contributor_name)
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let listing = item.offers.as_ref().and_then(|o| o.listings.first());
    let merchant = listing.and_then(|l| l.merchant_info.as_ref());

    let description = info
        .and_then(|i| i.product_info.as_ref())
        .map(|p| {
            p.features
                .iter()
                .filter_map(|f| f.display_value.as_deref())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let series = parse_series_hint(&title);

    Ok(NormalizedBook {
        asin: asin.to_owned(),
        authors,
        affiliate_link: item.detail_page_url.clone().unwrap_or_default(),
        price: listing
            .and_then(|l| l.price.as_ref())
            .and_then(|p| p.display_amount.clone())
            .unwrap_or_else(|| UNKNOWN_PRICE.to_owned()),
        image: item
            .images
            .as_ref()
            .and_then(|i| i.primary.as_ref())
            .and_then(|p| p.large.as_ref())
            .and_then(|l| l.url.clone())
            .unwrap_or_default(),
        description,
        publisher: info
            .and_then(|i| i.by_line_info.as_ref())
            .and_then(|b| display(b.manufacturer.as_ref()))
            .unwrap_or_else(|| UNKNOWN_PUBLISHER.to_owned()),
        release_date: info
            .and_then(|i| i.content_info.as_ref())
            .and_then(|c| display(c.publication_date.as_ref()))
            .and_then(|raw| parse_release_date(&raw)),
        feedback_count: merchant.and_then(|m| m.feedback_count).unwrap_or(0),
        feedback_rating: merchant.and_then(|m| m.feedback_rating).unwrap_or(0.0),
        series,
        title,
    })
}

fn binding(item: &Item) -> String {
    let info = item.item_info.as_ref();
    info.and_then(|i| i.product_info.as_ref())
        .and_then(|p| display(p.binding.as_ref()))
        .or_else(|| {
            info.and_then(|i| i.classifications.as_ref())
                .and_then(|c| display(c.binding.as_ref()))
        })
        .unwrap_or_default()
}

fn display(value: Option<&DisplayValue>) -> Option<String> {
    value
        .and_then(|v| v.display_value.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// "Last, First" becomes "First Last"; anything else passes through trimmed.
pub fn reorder_contributor_name(name: &str) -> String {
    match name.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim())
            .trim()
            .to_owned(),
        None => name.trim().to_owned(),
    }
}

pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    for format in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    // Year-month and bare-year publication dates resolve to their first day.
    if let Ok(parsed) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d") {
        return Some(parsed);
    }

    None
}

/// Lowercased ASCII-alphanumeric slug; non-alphanumeric runs collapse to a
/// single separator. Uniqueness is the store's concern.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

pub fn parse_series_hint(title: &str) -> Option<SeriesHint> {
    let open = title.rfind('(')?;
    let rest = &title[open + 1..];
    let close = rest.find(')')?;
    let inner = rest[..close].trim();

    let marker = inner.rfind(" Book ")?;
    let name = inner[..marker].trim();
    let number = inner[marker + " Book ".len()..].trim().parse::<u32>().ok()?;
    if name.is_empty() {
        return None;
    }

    Some(SeriesHint {
        name: name.to_owned(),
        number,
    })
}

#[cfg(test)]
mod tests {
    use crate::paapi::{
        ByLineInfo, Classifications, ContentInfo, Contributor, DisplayValue, ItemInfo,
        ProductInfo,
    };

    use super::*;

    fn value(text: &str) -> Option<DisplayValue> {
        Some(DisplayValue {
            display_value: Some(text.to_owned()),
        })
    }

    fn physical_item(asin: &str, title: &str) -> Item {
        Item {
            asin: Some(asin.to_owned()),
            item_info: Some(ItemInfo {
                title: value(title),
                classifications: Some(Classifications {
                    binding: value("Paperback"),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn missing_asin_is_rejected() {
        let item = Item::default();
        assert_eq!(normalize(&item), Err(SkipReason::MissingExternalId));
    }

    #[test]
    fn digital_bindings_are_rejected_case_insensitively() {
        for binding in ["Kindle Edition", "AUDIBLE Audiobook", "kindle"] {
            let mut item = physical_item("B0001", "Some Title");
            item.item_info.as_mut().unwrap().classifications = Some(Classifications {
                binding: value(binding),
            });
            assert_eq!(
                normalize(&item),
                Err(SkipReason::DigitalFormat(binding.to_owned())),
                "binding {binding:?} should be rejected"
            );
        }
    }

    #[test]
    fn binding_falls_back_from_product_info_to_classifications() {
        let mut item = physical_item("B0001", "Some Title");
        item.item_info.as_mut().unwrap().product_info = Some(ProductInfo {
            binding: value("Kindle Edition"),
            ..Default::default()
        });
        // ProductInfo binding wins even when Classifications says Paperback.
        assert!(matches!(
            normalize(&item),
            Err(SkipReason::DigitalFormat(_))
        ));
    }

    #[test]
    fn contributor_names_are_reordered() {
        assert_eq!(reorder_contributor_name("Doe, Jane"), "Jane Doe");
        assert_eq!(reorder_contributor_name("Plain Name"), "Plain Name");
        assert_eq!(reorder_contributor_name("  spaced  "), "spaced");
    }

    #[test]
    fn empty_contributor_names_are_dropped() {
        let mut item = physical_item("B0001", "Some Title");
        item.item_info.as_mut().unwrap().by_line_info = Some(ByLineInfo {
            contributors: vec![
                Contributor {
                    name: Some("Doe, Jane".to_owned()),
                },
                Contributor {
                    name: Some("   ".to_owned()),
                },
                Contributor { name: None },
            ],
            ..Default::default()
        });

        let book = normalize(&item).unwrap();
        assert_eq!(book.authors, vec!["Jane Doe".to_owned()]);
    }

    #[test]
    fn sentinels_fill_absent_fields() {
        let item = Item {
            asin: Some("B0001".to_owned()),
            ..Default::default()
        };

        let book = normalize(&item).unwrap();
        assert_eq!(book.title, UNKNOWN_TITLE);
        assert_eq!(book.price, UNKNOWN_PRICE);
        assert_eq!(book.publisher, UNKNOWN_PUBLISHER);
        assert_eq!(book.image, "");
        assert_eq!(book.description, "");
        assert_eq!(book.release_date, None);
        assert_eq!(book.feedback_count, 0);
        assert_eq!(book.feedback_rating, 0.0);
    }

    #[test]
    fn release_date_formats() {
        assert_eq!(
            parse_release_date("2021-03-16"),
            NaiveDate::from_ymd_opt(2021, 3, 16)
        );
        assert_eq!(
            parse_release_date("2021-03-16T00:00:01Z"),
            NaiveDate::from_ymd_opt(2021, 3, 16)
        );
        assert_eq!(
            parse_release_date("March 16, 2021"),
            NaiveDate::from_ymd_opt(2021, 3, 16)
        );
        assert_eq!(
            parse_release_date("2021-03"),
            NaiveDate::from_ymd_opt(2021, 3, 1)
        );
        assert_eq!(
            parse_release_date("2021"),
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );
        assert_eq!(parse_release_date("not a date"), None);
        assert_eq!(parse_release_date(""), None);
    }

    #[test]
    fn invalid_release_date_normalizes_to_none() {
        let mut item = physical_item("B0001", "Some Title");
        item.item_info.as_mut().unwrap().content_info = Some(ContentInfo {
            publication_date: value("soon"),
        });
        assert_eq!(normalize(&item).unwrap().release_date, None);
    }

    #[test]
    fn slugify_collapses_non_alphanumeric_runs() {
        assert_eq!(slugify("Dune"), "dune");
        assert_eq!(slugify("The  Left Hand -- of Darkness!"), "the-left-hand-of-darkness");
        assert_eq!(slugify("  ...Leading & Trailing...  "), "leading-trailing");
        assert_eq!(slugify("N/A"), "n-a");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn series_hint_from_title_suffix() {
        assert_eq!(
            parse_series_hint("Test Book (Saga Book 2)"),
            Some(SeriesHint {
                name: "Saga".to_owned(),
                number: 2,
            })
        );
        assert_eq!(
            parse_series_hint("Title (The Long Saga Book 12)"),
            Some(SeriesHint {
                name: "The Long Saga".to_owned(),
                number: 12,
            })
        );
        assert_eq!(parse_series_hint("Plain Title"), None);
        assert_eq!(parse_series_hint("Title (paperback)"), None);
        assert_eq!(parse_series_hint("Title (Book 2)"), None);
    }

    #[test]
    fn full_item_normalizes_per_example() {
        let mut item = physical_item("X1", "Test Book (Saga Book 2)");
        item.item_info.as_mut().unwrap().by_line_info = Some(ByLineInfo {
            contributors: vec![Contributor {
                name: Some("Doe, Jane".to_owned()),
            }],
            ..Default::default()
        });

        let book = normalize(&item).unwrap();
        assert_eq!(book.title, "Test Book (Saga Book 2)");
        assert_eq!(book.authors, vec!["Jane Doe".to_owned()]);
        assert_eq!(
            book.series,
            Some(SeriesHint {
                name: "Saga".to_owned(),
                number: 2,
            })
        );
    }
}
