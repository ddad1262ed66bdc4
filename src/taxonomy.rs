//! Taxonomy import: flatten the source's browse-node tree into categories.

use std::collections::HashSet;

use crate::paapi::{BrowseNode, CatalogSource};
use crate::store::CatalogStore;
use crate::throttle::Throttle;

/// Discover the browse-node taxonomy for `root_keyword` and persist each
/// distinct display name as a category. Returns the number of categories
/// saved. Source failures degrade to an empty import rather than an error.
pub async fn import_taxonomy(
    source: &dyn CatalogSource,
    store: &CatalogStore,
    throttle: &dyn Throttle,
    root_keyword: &str,
) -> anyhow::Result<usize> {
    let items = match source.discover(root_keyword).await {
        Ok(items) => items,
        Err(err) => {
            tracing::error!(?err, root_keyword, "taxonomy discovery failed");
            return Ok(0);
        }
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut saved = 0usize;

    for item in &items {
        let Some(info) = item.browse_node_info.as_ref() else {
            continue;
        };
        for node in &info.browse_nodes {
            saved += walk_node(store, throttle, node, &mut seen).await?;
        }
    }

    Ok(saved)
}

/// Depth-first walk over a node and its children. The visited set keyed by
/// display name keeps the walk correct should the source ever return
/// repeated or cyclic node references.
async fn walk_node(
    store: &CatalogStore,
    throttle: &dyn Throttle,
    root: &BrowseNode,
    seen: &mut HashSet<String>,
) -> anyhow::Result<usize> {
    let mut stack = vec![root];
    let mut saved = 0usize;

    while let Some(node) = stack.pop() {
        // Nodes without a display name are skipped silently.
        if let Some(name) = node
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            && seen.insert(name.to_owned())
        {
            store.ensure_category(name)?;
            tracing::info!(category = name, "saved category");
            saved += 1;
        }

        for child in &node.browse_nodes {
            stack.push(child);
        }

        throttle.acquire().await;
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::paapi::{BrowseNodeInfo, Item, SearchResult};
    use crate::throttle::NoDelay;

    use super::*;

    struct StubSource {
        items: Vec<Item>,
    }

    #[async_trait]
    impl CatalogSource for StubSource {
        async fn search(&self, _keywords: &str, _page: u32) -> anyhow::Result<SearchResult> {
            Ok(SearchResult::default())
        }

        async fn discover(&self, _keywords: &str) -> anyhow::Result<Vec<Item>> {
            Ok(self.items.clone())
        }

        async fn get_items(&self, _asins: &[String]) -> anyhow::Result<Vec<Item>> {
            Ok(Vec::new())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CatalogSource for FailingSource {
        async fn search(&self, _keywords: &str, _page: u32) -> anyhow::Result<SearchResult> {
            anyhow::bail!("unreachable")
        }

        async fn discover(&self, _keywords: &str) -> anyhow::Result<Vec<Item>> {
            anyhow::bail!("catalog source error (500): boom")
        }

        async fn get_items(&self, _asins: &[String]) -> anyhow::Result<Vec<Item>> {
            anyhow::bail!("unreachable")
        }
    }

    fn node(name: Option<&str>, children: Vec<BrowseNode>) -> BrowseNode {
        BrowseNode {
            display_name: name.map(str::to_owned),
            browse_nodes: children,
        }
    }

    fn item_with_nodes(nodes: Vec<BrowseNode>) -> Item {
        Item {
            browse_node_info: Some(BrowseNodeInfo {
                browse_nodes: nodes,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn nested_nodes_flatten_into_deduplicated_categories() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();

        let source = StubSource {
            items: vec![item_with_nodes(vec![node(
                Some("Fantasy"),
                vec![
                    node(Some("Epic Fantasy"), Vec::new()),
                    // Nameless nodes are skipped, their children still visited.
                    node(None, vec![node(Some("Sword & Sorcery"), Vec::new())]),
                    node(Some("Fantasy"), Vec::new()),
                ],
            )])],
        };

        let saved = import_taxonomy(&source, &store, &NoDelay, "Books")
            .await
            .unwrap();
        assert_eq!(saved, 3);

        let names: Vec<String> = store
            .categories()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Epic Fantasy", "Fantasy", "Sword & Sorcery"]);
    }

    #[tokio::test]
    async fn existing_category_totals_survive_reimport() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();
        let existing = store.ensure_category("Fantasy").unwrap();
        store.set_category_total(existing.id, 12).unwrap();

        let source = StubSource {
            items: vec![item_with_nodes(vec![node(Some("Fantasy"), Vec::new())])],
        };
        import_taxonomy(&source, &store, &NoDelay, "Books")
            .await
            .unwrap();

        let categories = store.categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].total_books, 12);
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_empty_import() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();

        let saved = import_taxonomy(&FailingSource, &store, &NoDelay, "Books")
            .await
            .unwrap();
        assert_eq!(saved, 0);
        assert!(store.categories().unwrap().is_empty());
    }
}
