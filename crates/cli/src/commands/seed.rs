//! Seed the catalog from a YAML file.
//!
//! The file lists category groups, their items, and the products filed
//! under each item:
//!
//! ```yaml
//! - title: Furniture
//!   borderColor: "#f4a261"
//!   items:
//!     - title: Chairs
//!       products:
//!         - name: Folding chair
//!           price: "4.50"
//!           stock: 120
//! ```
//!
//! Groups whose title already exists are skipped, so reseeding is safe.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use partyrent_storefront::services::catalog::{
    CatalogError, CatalogService, GroupDraft, ItemDraft, ProductDraft,
};
use partyrent_storefront::services::images::LocalImageStore;
use partyrent_storefront::state::Stores;

use super::connect;

/// One category group with its items.
#[derive(Debug, Deserialize)]
pub struct SeedGroup {
    #[serde(flatten)]
    pub group: GroupDraft,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

/// One category item with its products.
#[derive(Debug, Deserialize)]
pub struct SeedItem {
    #[serde(flatten)]
    pub item: ItemDraft,
    #[serde(default)]
    pub products: Vec<ProductDraft>,
}

/// What a seeding run did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub groups: usize,
    pub items: usize,
    pub products: usize,
    pub skipped_groups: usize,
}

/// Parse a seed file's contents.
///
/// # Errors
///
/// Returns the YAML error if the document does not match the seed layout.
pub fn parse(content: &str) -> Result<Vec<SeedGroup>, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

/// Create everything in `groups` through the catalog service, skipping
/// groups whose title is already taken.
///
/// # Errors
///
/// Returns `CatalogError` on the first record that fails validation or
/// storage.
pub async fn apply(
    catalog: &CatalogService,
    groups: Vec<SeedGroup>,
) -> Result<SeedSummary, CatalogError> {
    let existing = catalog.groups().await?;
    let mut summary = SeedSummary::default();

    for seed in groups {
        if existing
            .iter()
            .any(|g| g.title.eq_ignore_ascii_case(seed.group.title.trim()))
        {
            info!(title = %seed.group.title, "Group exists, skipping");
            summary.skipped_groups += 1;
            continue;
        }

        let group = catalog.create_group(seed.group).await?;
        summary.groups += 1;

        for seed_item in seed.items {
            let item = catalog.create_item(group.id, seed_item.item).await?;
            summary.items += 1;

            for mut product in seed_item.products {
                product.category_id = Some(item.id);
                catalog.create_product(product).await?;
                summary.products += 1;
            }
        }
    }

    Ok(summary)
}

/// Seed the catalog from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the database is
/// unreachable, or a record fails validation.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog seed");
    let content = tokio::fs::read_to_string(path).await?;
    let groups = parse(&content)?;
    info!(groups = groups.len(), "Parsed seed file");

    let pool = connect().await?;
    let stores = Stores::postgres(&pool);
    let upload_dir =
        std::env::var("STOREFRONT_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_owned());
    let catalog = CatalogService::new(stores.catalog, Arc::new(LocalImageStore::new(upload_dir)));

    let summary = apply(&catalog, groups).await?;

    info!("Seeding complete!");
    info!("  Groups created: {}", summary.groups);
    info!("  Items created: {}", summary.items);
    info!("  Products created: {}", summary.products);
    info!("  Groups skipped (already exist): {}", summary.skipped_groups);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyrent_storefront::db::MemoryStore;

    const SEED: &str = r##"
- title: Furniture
  borderColor: "#f4a261"
  items:
    - title: Chairs
      products:
        - name: Folding chair
          price: "4.50"
          stock: 120
        - name: Chiavari chair
          price: "9.00"
    - title: Tables
- title: Lighting
"##;

    fn service() -> CatalogService {
        let images = Arc::new(LocalImageStore::new(std::env::temp_dir()));
        CatalogService::new(Arc::new(MemoryStore::new()), images)
    }

    #[test]
    fn test_parse_nested_layout() {
        let groups = parse(SEED).expect("seed parses");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group.border_color.as_deref(), Some("#f4a261"));
        assert_eq!(groups[0].items.len(), 2);
        assert_eq!(groups[0].items[0].products.len(), 2);
        assert!(groups[1].items.is_empty());
    }

    #[tokio::test]
    async fn test_apply_links_products_to_items() {
        let catalog = service();
        let summary = apply(&catalog, parse(SEED).expect("seed parses"))
            .await
            .expect("seed applies");

        assert_eq!(
            summary,
            SeedSummary {
                groups: 2,
                items: 2,
                products: 2,
                skipped_groups: 0,
            }
        );

        let groups = catalog.groups().await.expect("groups");
        let chairs = groups
            .iter()
            .flat_map(|g| g.items.iter())
            .find(|i| i.title == "Chairs")
            .expect("chairs item");
        let products = catalog
            .products(partyrent_storefront::db::ProductFilter {
                category_id: Some(chairs.id),
            })
            .await
            .expect("products");
        assert_eq!(products.len(), 2);
    }

    #[tokio::test]
    async fn test_demo_catalog_applies() {
        let groups =
            parse(include_str!("../../seed/demo-catalog.yaml")).expect("demo parses");
        let summary = apply(&service(), groups).await.expect("demo applies");
        assert_eq!(summary.groups, 3);
        assert_eq!(summary.items, 5);
        assert_eq!(summary.products, 10);
    }

    #[tokio::test]
    async fn test_reseeding_skips_existing_groups() {
        let catalog = service();
        apply(&catalog, parse(SEED).expect("seed parses"))
            .await
            .expect("first run");

        let summary = apply(&catalog, parse(SEED).expect("seed parses"))
            .await
            .expect("second run");
        assert_eq!(summary.skipped_groups, 2);
        assert_eq!(summary.products, 0);
    }
}
