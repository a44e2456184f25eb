//! Catalog records: category groups, their items, and products.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CategoryGroupId, CategoryItemId, ProductId};
use super::price::Price;

/// A top-level category with its nested items, e.g. "Tables & Chairs".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
    pub id: CategoryGroupId,
    pub title: String,
    /// CSS color for the group card border. Cosmetic only.
    pub border_color: Option<String>,
    /// Items in display order.
    pub items: Vec<CategoryItem>,
}

/// A sub-category. Item IDs are unique across all groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryItem {
    pub id: CategoryItemId,
    pub group_id: CategoryGroupId,
    pub title: String,
    pub image: Option<String>,
    pub position: i32,
}

/// A product's link to its category item, with the title copied at write
/// time so product listings need no join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: CategoryItemId,
    pub title: String,
}

/// Physical size and weight. All values are non-negative; zero means
/// unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
}

impl Dimensions {
    /// Decimal places a measurement may carry.
    pub const SCALE: u32 = 2;

    /// Largest allowed measurement.
    #[must_use]
    pub fn max_value() -> Decimal {
        Decimal::new(9_999_999_999, Self::SCALE)
    }

    /// Whether every measurement is between zero and
    /// [`Dimensions::max_value`] with at most [`Dimensions::SCALE`] decimal
    /// places.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.length, self.width, self.height, self.weight]
            .iter()
            .all(|v| {
                (!v.is_sign_negative() || v.is_zero())
                    && *v <= Self::max_value()
                    && v.normalize().scale() <= Self::SCALE
            })
    }
}

/// A rentable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// Resized image reference for listings.
    pub thumbnail: Option<String>,
    /// Original-resolution image reference.
    pub image: Option<String>,
    pub category: CategoryRef,
    pub description: String,
    pub dimensions: Dimensions,
    pub stock: i32,
}

impl Product {
    /// Image references owned by this product.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.thumbnail.iter().chain(self.image.iter()).map(String::as_str)
    }
}
