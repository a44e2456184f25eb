//! Orders and order lines.
//!
//! A user owns at most one unfinalized order at a time; that order is the
//! active cart. Everything else is finalized history whose only mutable
//! field is [`OrderStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{OrderId, ProductId, UserId};
use super::price::{Price, PriceError};
use super::status::OrderStatus;

/// Number of units on an order line. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Most units a single line may hold.
    pub const MAX: Self = Self(9_999);

    /// Create a quantity, returning `None` for zero or anything above
    /// [`Quantity::MAX`].
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 || value > Self::MAX.0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Clamp any client-supplied number into a valid quantity.
    ///
    /// Zero and negative values become one; large values become
    /// [`Quantity::MAX`].
    #[must_use]
    pub fn coerce(value: i64) -> Self {
        if value < 1 {
            return Self::ONE;
        }
        u32::try_from(value)
            .ok()
            .and_then(Self::new)
            .unwrap_or(Self::MAX)
    }

    /// The unit count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// One more unit, saturating at [`Quantity::MAX`].
    #[must_use]
    pub const fn incremented(self) -> Self {
        if self.0 >= Self::MAX.0 {
            Self::MAX
        } else {
            Self(self.0 + 1)
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<u32> for Quantity {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("quantity must be between 1 and {}", Self::MAX))
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One product on an order, with the price captured when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    /// Product name at the time the line was created.
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl OrderLine {
    /// `unit_price × quantity`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the subtotal is out of range.
    pub fn subtotal(&self) -> Result<Price, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

/// An order, either the active cart (`finalized == false`) or history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub lines: Vec<OrderLine>,
    pub total: Price,
    pub status: OrderStatus,
    pub finalized: bool,
    /// Incremented on every write; a stale expected version is a conflict.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Sum of every line's subtotal.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the total is out of range.
    pub fn compute_total(lines: &[OrderLine]) -> Result<Price, PriceError> {
        lines
            .iter()
            .try_fold(Price::ZERO, |total, line| total.checked_add(line.subtotal()?))
    }

    /// Find the line for a product.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Whether the order has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether this is a submitted order still waiting for the shop.
    #[must_use]
    pub fn is_awaiting_processing(&self) -> bool {
        self.finalized && self.status == OrderStatus::Pending
    }
}
