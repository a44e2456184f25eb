//! Cart and order lifecycle.
//!
//! Each user has exactly one unfinalized order, the active cart. A
//! [`CartSession`] holds that order for the duration of a request; every
//! mutation builds the new line list, recomputes the total, and writes it
//! with the version it last saw. A stale version surfaces as
//! [`CartError::Conflict`] and the session keeps its previous state.

use thiserror::Error;
use tracing::instrument;

use partyrent_core::{Order, OrderId, OrderLine, OrderStatus, PriceError, ProductId, Quantity};

use crate::db::{CatalogStore, CustomerSnapshot, OrderStore, RepositoryError};

/// Errors from cart and order operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("product not found")]
    ProductNotFound,

    #[error("product is not in the cart")]
    LineNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("cart is empty")]
    EmptyCart,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Conflict(String),

    #[error("cart total out of range: {0}")]
    Amount(#[from] PriceError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CartError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::NotFound => Self::OrderNotFound,
            other => Self::Repository(other),
        }
    }
}

/// Result of adding a product.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// The cart was updated.
    Added,
    /// Nothing changed because an earlier order still awaits processing.
    Blocked { pending_order_id: OrderId },
}

/// Opens cart sessions.
pub struct CartService<'a> {
    orders: &'a dyn OrderStore,
    catalog: &'a dyn CatalogStore,
    block_while_pending: bool,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        catalog: &'a dyn CatalogStore,
        block_while_pending: bool,
    ) -> Self {
        Self {
            orders,
            catalog,
            block_while_pending,
        }
    }

    /// Load the customer's active cart, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip_all, fields(user_id = %customer.user_id))]
    pub async fn start(&self, customer: &CustomerSnapshot) -> Result<CartSession<'a>, CartError> {
        let cart = match self.orders.load_active(customer.user_id).await? {
            Some(cart) => cart,
            None => match self.orders.create_active(customer).await {
                Ok(cart) => cart,
                // A concurrent request created it first.
                Err(RepositoryError::Conflict(_)) => self
                    .orders
                    .load_active(customer.user_id)
                    .await?
                    .ok_or_else(|| CartError::Conflict("active cart changed concurrently".into()))?,
                Err(e) => return Err(e.into()),
            },
        };

        Ok(CartSession {
            orders: self.orders,
            catalog: self.catalog,
            block_while_pending: self.block_while_pending,
            cart,
        })
    }
}

/// The active cart of one user.
pub struct CartSession<'a> {
    orders: &'a dyn OrderStore,
    catalog: &'a dyn CatalogStore,
    block_while_pending: bool,
    cart: Order,
}

impl CartSession<'_> {
    /// Current cart state.
    #[must_use]
    pub const fn cart(&self) -> &Order {
        &self.cart
    }

    #[must_use]
    pub fn into_cart(self) -> Order {
        self.cart
    }

    /// Add one unit of a product. An existing line is incremented; a new
    /// line captures the product's current price.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` for an unknown product and
    /// `CartError::Conflict` if the cart changed underneath us.
    #[instrument(skip(self), fields(order_id = %self.cart.id))]
    pub async fn add_item(&mut self, product_id: ProductId) -> Result<AddOutcome, CartError> {
        if self.block_while_pending
            && let Some(pending_order_id) =
                self.orders.pending_submission(self.cart.user_id).await?
        {
            tracing::debug!(%pending_order_id, "Add blocked by pending order");
            return Ok(AddOutcome::Blocked { pending_order_id });
        }

        let mut lines = self.cart.lines.clone();
        if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line.quantity.incremented();
        } else {
            let product = self
                .catalog
                .get_product(product_id)
                .await?
                .ok_or(CartError::ProductNotFound)?;
            lines.push(OrderLine {
                product_id,
                name: product.name,
                quantity: Quantity::ONE,
                unit_price: product.price,
            });
        }

        self.persist(lines).await?;
        Ok(AddOutcome::Added)
    }

    /// Set the quantity of a line already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the product is not in the cart
    /// and `CartError::Amount` if the new total would be out of range.
    #[instrument(skip(self), fields(order_id = %self.cart.id))]
    pub async fn update_quantity(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        let mut lines = self.cart.lines.clone();
        let line = lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::LineNotFound)?;
        line.quantity = quantity;

        self.persist(lines).await
    }

    /// Remove a line. Removing a product that is not in the cart does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Conflict` if the cart changed underneath us.
    #[instrument(skip(self), fields(order_id = %self.cart.id))]
    pub async fn remove_item(&mut self, product_id: ProductId) -> Result<(), CartError> {
        if self.cart.line(product_id).is_none() {
            return Ok(());
        }

        let lines = self
            .cart
            .lines
            .iter()
            .filter(|l| l.product_id != product_id)
            .cloned()
            .collect();
        self.persist(lines).await
    }

    /// Submit the cart as an order. The session moves on to the fresh empty
    /// cart; the finalized order is returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::EmptyCart` for a cart without lines.
    #[instrument(skip(self), fields(order_id = %self.cart.id))]
    pub async fn finalize(&mut self) -> Result<Order, CartError> {
        if self.cart.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let (finalized, cart) = self
            .orders
            .finalize(self.cart.id, self.cart.version)
            .await?;
        self.cart = cart;

        tracing::info!(
            order_id = %finalized.id,
            total = %finalized.total,
            lines = finalized.lines.len(),
            "Order submitted"
        );
        Ok(finalized)
    }

    /// Move a submitted order back into this cart for editing. The cart's
    /// lines are replaced and the source order is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OrderNotFound` unless `source` is a finalized
    /// order of the cart's owner, and `CartError::InvalidTransition` unless
    /// it is still pending.
    #[instrument(skip(self), fields(order_id = %self.cart.id))]
    pub async fn return_to_cart(&mut self, source: OrderId) -> Result<Order, CartError> {
        let order = self
            .orders
            .get(source)
            .await?
            .filter(|o| o.user_id == self.cart.user_id && o.finalized)
            .ok_or(CartError::OrderNotFound)?;

        if !order.is_awaiting_processing() {
            return Err(CartError::InvalidTransition(format!(
                "only pending orders can be returned to the cart (order is {})",
                order.status
            )));
        }

        let (cancelled, cart) = self
            .orders
            .return_to_cart(source, self.cart.id, self.cart.version)
            .await?;
        self.cart = cart;

        tracing::info!(source = %source, "Order returned to cart");
        Ok(cancelled)
    }

    /// The single write path: recompute the total and save. A total out of
    /// range fails before anything is written.
    async fn persist(&mut self, lines: Vec<OrderLine>) -> Result<(), CartError> {
        let total = Order::compute_total(&lines)?;
        self.cart = self
            .orders
            .save_lines(self.cart.id, &lines, total, self.cart.version)
            .await?;
        Ok(())
    }
}

/// Move a submitted order to another status.
///
/// # Errors
///
/// Returns `CartError::OrderNotFound` for unknown or unfinalized orders,
/// `CartError::InvalidTransition` when the status table forbids the move,
/// and `CartError::Conflict` if the status changed concurrently.
#[instrument(skip(orders))]
pub async fn change_status(
    orders: &dyn OrderStore,
    id: OrderId,
    to: OrderStatus,
) -> Result<Order, CartError> {
    let order = orders
        .get(id)
        .await?
        .filter(|o| o.finalized)
        .ok_or(CartError::OrderNotFound)?;

    if !order.status.can_transition_to(to) {
        return Err(CartError::InvalidTransition(format!(
            "cannot move an order from {} to {to}",
            order.status
        )));
    }

    let order = orders.set_status(id, order.status, to).await?;
    tracing::info!(order_id = %id, status = %to, "Order status changed");
    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use partyrent_core::{CategoryRef, Dimensions, Price, UserId};

    use super::*;
    use crate::db::{GroupInput, ItemInput, MemoryStore, ProductInput};

    fn customer(id: i32) -> CustomerSnapshot {
        CustomerSnapshot {
            user_id: UserId::new(id),
            name: "Sara Karimi".into(),
            phone: "09123456789".into(),
            email: None,
        }
    }

    async fn product(store: &MemoryStore, name: &str, amount: i64) -> ProductId {
        product_at(store, name, price(amount)).await
    }

    async fn product_at(store: &MemoryStore, name: &str, price: Price) -> ProductId {
        let group = store
            .create_group(GroupInput {
                title: "Furniture".into(),
                border_color: None,
            })
            .await
            .unwrap();
        let item = store
            .create_item(
                group.id,
                ItemInput {
                    title: "Chairs".into(),
                    image: None,
                },
            )
            .await
            .unwrap();
        store
            .create_product(ProductInput {
                name: name.into(),
                price,
                thumbnail: None,
                image: None,
                category: CategoryRef {
                    id: item.id,
                    title: item.title,
                },
                description: String::new(),
                dimensions: Dimensions::default(),
                stock: 10,
            })
            .await
            .unwrap()
            .id
    }

    fn price(amount: i64) -> Price {
        Price::new(Decimal::from(amount)).unwrap()
    }

    #[tokio::test]
    async fn test_add_same_product_twice_increments() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();

        session.add_item(a).await.unwrap();
        session.add_item(a).await.unwrap();

        assert_eq!(session.cart().lines.len(), 1);
        assert_eq!(session.cart().lines[0].quantity.get(), 2);
        assert_eq!(session.cart().total, price(2000));
    }

    #[tokio::test]
    async fn test_totals_follow_mutations() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let b = product(&store, "Table", 500).await;
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();

        session.add_item(a).await.unwrap();
        session.update_quantity(a, Quantity::coerce(2)).await.unwrap();
        session.add_item(b).await.unwrap();
        assert_eq!(session.cart().total, price(2500));

        session.remove_item(a).await.unwrap();
        assert_eq!(session.cart().total, price(500));
        assert!(session.cart().line(a).is_none());

        let stored = store.load_active(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.total, price(500));
    }

    #[tokio::test]
    async fn test_total_out_of_range_is_rejected_without_writing() {
        let store = MemoryStore::new();
        let top = Price::unit(Price::max_unit_amount()).unwrap();
        let a = product_at(&store, "Marquee", top).await;
        let b = product_at(&store, "Ballroom", top).await;
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();

        session.add_item(a).await.unwrap();
        session
            .update_quantity(a, Quantity::coerce(9_999_999_999))
            .await
            .unwrap();
        assert_eq!(session.cart().lines[0].quantity, Quantity::MAX);

        session.add_item(b).await.unwrap();
        let version = session.cart().version;
        assert!(matches!(
            session.update_quantity(b, Quantity::MAX).await,
            Err(CartError::Amount(PriceError::Overflow))
        ));
        assert_eq!(session.cart().version, version);
        assert_eq!(session.cart().line(b).unwrap().quantity, Quantity::ONE);

        let stored = store.load_active(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.version, version);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = MemoryStore::new();
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();
        let version = session.cart().version;

        session.remove_item(ProductId::new(42)).await.unwrap();
        assert_eq!(session.cart().version, version);
    }

    #[tokio::test]
    async fn test_update_absent_line_fails() {
        let store = MemoryStore::new();
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();
        assert!(matches!(
            session.update_quantity(ProductId::new(42), Quantity::ONE).await,
            Err(CartError::LineNotFound)
        ));
    }

    #[tokio::test]
    async fn test_unknown_product_not_found() {
        let store = MemoryStore::new();
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();
        assert!(matches!(
            session.add_item(ProductId::new(42)).await,
            Err(CartError::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn test_finalize_then_block_while_pending() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let service = CartService::new(&store, &store, true);
        let mut session = service.start(&customer(1)).await.unwrap();

        session.add_item(a).await.unwrap();
        let old_id = session.cart().id;
        let finalized = session.finalize().await.unwrap();

        assert_eq!(finalized.id, old_id);
        assert!(finalized.finalized);
        assert_eq!(finalized.status, OrderStatus::Pending);
        assert_eq!(finalized.total, price(1000));
        assert_ne!(session.cart().id, old_id);
        assert!(session.cart().is_empty());

        match session.add_item(a).await.unwrap() {
            AddOutcome::Blocked { pending_order_id } => assert_eq!(pending_order_id, old_id),
            AddOutcome::Added => panic!("add should be blocked"),
        }
        assert!(session.cart().is_empty());
    }

    #[tokio::test]
    async fn test_pending_guard_can_be_disabled() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let mut session = CartService::new(&store, &store, false)
            .start(&customer(1))
            .await
            .unwrap();

        session.add_item(a).await.unwrap();
        session.finalize().await.unwrap();
        assert!(matches!(
            session.add_item(a).await.unwrap(),
            AddOutcome::Added
        ));
    }

    #[tokio::test]
    async fn test_empty_cart_cannot_finalize() {
        let store = MemoryStore::new();
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();
        assert!(matches!(session.finalize().await, Err(CartError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_return_to_cart_cancels_source() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let service = CartService::new(&store, &store, true);
        let mut session = service.start(&customer(1)).await.unwrap();
        session.add_item(a).await.unwrap();
        session.add_item(a).await.unwrap();
        let submitted = session.finalize().await.unwrap();

        let cancelled = session.return_to_cart(submitted.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(session.cart().lines, submitted.lines);
        assert_eq!(session.cart().total, price(2000));

        // Cancelled orders cannot be returned again
        assert!(matches!(
            session.return_to_cart(submitted.id).await,
            Err(CartError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_return_to_cart_rejects_other_users_order() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let service = CartService::new(&store, &store, true);

        let mut alice = service.start(&customer(1)).await.unwrap();
        alice.add_item(a).await.unwrap();
        let submitted = alice.finalize().await.unwrap();

        let mut bob = service.start(&customer(2)).await.unwrap();
        assert!(matches!(
            bob.return_to_cart(submitted.id).await,
            Err(CartError::OrderNotFound)
        ));
    }

    #[tokio::test]
    async fn test_stale_session_conflicts() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let service = CartService::new(&store, &store, true);

        let mut first = service.start(&customer(1)).await.unwrap();
        let mut second = service.start(&customer(1)).await.unwrap();
        assert_eq!(first.cart().id, second.cart().id);

        first.add_item(a).await.unwrap();
        assert!(matches!(
            second.add_item(a).await,
            Err(CartError::Conflict(_))
        ));
        assert!(second.cart().is_empty());
    }

    #[tokio::test]
    async fn test_change_status_follows_table() {
        let store = MemoryStore::new();
        let a = product(&store, "Chair", 1000).await;
        let mut session = CartService::new(&store, &store, true)
            .start(&customer(1))
            .await
            .unwrap();
        session.add_item(a).await.unwrap();
        let order = session.finalize().await.unwrap();

        assert!(matches!(
            change_status(&store, order.id, OrderStatus::Completed).await,
            Err(CartError::InvalidTransition(_))
        ));
        let order = change_status(&store, order.id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        // The active cart is not an order yet
        assert!(matches!(
            change_status(&store, session.cart().id, OrderStatus::Processing).await,
            Err(CartError::OrderNotFound)
        ));
    }
}
