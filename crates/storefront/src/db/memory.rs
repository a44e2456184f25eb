//! In-process implementation of every persistence port.
//!
//! Mirrors the `PostgreSQL` constraints that the services rely on: unique
//! phone numbers, one active cart per user, restricted deletes in the
//! catalog, and version-guarded order writes. All state sits behind a single
//! async mutex, so each call is atomic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use partyrent_core::{
    CategoryGroup, CategoryGroupId, CategoryItem, CategoryItemId, Order, OrderId, OrderLine,
    OrderStatus, PhoneNumber, Price, Product, ProductId, UserId, UserRole,
};

use super::{
    CatalogStore, CustomerSnapshot, GroupInput, ItemInput, NewUser, OrderFilter, OrderStore, Page,
    Paged, ProductFilter, ProductInput, RepositoryError, ResetCodeStore, UserStore,
};
use crate::models::user::User;

#[derive(Default)]
struct Inner {
    next_id: i32,
    users: BTreeMap<UserId, (User, String)>,
    groups: BTreeMap<CategoryGroupId, GroupRecord>,
    items: BTreeMap<CategoryItemId, CategoryItem>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    reset_codes: BTreeMap<String, (String, DateTime<Utc>)>,
}

struct GroupRecord {
    title: String,
    border_color: Option<String>,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn group(&self, id: CategoryGroupId) -> Option<CategoryGroup> {
        let record = self.groups.get(&id)?;
        let mut items: Vec<CategoryItem> = self
            .items
            .values()
            .filter(|i| i.group_id == id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.position, i.id.as_i32()));
        Some(CategoryGroup {
            id,
            title: record.title.clone(),
            border_color: record.border_color.clone(),
            items,
        })
    }

    fn item_in_group(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<&CategoryItem, RepositoryError> {
        self.items
            .get(&id)
            .filter(|i| i.group_id == group_id)
            .ok_or(RepositoryError::NotFound)
    }

    fn active_cart(&self, user_id: UserId) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.user_id == user_id && !o.finalized)
    }

    fn new_cart(&mut self, customer: &CustomerSnapshot) -> Result<Order, RepositoryError> {
        if self.active_cart(customer.user_id).is_some() {
            return Err(RepositoryError::Conflict("active cart already exists".into()));
        }
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(self.next_id()),
            user_id: customer.user_id,
            customer_name: customer.name.clone(),
            customer_phone: customer.phone.clone(),
            customer_email: customer.email.clone(),
            lines: Vec::new(),
            total: Price::ZERO,
            status: OrderStatus::Pending,
            finalized: false,
            version: 0,
            created_at: now,
            updated_at: now,
            finalized_at: None,
        };
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    /// Look up an unfinalized order whose version matches.
    fn open_order_mut(
        &mut self,
        id: OrderId,
        expected_version: i32,
    ) -> Result<&mut Order, RepositoryError> {
        let order = self.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.finalized || order.version != expected_version {
            return Err(RepositoryError::Conflict(format!("order {id} was modified")));
        }
        Ok(order)
    }

    fn check_category(&self, input: &ProductInput) -> Result<(), RepositoryError> {
        if self.items.contains_key(&input.category.id) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

fn product_from(id: ProductId, input: ProductInput) -> Product {
    Product {
        id,
        name: input.name,
        price: input.price,
        thumbnail: input.thumbnail,
        image: input.image,
        category: input.category,
        description: input.description,
        dimensions: input.dimensions,
        stock: input.stock,
    }
}

/// All ports backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|(u, _)| u.phone == user.phone) {
            return Err(RepositoryError::Conflict("phone number already exists".into()));
        }
        let now = Utc::now();
        let created = User {
            id: UserId::new(inner.next_id()),
            phone: user.phone,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email.map(String::from),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        inner
            .users
            .insert(created.id, (created.clone(), user.password_hash));
        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn get_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|(u, _)| &u.phone == phone)
            .map(|(u, _)| u.clone()))
    }

    async fn get_credentials_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|(u, _)| &u.phone == phone)
            .cloned())
    }

    async fn update_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let (user, stored) = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        hash.clone_into(stored);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let (user, _) = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<CategoryGroup>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.groups.keys().filter_map(|id| inner.group(*id)).collect())
    }

    async fn get_group(
        &self,
        id: CategoryGroupId,
    ) -> Result<Option<CategoryGroup>, RepositoryError> {
        Ok(self.inner.lock().await.group(id))
    }

    async fn create_group(&self, input: GroupInput) -> Result<CategoryGroup, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let id = CategoryGroupId::new(inner.next_id());
        inner.groups.insert(
            id,
            GroupRecord {
                title: input.title,
                border_color: input.border_color,
            },
        );
        inner.group(id).ok_or(RepositoryError::NotFound)
    }

    async fn update_group(
        &self,
        id: CategoryGroupId,
        input: GroupInput,
    ) -> Result<CategoryGroup, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let record = inner.groups.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.title = input.title;
        record.border_color = input.border_color;
        inner.group(id).ok_or(RepositoryError::NotFound)
    }

    async fn delete_group(&self, id: CategoryGroupId) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.groups.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if inner.items.values().any(|i| i.group_id == id) {
            return Err(RepositoryError::Conflict(
                "category group is still referenced".into(),
            ));
        }
        inner.groups.remove(&id);
        Ok(())
    }

    async fn get_item(&self, id: CategoryItemId) -> Result<Option<CategoryItem>, RepositoryError> {
        Ok(self.inner.lock().await.items.get(&id).cloned())
    }

    async fn create_item(
        &self,
        group_id: CategoryGroupId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.groups.contains_key(&group_id) {
            return Err(RepositoryError::NotFound);
        }
        let position = inner
            .items
            .values()
            .filter(|i| i.group_id == group_id)
            .map(|i| i.position + 1)
            .max()
            .unwrap_or(0);
        let item = CategoryItem {
            id: CategoryItemId::new(inner.next_id()),
            group_id,
            title: input.title,
            image: input.image,
            position,
        };
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.item_in_group(group_id, id)?;
        for product in inner.products.values_mut() {
            if product.category.id == id {
                product.category.title.clone_from(&input.title);
            }
        }
        let item = inner.items.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        item.title = input.title;
        item.image = input.image;
        Ok(item.clone())
    }

    async fn delete_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<CategoryItem, RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.item_in_group(group_id, id)?;
        if inner.products.values().any(|p| p.category.id == id) {
            return Err(RepositoryError::Conflict(
                "category item is still referenced".into(),
            ));
        }
        inner.items.remove(&id).ok_or(RepositoryError::NotFound)
    }

    async fn count_products_for_item(&self, id: CategoryItemId) -> Result<i64, RepositoryError> {
        let inner = self.inner.lock().await;
        let count = inner
            .products
            .values()
            .filter(|p| p.category.id == id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn image_in_use(&self, reference: &str) -> Result<bool, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .values()
            .any(|p| p.images().any(|r| r == reference))
            || inner
                .items
                .values()
                .any(|i| i.image.as_deref() == Some(reference)))
    }

    async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .values()
            .filter(|p| filter.category_id.is_none_or(|c| p.category.id == c))
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.check_category(&input)?;
        let product = product_from(ProductId::new(inner.next_id()), input);
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Product, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.products.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        inner.check_category(&input)?;
        let product = product_from(id, input);
        inner.products.insert(id, product.clone());
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.products.remove(&id).ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn load_active(&self, user_id: UserId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.inner.lock().await.active_cart(user_id).cloned())
    }

    async fn create_active(&self, customer: &CustomerSnapshot) -> Result<Order, RepositoryError> {
        self.inner.lock().await.new_cart(customer)
    }

    async fn save_lines(
        &self,
        id: OrderId,
        lines: &[OrderLine],
        total: Price,
        expected_version: i32,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let order = inner.open_order_mut(id, expected_version)?;
        order.lines = lines.to_vec();
        order.total = total;
        order.version += 1;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn finalize(
        &self,
        id: OrderId,
        expected_version: i32,
    ) -> Result<(Order, Order), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let order = inner.open_order_mut(id, expected_version)?;
        let now = Utc::now();
        order.finalized = true;
        order.status = OrderStatus::Pending;
        order.finalized_at = Some(now);
        order.version += 1;
        order.updated_at = now;
        let finalized = order.clone();

        let customer = CustomerSnapshot {
            user_id: finalized.user_id,
            name: finalized.customer_name.clone(),
            phone: finalized.customer_phone.clone(),
            email: finalized.customer_email.clone(),
        };
        let cart = inner.new_cart(&customer)?;
        Ok((finalized, cart))
    }

    async fn return_to_cart(
        &self,
        source: OrderId,
        cart: OrderId,
        cart_version: i32,
    ) -> Result<(Order, Order), RepositoryError> {
        let mut inner = self.inner.lock().await;

        let src = inner.orders.get(&source).ok_or(RepositoryError::NotFound)?;
        if !src.is_awaiting_processing() {
            return Err(RepositoryError::Conflict(format!(
                "order {source} is not pending"
            )));
        }
        let (lines, total) = (src.lines.clone(), src.total);

        // Validate the cart before touching the source so a failure leaves
        // both untouched.
        inner.open_order_mut(cart, cart_version)?;

        let now = Utc::now();
        let cancelled = {
            let src = inner.orders.get_mut(&source).ok_or(RepositoryError::NotFound)?;
            src.status = OrderStatus::Cancelled;
            src.version += 1;
            src.updated_at = now;
            src.clone()
        };
        let updated = inner.open_order_mut(cart, cart_version)?;
        updated.lines = lines;
        updated.total = total;
        updated.version += 1;
        updated.updated_at = now;
        Ok((cancelled, updated.clone()))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.finalized)
            .cloned()
            .collect();
        orders.reverse();
        Ok(orders)
    }

    async fn list_finalized(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> Result<Paged<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        let matching: Vec<&Order> = inner
            .orders
            .values()
            .rev()
            .filter(|o| o.finalized)
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| filter.user_id.is_none_or(|u| o.user_id == u))
            .collect();

        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        Ok(Paged {
            total: i64::try_from(matching.len()).unwrap_or(i64::MAX),
            items: matching.into_iter().skip(skip).take(take).cloned().collect(),
            page,
        })
    }

    async fn set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let order = inner.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !order.finalized || order.status != from {
            return Err(RepositoryError::Conflict(format!("order {id} was modified")));
        }
        order.status = to;
        order.version += 1;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn pending_submission(
        &self,
        user_id: UserId,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.user_id == user_id && o.is_awaiting_processing())
            .map(|o| o.id))
    }
}

#[async_trait]
impl ResetCodeStore for MemoryStore {
    async fn put(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner
            .lock()
            .await
            .reset_codes
            .insert(phone.to_string(), (code_hash.to_owned(), expires_at));
        Ok(())
    }

    async fn take(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<(String, DateTime<Utc>)>, RepositoryError> {
        Ok(self.inner.lock().await.reset_codes.remove(phone.as_str()))
    }
}
