use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Executor, Postgres, Row};
use tracing::{debug, info};

use crate::dialogue::{Gender, Stage};
use crate::model::{
    Audience, Cart, CartItem, NewNotification, NewOrder, NewProduct, Notification, Order,
    OrderItem, OrderStatus, Product, ProductUpdate, ProfileUpdate, UserIdentity, UserProfile,
};
use crate::store::{CartStore, CatalogStore, UserStore};

const USER_COLUMNS: &str = "user_id, username, first_name, last_name, gender, name, phone, stage, \
                            last_message_id, registration_date, last_activity";
const PRODUCT_COLUMNS: &str = "id, name, price, description, is_active";
const ORDER_COLUMNS: &str = "id, user_id, total_amount, status, items, payment_reference, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, title, message, target_audience, scheduled_at, sent_at, is_sent, created_at";

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            user_id BIGINT PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            gender TEXT NOT NULL DEFAULT 'unset',
            name TEXT,
            phone TEXT,
            stage TEXT NOT NULL DEFAULT 'start',
            last_message_id INTEGER,
            registration_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_activity TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS users_stage_idx ON users (stage)")
        .execute(pool)
        .await
        .context("Failed to create users stage index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            price BIGINT NOT NULL CHECK (price > 0),
            description TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create products table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            total_amount BIGINT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            items JSONB NOT NULL DEFAULT '[]',
            payment_reference TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create orders table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS orders_user_idx ON orders (user_id)")
        .execute(pool)
        .await
        .context("Failed to create orders user index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notifications (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            target_audience TEXT NOT NULL DEFAULT 'all',
            scheduled_at TIMESTAMPTZ,
            sent_at TIMESTAMPTZ,
            is_sent BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create notifications table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cart_items (
            user_id BIGINT NOT NULL,
            product_id BIGINT NOT NULL,
            name TEXT NOT NULL,
            unit_price BIGINT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, product_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create cart_items table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<UserProfile> {
    let gender: String = row.try_get("gender")?;
    let stage: String = row.try_get("stage")?;
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        gender: gender.parse::<Gender>().map_err(anyhow::Error::msg)?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        stage: stage.parse::<Stage>().map_err(anyhow::Error::msg)?,
        last_message_id: row.try_get("last_message_id")?,
        registration_date: row.try_get("registration_date")?,
        last_activity: row.try_get("last_activity")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let items: Json<Vec<OrderItem>> = row.try_get("items")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total_amount: row.try_get("total_amount")?,
        status: status.parse::<OrderStatus>().map_err(anyhow::Error::msg)?,
        items: items.0,
        payment_reference: row.try_get("payment_reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let audience: String = row.try_get("target_audience")?;
    Ok(Notification {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        target_audience: audience.parse::<Audience>().map_err(anyhow::Error::msg)?,
        scheduled_at: row.try_get("scheduled_at")?,
        sent_at: row.try_get("sent_at")?,
        is_sent: row.try_get("is_sent")?,
        created_at: row.try_get("created_at")?,
    })
}

fn cart_item_from_row(row: &PgRow) -> Result<CartItem> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(CartItem {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        unit_price: row.try_get("unit_price")?,
        quantity: u32::try_from(quantity).context("Negative cart quantity")?,
    })
}

/// Postgres-backed store for users, catalog, orders, notifications and carts
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_users(&self, query: Query<'_, Postgres, PgArguments>) -> Result<Vec<UserProfile>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;
        rows.iter().map(user_from_row).collect()
    }

    async fn get_cart_items(&self, user_id: i64) -> Result<Cart> {
        let rows = sqlx::query(&format!("{CART_ITEMS_QUERY} ORDER BY created_at, product_id"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read cart")?;
        cart_from_rows(&rows)
    }
}

const CART_ITEMS_QUERY: &str =
    "SELECT product_id, name, unit_price, quantity FROM cart_items WHERE user_id = $1";

fn cart_from_rows(rows: &[PgRow]) -> Result<Cart> {
    Ok(Cart {
        items: rows.iter().map(cart_item_from_row).collect::<Result<_>>()?,
    })
}

async fn insert_order<'e, E>(executor: E, order: &NewOrder) -> Result<Order>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        "INSERT INTO orders (user_id, total_amount, status, items, payment_reference)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.user_id)
    .bind(order.total_amount())
    .bind(order.status.as_str())
    .bind(Json(&order.items))
    .bind(&order.payment_reference)
    .fetch_one(executor)
    .await
    .context("Failed to insert order")?;
    order_from_row(&row)
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserProfile> {
        debug!(user_id = identity.user_id, "Upserting user");

        let row = sqlx::query(&format!(
            "INSERT INTO users (user_id, username, first_name, last_name)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
                username = COALESCE(users.username, EXCLUDED.username),
                first_name = COALESCE(users.first_name, EXCLUDED.first_name),
                last_name = COALESCE(users.last_name, EXCLUDED.last_name),
                last_activity = NOW()
             RETURNING {USER_COLUMNS}"
        ))
        .bind(identity.user_id)
        .bind(&identity.username)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert user")?;

        user_from_row(&row)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_stage(&self, user_id: i64, stage: Stage) -> Result<()> {
        info!(user_id, stage = %stage, "Updating user stage");
        sqlx::query("UPDATE users SET stage = $1, last_activity = NOW() WHERE user_id = $2")
            .bind(stage.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update user stage")?;
        Ok(())
    }

    async fn set_field(&self, user_id: i64, update: &ProfileUpdate) -> Result<()> {
        let query = match update {
            ProfileUpdate::Gender(gender) => {
                sqlx::query("UPDATE users SET gender = $1, last_activity = NOW() WHERE user_id = $2")
                    .bind(gender.as_str().to_string())
            }
            ProfileUpdate::Name(name) => {
                sqlx::query("UPDATE users SET name = $1, last_activity = NOW() WHERE user_id = $2")
                    .bind(name.clone())
            }
            ProfileUpdate::Phone(phone) => {
                sqlx::query("UPDATE users SET phone = $1, last_activity = NOW() WHERE user_id = $2")
                    .bind(phone.as_str().to_string())
            }
        };
        query
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update user profile field")?;
        Ok(())
    }

    async fn set_last_message_id(&self, user_id: i64, message_id: Option<i32>) -> Result<()> {
        sqlx::query("UPDATE users SET last_message_id = $1 WHERE user_id = $2")
            .bind(message_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to record last message id")?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY user_id");
        self.fetch_users(sqlx::query(&sql)).await
    }

    async fn list_users_by_stage(&self, stage: Stage) -> Result<Vec<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE stage = $1 ORDER BY user_id");
        self.fetch_users(sqlx::query(&sql).bind(stage.as_str())).await
    }

    async fn list_active_since(&self, days: i64) -> Result<Vec<UserProfile>> {
        let since = Utc::now() - chrono::Duration::days(days);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE last_activity >= $1 ORDER BY user_id"
        );
        self.fetch_users(sqlx::query(&sql).bind(since)).await
    }

    async fn list_registered_since(&self, days: i64) -> Result<Vec<UserProfile>> {
        let since = Utc::now() - chrono::Duration::days(days);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE registration_date >= $1 ORDER BY user_id"
        );
        self.fetch_users(sqlx::query(&sql).bind(since)).await
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active OR $1 ORDER BY id"
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list products")?;
        rows.iter().map(product_from_row).collect()
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read product")?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (name, price, description) VALUES ($1, $2, $3)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.description)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert product")?;
        let created = product_from_row(&row)?;
        info!(product_id = created.id, name = %created.name, "Product created");
        Ok(created)
    }

    async fn update_product(
        &self,
        product_id: i64,
        update: &ProductUpdate,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "UPDATE products SET
                name = COALESCE($1, name),
                price = COALESCE($2, price),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active)
             WHERE id = $5
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&update.name)
        .bind(update.price)
        .bind(&update.description)
        .bind(update.is_active)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update product")?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete product")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        let created = insert_order(&self.pool, order).await?;
        info!(order_id = created.id, user_id = created.user_id, status = %created.status, "Order created");
        Ok(created)
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read order")?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, payment_reference = COALESCE($2, payment_reference)
             WHERE id = $3 AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(payment_reference)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .context("Failed to update order status")?;
        let updated = result.rows_affected() > 0;
        info!(order_id, status = %status, updated, "Order status update");
        Ok(updated)
    }

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user orders")?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list orders")?;
        rows.iter().map(order_from_row).collect()
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notifications (title, message, target_audience, scheduled_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.target_audience.to_string())
        .bind(notification.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert notification")?;
        notification_from_row(&row)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list notifications")?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn list_due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE NOT is_sent AND (scheduled_at IS NULL OR scheduled_at <= $1)
             ORDER BY scheduled_at NULLS FIRST, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list due notifications")?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_sent(
        &self,
        notification_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_sent = TRUE, sent_at = $1 WHERE id = $2")
            .bind(sent_at)
            .bind(notification_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark notification as sent")?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn add_item(&self, user_id: i64, product: &Product, quantity: u32) -> Result<Cart> {
        let quantity = i32::try_from(quantity).context("Cart quantity too large")?;
        // The first add fixes the unit price; later adds only bump the quantity
        sqlx::query(
            "INSERT INTO cart_items (user_id, product_id, name, unit_price, quantity)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                updated_at = NOW()",
        )
        .bind(user_id)
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .context("Failed to add cart item")?;
        self.get_cart_items(user_id).await
    }

    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<Cart> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove cart item")?;
        self.get_cart_items(user_id).await
    }

    async fn get_cart(&self, user_id: i64) -> Result<Cart> {
        self.get_cart_items(user_id).await
    }

    async fn clear_cart(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to clear cart")?;
        Ok(())
    }

    /// Orders live in the same database, so the insert and the cart delete share a transaction
    async fn checkout(&self, user_id: i64, _catalog: &dyn CatalogStore) -> Result<Option<Order>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start checkout transaction")?;

        let rows = sqlx::query(&format!(
            "{CART_ITEMS_QUERY} ORDER BY created_at, product_id FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to lock cart for checkout")?;
        let cart = cart_from_rows(&rows)?;
        if cart.is_empty() {
            return Ok(None);
        }

        let order = insert_order(&mut *tx, &NewOrder::from_cart(user_id, &cart)).await?;
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear cart at checkout")?;

        tx.commit().await.context("Failed to commit checkout")?;
        info!(order_id = order.id, user_id, total = order.total_amount, "Checkout committed");
        Ok(Some(order))
    }
}

/// Products created when the catalog is empty
pub fn default_products() -> Vec<NewProduct> {
    vec![
        NewProduct {
            name: "Basic course".to_string(),
            price: 5000,
            description: "Full basic course with all materials".to_string(),
        },
        NewProduct {
            name: "Advanced course".to_string(),
            price: 10000,
            description: "Extended course with personal support".to_string(),
        },
        NewProduct {
            name: "Individual consultation".to_string(),
            price: 3000,
            description: "One-on-one consultation, 60 minutes".to_string(),
        },
        NewProduct {
            name: "Group workshop".to_string(),
            price: 1500,
            description: "Group session on practical application".to_string(),
        },
    ]
}

/// Seeds the default catalog when no products exist. Returns how many were created.
pub async fn seed_default_products(catalog: &dyn CatalogStore) -> Result<usize> {
    if !catalog.list_products(true).await?.is_empty() {
        return Ok(0);
    }
    let products = default_products();
    for product in &products {
        catalog.create_product(product).await?;
    }
    info!(count = products.len(), "Seeded default products");
    Ok(products.len())
}
