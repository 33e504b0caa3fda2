//! Admin API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::dialogue::{validate_name, Gender, PhoneNumber, Stage};
use crate::model::{
    saturating_total, NewNotification, NewProduct, Notification, Order, OrderStatus, Product,
    ProductUpdate, ProfileUpdate, UserProfile,
};

use super::error::{ApiError, AppResult};
use super::AdminState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub product_id: i64,
    pub name: String,
    pub quantity: u64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub registered_users: usize,
    pub total_orders: usize,
    pub paid_orders: usize,
    pub total_products: usize,
    /// Sum over paid orders
    pub revenue: i64,
    pub new_users_today: usize,
    pub product_sales: Vec<ProductSales>,
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(State(state): State<AdminState>) -> AppResult<Json<DashboardStats>> {
    let users = state.users.list_users().await?;
    let orders = state.catalog.list_orders().await?;
    let products = state.catalog.list_products(true).await?;
    let today = Utc::now().date_naive();

    let paid: Vec<&Order> = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Paid)
        .collect();

    let mut sales: BTreeMap<i64, ProductSales> = BTreeMap::new();
    for item in paid.iter().flat_map(|order| order.items.iter()) {
        let entry = sales.entry(item.product_id).or_insert_with(|| ProductSales {
            product_id: item.product_id,
            name: item.name.clone(),
            quantity: 0,
            revenue: 0,
        });
        entry.quantity += u64::from(item.quantity);
        entry.revenue = entry.revenue.saturating_add(item.line_total());
    }

    Ok(Json(DashboardStats {
        total_users: users.len(),
        registered_users: users.iter().filter(|u| u.stage.is_registered()).count(),
        total_orders: orders.len(),
        paid_orders: paid.len(),
        total_products: products.len(),
        revenue: saturating_total(paid.iter().map(|order| order.total_amount)),
        new_users_today: users
            .iter()
            .filter(|u| u.registration_date.date_naive() == today)
            .count(),
        product_sales: sales.into_values().collect(),
    }))
}

/// GET /api/users
pub async fn list_users(State(state): State<AdminState>) -> AppResult<Json<Vec<UserProfile>>> {
    Ok(Json(state.users.list_users().await?))
}

#[derive(Debug, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub orders: Vec<Order>,
}

async fn load_user(state: &AdminState, user_id: i64) -> AppResult<UserProfile> {
    state
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AdminState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserDetails>> {
    let profile = load_user(&state, user_id).await?;
    let orders = state.catalog.list_orders_by_user(user_id).await?;
    Ok(Json(UserDetails { profile, orders }))
}

/// Fields an administrator may change on a profile.
///
/// Gender and stage arrive as plain strings so that unknown values are
/// reported as a bad request rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub stage: Option<String>,
}

impl UpdateUserRequest {
    /// Validates every field before anything is written
    pub fn into_updates(self) -> AppResult<(Vec<ProfileUpdate>, Option<Stage>)> {
        let mut updates = Vec::new();
        if let Some(gender) = self.gender {
            let gender = gender.parse::<Gender>().map_err(ApiError::BadRequest)?;
            updates.push(ProfileUpdate::Gender(gender));
        }
        if let Some(name) = self.name {
            let name = validate_name(&name)
                .map_err(|reason| ApiError::BadRequest(format!("invalid name: {reason}")))?;
            updates.push(ProfileUpdate::Name(name));
        }
        if let Some(phone) = self.phone {
            let phone = PhoneNumber::parse(&phone)
                .map_err(|reason| ApiError::BadRequest(format!("invalid phone: {reason}")))?;
            updates.push(ProfileUpdate::Phone(phone));
        }
        let stage = self
            .stage
            .map(|stage| stage.parse::<Stage>().map_err(ApiError::BadRequest))
            .transpose()?;
        Ok((updates, stage))
    }
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AdminState>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    load_user(&state, user_id).await?;
    let (updates, stage) = request.into_updates()?;

    for update in &updates {
        state.users.set_field(user_id, update).await?;
    }
    if let Some(stage) = stage {
        state.users.set_stage(user_id, stage).await?;
    }
    info!(user_id, fields = updates.len(), stage = ?stage, "User updated through admin API");

    Ok(Json(load_user(&state, user_id).await?))
}

/// GET /api/products
pub async fn list_active_products(State(state): State<AdminState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products(false).await?))
}

/// GET /api/admin/products
pub async fn list_all_products(State(state): State<AdminState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products(true).await?))
}

/// POST /api/admin/products
pub async fn create_product(
    State(state): State<AdminState>,
    Json(request): Json<NewProduct>,
) -> AppResult<(StatusCode, Json<Product>)> {
    request
        .validate()
        .map_err(|reason| ApiError::BadRequest(reason.to_string()))?;
    let product = state.catalog.create_product(&request).await?;
    info!(product_id = product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/admin/products/:id
pub async fn update_product(
    State(state): State<AdminState>,
    Path(product_id): Path<i64>,
    Json(request): Json<ProductUpdate>,
) -> AppResult<Json<Product>> {
    request
        .validate()
        .map_err(|reason| ApiError::BadRequest(reason.to_string()))?;
    let product = state
        .catalog
        .update_product(product_id, &request)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {product_id}")))?;
    info!(product_id, "Product updated");
    Ok(Json(product))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// DELETE /api/admin/products/:id
pub async fn delete_product(
    State(state): State<AdminState>,
    Path(product_id): Path<i64>,
) -> AppResult<Json<DeletedResponse>> {
    if !state.catalog.delete_product(product_id).await? {
        return Err(ApiError::NotFound(format!("product {product_id}")));
    }
    info!(product_id, "Product deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}

/// GET /api/orders
pub async fn list_orders(State(state): State<AdminState>) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.catalog.list_orders().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// PUT /api/orders/:id/status
pub async fn update_order_status(
    State(state): State<AdminState>,
    Path(order_id): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .catalog
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id}")))?;

    if !order.status.can_transition_to(request.status) {
        return Err(ApiError::Conflict(format!(
            "order {order_id} cannot move from {} to {}",
            order.status, request.status
        )));
    }

    let updated = state
        .catalog
        .update_order_status(order_id, request.status, request.payment_reference.as_deref())
        .await?;
    if !updated {
        return Err(ApiError::Conflict(format!("order {order_id} is no longer pending")));
    }
    info!(order_id, status = %request.status, "Order status changed through admin API");

    let order = state
        .catalog
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id}")))?;
    Ok(Json(order))
}

/// GET /api/notifications
pub async fn list_notifications(State(state): State<AdminState>) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(state.catalog.list_notifications().await?))
}

/// POST /api/notifications
pub async fn create_notification(
    State(state): State<AdminState>,
    Json(request): Json<NewNotification>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    request
        .validate()
        .map_err(|reason| ApiError::BadRequest(reason.to_string()))?;
    let notification = state.catalog.create_notification(&request).await?;
    info!(
        notification_id = notification.id,
        audience = %notification.target_audience,
        "Notification scheduled"
    );
    Ok((StatusCode::CREATED, Json(notification)))
}
