use std::collections::HashMap;

use anyhow::{Context, Result};
use axum::{
    Extension,
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, CurrentUser},
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreateOrderStatusHistoryEntity, MenuItemEntity,
        OrderEntity, OrderItemEntity, OrderStatus, OrderStatusHistoryEntity, PaymentStatus,
        UserRole, VendorEntity,
    },
    routes::vendors::vendor_owned_by,
    schema::{menu_items, order_items, order_status_history, orders, vendors},
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let student = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(create_order))
        .routes(utoipa_axum::routes!(get_my_orders))
        .routes(utoipa_axum::routes!(cancel_order))
        .route_layer(axum::middleware::from_fn(middleware::require_student));

    let vendor = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_vendor_orders))
        .routes(utoipa_axum::routes!(update_order_status))
        .route_layer(axum::middleware::from_fn(middleware::require_vendor));

    let admin = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_orders))
        .route_layer(axum::middleware::from_fn(middleware::require_admin));

    let any_authenticated = OpenApiRouter::new().routes(utoipa_axum::routes!(get_order));

    utoipa_axum::router::OpenApiRouter::new().nest(
        "/orders",
        student
            .merge(vendor)
            .merge(admin)
            .merge(any_authenticated)
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authenticate,
            )),
    )
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateOrderReqItem {
    pub menu_item_id: i32,
    pub quantity: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderReq {
    pub vendor_id: i32,
    pub items: Vec<CreateOrderReqItem>,
    pub special_instructions: Option<String>,
}

struct QuotedLine {
    menu_item_id: i32,
    name: String,
    unit_price: f32,
    quantity: i32,
    subtotal: f32,
}

/// Prices the requested lines against the vendor's live menu and produces
/// the snapshot that will be copied onto the order. Fails before any row
/// is written: missing item, unavailable item, or a non-positive quantity
/// rejects the whole order.
fn quote_order(
    menu: &HashMap<i32, MenuItemEntity>,
    requested: &[CreateOrderReqItem],
) -> Result<(Vec<QuotedLine>, f32), AppError> {
    let mut lines = Vec::with_capacity(requested.len());
    let mut total = 0.0f32;

    for item in requested {
        let menu_item = menu.get(&item.menu_item_id).ok_or(AppError::NotFound)?;

        if !menu_item.is_available {
            return Err(AppError::InvalidState(format!(
                "{} is currently unavailable",
                menu_item.name
            )));
        }

        if item.quantity < 1 {
            return Err(AppError::BadRequest("Invalid quantity".into()));
        }

        let subtotal = menu_item.price * item.quantity as f32;
        total += subtotal;

        lines.push(QuotedLine {
            menu_item_id: menu_item.id,
            name: menu_item.name.clone(),
            unit_price: menu_item.price,
            quantity: item.quantity,
            subtotal,
        });
    }

    Ok((lines, total))
}

#[derive(Serialize, ToSchema)]
pub struct CreateOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

/// Place an order against one open vendor. Prices are copied into the
/// order at this moment; the first history entry is written in the same
/// transaction.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CreateOrderReq,
    responses(
        (status = 200, description = "Order created successfully", body = StdResponse<CreateOrderRes, String>)
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.items.is_empty() {
        return Err(AppError::BadRequest("At least one item is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor: QueryResult<VendorEntity> =
        vendors::table.find(body.vendor_id).get_result(conn).await;

    let vendor = match vendor {
        Ok(vendor) => vendor,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if !vendor.is_open {
        return Err(AppError::InvalidState(
            "This vendor is currently closed".into(),
        ));
    }

    let requested_ids: Vec<i32> = body.items.iter().map(|item| item.menu_item_id).collect();
    let menu: Vec<MenuItemEntity> = menu_items::table
        .filter(menu_items::id.eq_any(&requested_ids))
        .filter(menu_items::vendor_id.eq(vendor.id))
        .get_results(conn)
        .await
        .context("Failed to get menu items")?;

    let menu: HashMap<i32, MenuItemEntity> =
        menu.into_iter().map(|item| (item.id, item)).collect();

    let (lines, total) = quote_order(&menu, &body.items)?;

    let user_id = user.id;
    let vendor_id = vendor.id;
    let special_instructions = body.special_instructions;
    let (order, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        user_id,
                        vendor_id,
                        total_amount: total,
                        status: OrderStatus::Pending.as_str().to_string(),
                        payment_status: PaymentStatus::Pending.as_str().to_string(),
                        special_instructions,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let snapshot: Vec<CreateOrderItemEntity> = lines
                    .into_iter()
                    .map(|line| CreateOrderItemEntity {
                        order_id: order.id,
                        menu_item_id: line.menu_item_id,
                        name: line.name,
                        unit_price: line.unit_price,
                        quantity: line.quantity,
                        subtotal: line.subtotal,
                    })
                    .collect();

                let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(snapshot)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                diesel::insert_into(order_status_history::table)
                    .values(CreateOrderStatusHistoryEntity {
                        order_id: order.id,
                        status: OrderStatus::Pending.as_str().to_string(),
                    })
                    .execute(conn)
                    .await
                    .context("Failed to record order status")?;

                Ok::<(OrderEntity, Vec<OrderItemEntity>), anyhow::Error>((order, items))
            })
        })
        .await
        .context("Transaction failed")?;

    Ok(StdResponse {
        data: Some(CreateOrderRes {
            order,
            order_items: items,
        }),
        message: Some("Order created successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct OrderWithItemsRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

async fn attach_items(
    conn: &mut crate::aliases::DbConn<'_>,
    orders: Vec<OrderEntity>,
) -> Result<Vec<OrderWithItemsRes>> {
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderWithItemsRes {
            order_items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

/// Fetch the authenticated buyer's orders, newest first.
#[utoipa::path(
    get,
    path = "/my-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<OrderWithItemsRes>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders: Vec<OrderEntity> = orders::table
        .filter(orders::user_id.eq(user.id))
        .order_by(orders::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;

    let orders = attach_items(conn, orders).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get my orders successfully"),
    })
}

#[derive(Deserialize)]
struct VendorOrdersQuery {
    status: Option<String>,
}

/// Fetch orders addressed to the authenticated vendor, optionally
/// filtered by status, newest first.
#[utoipa::path(
    get,
    path = "/vendor-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Only return orders with this status")
    ),
    responses(
        (status = 200, description = "List vendor orders", body = StdResponse<Vec<OrderWithItemsRes>, String>)
    )
)]
async fn get_vendor_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<VendorOrdersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status_filter = match query.status.as_deref() {
        Some(raw) => Some(
            OrderStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest("Valid status is required".into()))?,
        ),
        None => None,
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;

    let mut query = orders::table
        .filter(orders::vendor_id.eq(vendor.id))
        .into_boxed();
    if let Some(status) = status_filter {
        query = query.filter(orders::status.eq(status.as_str()));
    }

    let orders: Vec<OrderEntity> = query
        .order_by(orders::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get vendor orders")?;

    let orders = attach_items(conn, orders).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get vendor orders successfully"),
    })
}

/// Fetch every order in the system.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all orders", body = StdResponse<Vec<OrderEntity>, String>)
    )
)]
async fn get_orders(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders: Vec<OrderEntity> = orders::table
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct GetOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
    pub status_history: Vec<OrderStatusHistoryEntity>,
}

/// Fetch one order with its snapshot lines and full status history.
/// Visible to the buyer, the vendor it is addressed to, and admins.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>)
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = orders::table.find(id).get_result(conn).await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let authorized = if user.id == order.user_id {
        true
    } else {
        match user.role() {
            Some(UserRole::Admin) => true,
            Some(UserRole::Vendor) => match vendor_owned_by(conn, user.id).await {
                Ok(vendor) => vendor.id == order.vendor_id,
                Err(AppError::NotFound) => false,
                Err(err) => return Err(err),
            },
            _ => false,
        }
    };

    if !authorized {
        return Err(AppError::ForbiddenResource(
            "Not authorized to view this order".into(),
        ));
    }

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let history: Vec<OrderStatusHistoryEntity> = order_status_history::table
        .filter(order_status_history::order_id.eq(order.id))
        .order_by(order_status_history::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get order status history")?;

    Ok(StdResponse {
        data: Some(GetOrderRes {
            order,
            order_items: items,
            status_history: history,
        }),
        message: Some("Get order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateOrderStatusReq {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateOrderStatusRes {
    pub status: String,
}

/// Move an order along the kitchen flow. Transitions outside the table
/// are rejected without touching the order.
#[utoipa::path(
    patch,
    path = "/update-status/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to update")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Order status updated successfully", body = StdResponse<UpdateOrderStatusRes, String>)
    )
)]
async fn update_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let next = OrderStatus::parse(&body.status)
        .ok_or_else(|| AppError::BadRequest("Valid status is required".into()))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;

    let order: QueryResult<OrderEntity> = orders::table.find(id).get_result(conn).await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if order.vendor_id != vendor.id {
        return Err(AppError::ForbiddenResource(
            "Not authorized to update this order".into(),
        ));
    }

    let current = order
        .status()
        .with_context(|| format!("Order #{} has a corrupt status", order.id))?;

    if !current.can_transition_to(next) {
        return Err(AppError::InvalidState(format!(
            "Cannot change status from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    transition_order(conn, order.id, next).await?;

    Ok(StdResponse {
        data: Some(UpdateOrderStatusRes {
            status: next.as_str().to_string(),
        }),
        message: Some("Order status updated successfully"),
    })
}

/// Cancel a still-pending order. Anything past `pending` is already being
/// processed by the vendor.
#[utoipa::path(
    patch,
    path = "/cancel/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Order cancelled successfully", body = StdResponse<UpdateOrderStatusRes, String>)
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = orders::table.find(id).get_result(conn).await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if order.user_id != user.id {
        return Err(AppError::ForbiddenResource(
            "Not authorized to cancel this order".into(),
        ));
    }

    if order.status() != Some(OrderStatus::Pending) {
        return Err(AppError::InvalidState(
            "Cannot cancel order. Order is already being processed".into(),
        ));
    }

    transition_order(conn, order.id, OrderStatus::Cancelled).await?;

    Ok(StdResponse {
        data: Some(UpdateOrderStatusRes {
            status: OrderStatus::Cancelled.as_str().to_string(),
        }),
        message: Some("Order cancelled successfully"),
    })
}

/// Writes the new status and its history entry together; every accepted
/// transition appends exactly one history row.
async fn transition_order(
    conn: &mut crate::aliases::DbConn<'_>,
    order_id: i32,
    next: OrderStatus,
) -> Result<(), AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            diesel::update(orders::table.find(order_id))
                .set((
                    orders::status.eq(next.as_str()),
                    orders::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)
                .await
                .context("Failed to update order status")?;

            diesel::insert_into(order_status_history::table)
                .values(CreateOrderStatusHistoryEntity {
                    order_id,
                    status: next.as_str().to_string(),
                })
                .execute(conn)
                .await
                .context("Failed to record order status")?;

            Ok::<(), anyhow::Error>(())
        })
    })
    .await
    .context("Transaction failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn menu_item(id: i32, name: &str, price: f32, available: bool) -> MenuItemEntity {
        MenuItemEntity {
            id,
            vendor_id: 1,
            name: name.to_string(),
            description: None,
            price,
            image: None,
            category: "Snacks".to_string(),
            is_available: available,
            preparation_time: 15,
            tags: vec![],
            is_veg: false,
            is_spicy: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn menu_of(items: Vec<MenuItemEntity>) -> HashMap<i32, MenuItemEntity> {
        items.into_iter().map(|item| (item.id, item)).collect()
    }

    fn requested(items: &[(i32, i32)]) -> Vec<CreateOrderReqItem> {
        items
            .iter()
            .map(|&(menu_item_id, quantity)| CreateOrderReqItem {
                menu_item_id,
                quantity,
            })
            .collect()
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let menu = menu_of(vec![
            menu_item(1, "Item A", 100.0, true),
            menu_item(2, "Item B", 50.0, true),
        ]);

        let (lines, total) = quote_order(&menu, &requested(&[(1, 2), (2, 1)])).unwrap();

        assert_eq!(total, 250.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_price, 100.0);
        assert_eq!(lines[0].subtotal, 200.0);
        assert_eq!(lines[1].subtotal, 50.0);
    }

    #[test]
    fn snapshot_copies_name_and_price() {
        let menu = menu_of(vec![menu_item(9, "Chicken Roll", 75.5, true)]);

        let (lines, _) = quote_order(&menu, &requested(&[(9, 3)])).unwrap();

        assert_eq!(lines[0].menu_item_id, 9);
        assert_eq!(lines[0].name, "Chicken Roll");
        assert_eq!(lines[0].unit_price, 75.5);
        assert_eq!(lines[0].quantity, 3);
    }

    #[test]
    fn missing_item_fails_with_not_found() {
        let menu = menu_of(vec![menu_item(1, "Item A", 100.0, true)]);

        let err = quote_order(&menu, &requested(&[(1, 1), (2, 1)])).unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn unavailable_item_fails_with_invalid_state() {
        let menu = menu_of(vec![menu_item(1, "Item A", 100.0, false)]);

        let err = quote_order(&menu, &requested(&[(1, 1)])).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn non_positive_quantity_fails_with_bad_request() {
        let menu = menu_of(vec![menu_item(1, "Item A", 100.0, true)]);

        assert!(matches!(
            quote_order(&menu, &requested(&[(1, 0)])).unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            quote_order(&menu, &requested(&[(1, -2)])).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn duplicate_lines_are_priced_independently() {
        let menu = menu_of(vec![menu_item(1, "Item A", 10.0, true)]);

        let (lines, total) = quote_order(&menu, &requested(&[(1, 1), (1, 2)])).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(total, 30.0);
    }
}
