use anyhow::{Context, Result};
use axum::{
    Extension,
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, CurrentUser},
    models::{CreateMenuItemEntity, MenuItemEntity},
    routes::vendors::vendor_owned_by,
    schema::menu_items,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let public = OpenApiRouter::new().routes(utoipa_axum::routes!(get_vendor_menu));

    let vendor_only = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_my_menu))
        .routes(utoipa_axum::routes!(create_menu_item))
        .routes(utoipa_axum::routes!(update_menu_item))
        .routes(utoipa_axum::routes!(delete_menu_item))
        .routes(utoipa_axum::routes!(toggle_item_availability))
        .route_layer(axum::middleware::from_fn(middleware::require_vendor))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ));

    utoipa_axum::router::OpenApiRouter::new().nest("/menu", public.merge(vendor_only))
}

/// Browse a vendor's currently available items, grouped the way menus are
/// displayed.
#[utoipa::path(
    get,
    path = "/vendor/{vendor_id}",
    tags = ["Menu"],
    params(
        ("vendor_id" = i32, Path, description = "Vendor whose menu to fetch")
    ),
    responses(
        (status = 200, description = "List available menu items", body = StdResponse<Vec<MenuItemEntity>, String>)
    )
)]
async fn get_vendor_menu(
    Path(vendor_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items: Vec<MenuItemEntity> = menu_items::table
        .filter(menu_items::vendor_id.eq(vendor_id))
        .filter(menu_items::is_available.eq(true))
        .order((menu_items::category.asc(), menu_items::name.asc()))
        .get_results(conn)
        .await
        .context("Failed to get menu items")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get menu items successfully"),
    })
}

/// Fetch the authenticated vendor's full menu, unavailable items included.
#[utoipa::path(
    get,
    path = "/my-menu",
    tags = ["Menu"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List own menu items", body = StdResponse<Vec<MenuItemEntity>, String>)
    )
)]
async fn get_my_menu(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;

    let items: Vec<MenuItemEntity> = menu_items::table
        .filter(menu_items::vendor_id.eq(vendor.id))
        .order((menu_items::category.asc(), menu_items::name.asc()))
        .get_results(conn)
        .await
        .context("Failed to get menu items")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get my menu successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct CreateMenuItemReq {
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub image: Option<String>,
    pub category: String,
    pub is_available: Option<bool>,
    pub preparation_time: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub is_veg: Option<bool>,
    pub is_spicy: Option<bool>,
}

/// Add a new item to the authenticated vendor's menu.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Menu"],
    security(("bearerAuth" = [])),
    request_body = CreateMenuItemReq,
    responses(
        (status = 200, description = "Menu item added successfully", body = StdResponse<MenuItemEntity, String>)
    )
)]
async fn create_menu_item(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateMenuItemReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    if body.price < 0.0 {
        return Err(AppError::BadRequest("Price must be non-negative".into()));
    }

    if body.preparation_time.is_some_and(|minutes| minutes < 0) {
        return Err(AppError::BadRequest(
            "Preparation time must be non-negative".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;

    let item: MenuItemEntity = diesel::insert_into(menu_items::table)
        .values(CreateMenuItemEntity {
            vendor_id: vendor.id,
            name: body.name.trim().to_string(),
            description: body.description,
            price: body.price,
            image: body.image,
            category: body.category,
            is_available: body.is_available.unwrap_or(true),
            preparation_time: body.preparation_time.unwrap_or(15),
            tags: body.tags.unwrap_or_default(),
            is_veg: body.is_veg.unwrap_or(false),
            is_spicy: body.is_spicy.unwrap_or(false),
        })
        .returning(MenuItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create menu item")?;

    Ok(StdResponse {
        data: Some(item),
        message: Some("Menu item added successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateMenuItemReq {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f32>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub is_available: Option<bool>,
    pub preparation_time: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub is_veg: Option<bool>,
    pub is_spicy: Option<bool>,
}

#[derive(diesel::AsChangeset)]
#[diesel(table_name = crate::schema::menu_items)]
struct UpdateMenuItemChangeset {
    name: Option<String>,
    description: Option<String>,
    price: Option<f32>,
    image: Option<String>,
    category: Option<String>,
    is_available: Option<bool>,
    preparation_time: Option<i32>,
    tags: Option<Vec<String>>,
    is_veg: Option<bool>,
    is_spicy: Option<bool>,
}

/// Update one of the authenticated vendor's menu items; absent fields are
/// left untouched.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Menu"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu item ID to update")
    ),
    request_body = UpdateMenuItemReq,
    responses(
        (status = 200, description = "Menu item updated successfully", body = StdResponse<MenuItemEntity, String>)
    )
)]
async fn update_menu_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateMenuItemReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.price.is_some_and(|price| price < 0.0) {
        return Err(AppError::BadRequest("Price must be non-negative".into()));
    }

    if body.preparation_time.is_some_and(|minutes| minutes < 0) {
        return Err(AppError::BadRequest(
            "Preparation time must be non-negative".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;
    owned_menu_item(conn, id, vendor.id).await?;

    let changes = UpdateMenuItemChangeset {
        name: body.name,
        description: body.description,
        price: body.price,
        image: body.image,
        category: body.category,
        is_available: body.is_available,
        preparation_time: body.preparation_time,
        tags: body.tags,
        is_veg: body.is_veg,
        is_spicy: body.is_spicy,
    };

    let item: MenuItemEntity = diesel::update(menu_items::table.find(id))
        .set((changes, menu_items::updated_at.eq(diesel::dsl::now)))
        .returning(MenuItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update menu item")?;

    Ok(StdResponse {
        data: Some(item),
        message: Some("Menu item updated successfully"),
    })
}

/// Remove a menu item permanently. Order snapshots keep their copied name
/// and price, so history is unaffected.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Menu"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu item ID to delete")
    ),
    responses(
        (status = 200, description = "Menu item deleted successfully", body = StdResponse<MenuItemEntity, String>)
    )
)]
async fn delete_menu_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;
    owned_menu_item(conn, id, vendor.id).await?;

    let item: MenuItemEntity = diesel::delete(menu_items::table.find(id))
        .returning(MenuItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to delete menu item")?;

    Ok(StdResponse {
        data: Some(item),
        message: Some("Menu item deleted successfully"),
    })
}

#[derive(serde::Serialize, ToSchema)]
pub struct ToggleItemAvailabilityRes {
    pub is_available: bool,
}

/// Flip a menu item between available and unavailable.
#[utoipa::path(
    patch,
    path = "/toggle-availability/{id}",
    tags = ["Menu"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu item ID to toggle")
    ),
    responses(
        (status = 200, description = "Menu item availability toggled", body = StdResponse<ToggleItemAvailabilityRes, String>)
    )
)]
async fn toggle_item_availability(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;
    owned_menu_item(conn, id, vendor.id).await?;

    let item: MenuItemEntity = diesel::update(menu_items::table.find(id))
        .set(menu_items::is_available.eq(diesel::dsl::not(menu_items::is_available)))
        .returning(MenuItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to toggle menu item availability")?;

    Ok(StdResponse {
        data: Some(ToggleItemAvailabilityRes {
            is_available: item.is_available,
        }),
        message: Some(format!(
            "Menu item is now {}",
            if item.is_available {
                "available"
            } else {
                "unavailable"
            }
        )),
    })
}

/// Fails with `NotFound` when the item is absent and `Forbidden` when it
/// belongs to another vendor.
async fn owned_menu_item(
    conn: &mut crate::aliases::DbConn<'_>,
    item_id: i32,
    vendor_id: i32,
) -> Result<MenuItemEntity, AppError> {
    let item: QueryResult<MenuItemEntity> =
        menu_items::table.find(item_id).get_result(conn).await;

    let item = match item {
        Ok(item) => item,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if item.vendor_id != vendor_id {
        return Err(AppError::ForbiddenResource(
            "Not authorized to modify this menu item".into(),
        ));
    }

    Ok(item)
}
