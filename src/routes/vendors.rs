use anyhow::{Context, Result};
use axum::{
    Extension,
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::{DbConn, DieselError},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, CurrentUser},
    models::VendorEntity,
    schema::vendors,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let public = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_vendors))
        .routes(utoipa_axum::routes!(get_vendor));

    let vendor_only = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_my_profile))
        .routes(utoipa_axum::routes!(update_profile))
        .routes(utoipa_axum::routes!(toggle_availability))
        .route_layer(axum::middleware::from_fn(middleware::require_vendor))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ));

    utoipa_axum::router::OpenApiRouter::new().nest("/vendors", public.merge(vendor_only))
}

/// Looks up the storefront owned by the given account.
pub(crate) async fn vendor_owned_by(
    conn: &mut DbConn<'_>,
    user_id: i32,
) -> Result<VendorEntity, AppError> {
    let vendor: QueryResult<VendorEntity> = vendors::table
        .filter(vendors::user_id.eq(user_id))
        .get_result(conn)
        .await;

    match vendor {
        Ok(vendor) => Ok(vendor),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct DayHours {
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
}

/// Weekly operating hours, one open/close pair per day.
#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct WeeklySchedule {
    #[serde(default)]
    pub monday: DayHours,
    #[serde(default)]
    pub tuesday: DayHours,
    #[serde(default)]
    pub wednesday: DayHours,
    #[serde(default)]
    pub thursday: DayHours,
    #[serde(default)]
    pub friday: DayHours,
    #[serde(default)]
    pub saturday: DayHours,
    #[serde(default)]
    pub sunday: DayHours,
}

impl WeeklySchedule {
    fn days(&self) -> [&DayHours; 7] {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
    }

    /// Every present time must be a 24h `HH:MM` value.
    pub fn validate(&self) -> Result<(), AppError> {
        for day in self.days() {
            for time in [&day.open, &day.close].into_iter().flatten() {
                if !is_valid_time(time) {
                    return Err(AppError::BadRequest(format!(
                        "Invalid schedule time: {time}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_valid_time(value: &str) -> bool {
    let Some((hours, minutes)) = value.split_once(':') else {
        return false;
    };

    let hours_ok = matches!(hours.parse::<u32>(), Ok(h) if h < 24 && !hours.is_empty());
    let minutes_ok = matches!(minutes.parse::<u32>(), Ok(m) if m < 60 && minutes.len() == 2);

    hours_ok && minutes_ok
}

/// Storefront card shown while browsing; schedule and contact email are
/// omitted.
#[derive(Serialize, ToSchema)]
pub struct VendorSummaryRes {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub location: String,
    pub logo: Option<String>,
    pub is_open: bool,
    pub rating: f32,
}

impl From<VendorEntity> for VendorSummaryRes {
    fn from(vendor: VendorEntity) -> Self {
        Self {
            id: vendor.id,
            name: vendor.name,
            description: vendor.description,
            location: vendor.location,
            logo: vendor.logo,
            is_open: vendor.is_open,
            rating: vendor.rating,
        }
    }
}

/// Browse vendors that are currently open.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Vendors"],
    responses(
        (status = 200, description = "List open vendors", body = StdResponse<Vec<VendorSummaryRes>, String>)
    )
)]
async fn get_vendors(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendors: Vec<VendorEntity> = vendors::table
        .filter(vendors::is_open.eq(true))
        .order_by(vendors::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get vendors")?;

    let vendors: Vec<VendorSummaryRes> = vendors.into_iter().map(Into::into).collect();

    Ok(StdResponse {
        data: Some(vendors),
        message: Some("Get vendors successfully"),
    })
}

/// Fetch a single vendor's full profile.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Vendors"],
    params(
        ("id" = i32, Path, description = "Vendor ID to fetch")
    ),
    responses(
        (status = 200, description = "Get vendor successfully", body = StdResponse<VendorEntity, String>)
    )
)]
async fn get_vendor(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor: QueryResult<VendorEntity> = vendors::table.find(id).get_result(conn).await;

    let vendor = match vendor {
        Ok(vendor) => vendor,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(vendor),
        message: Some("Get vendor successfully"),
    })
}

/// Fetch the authenticated vendor's own profile.
#[utoipa::path(
    get,
    path = "/profile/me",
    tags = ["Vendors"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get vendor profile successfully", body = StdResponse<VendorEntity, String>)
    )
)]
async fn get_my_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor = vendor_owned_by(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(vendor),
        message: Some("Get vendor profile successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateVendorProfileReq {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub logo: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub schedule: Option<WeeklySchedule>,
}

#[derive(diesel::AsChangeset)]
#[diesel(table_name = crate::schema::vendors)]
struct UpdateVendorChangeset {
    name: Option<String>,
    description: Option<String>,
    location: Option<String>,
    logo: Option<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    schedule: Option<Value>,
}

/// Update the authenticated vendor's profile; absent fields are left
/// untouched.
#[utoipa::path(
    put,
    path = "/profile",
    tags = ["Vendors"],
    security(("bearerAuth" = [])),
    request_body = UpdateVendorProfileReq,
    responses(
        (status = 200, description = "Vendor profile updated successfully", body = StdResponse<VendorEntity, String>)
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateVendorProfileReq>,
) -> Result<impl IntoResponse, AppError> {
    let schedule = match body.schedule {
        Some(schedule) => {
            schedule.validate()?;
            Some(serde_json::to_value(&schedule).context("Failed to serialize schedule")?)
        }
        None => None,
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let changes = UpdateVendorChangeset {
        name: body.name,
        description: body.description,
        location: body.location,
        logo: body.logo,
        contact_phone: body.contact_phone,
        contact_email: body.contact_email,
        schedule,
    };

    let vendor: QueryResult<VendorEntity> =
        diesel::update(vendors::table.filter(vendors::user_id.eq(user.id)))
            .set((changes, vendors::updated_at.eq(diesel::dsl::now)))
            .returning(VendorEntity::as_returning())
            .get_result(conn)
            .await;

    let vendor = match vendor {
        Ok(vendor) => vendor,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(vendor),
        message: Some("Vendor profile updated successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct ToggleAvailabilityRes {
    pub is_open: bool,
}

/// Flip the storefront between open and closed.
#[utoipa::path(
    patch,
    path = "/toggle-availability",
    tags = ["Vendors"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Vendor availability toggled", body = StdResponse<ToggleAvailabilityRes, String>)
    )
)]
async fn toggle_availability(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let vendor: QueryResult<VendorEntity> =
        diesel::update(vendors::table.filter(vendors::user_id.eq(user.id)))
            .set(vendors::is_open.eq(diesel::dsl::not(vendors::is_open)))
            .returning(VendorEntity::as_returning())
            .get_result(conn)
            .await;

    let vendor = match vendor {
        Ok(vendor) => vendor,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(ToggleAvailabilityRes {
            is_open: vendor.is_open,
        }),
        message: Some(format!(
            "Vendor is now {}",
            if vendor.is_open { "open" } else { "closed" }
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_24h_times() {
        assert!(is_valid_time("08:00"));
        assert!(is_valid_time("23:59"));
        assert!(is_valid_time("0:30"));
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(!is_valid_time("24:00"));
        assert!(!is_valid_time("12:60"));
        assert!(!is_valid_time("12:5"));
        assert!(!is_valid_time("noon"));
        assert!(!is_valid_time(""));
        assert!(!is_valid_time("12"));
    }

    #[test]
    fn schedule_with_bad_time_is_rejected() {
        let mut schedule = WeeklySchedule::default();
        assert!(schedule.validate().is_ok());

        schedule.friday = DayHours {
            open: Some("09:00".into()),
            close: Some("25:00".into()),
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn partial_schedule_deserializes_with_defaults() {
        let schedule: WeeklySchedule =
            serde_json::from_str(r#"{"monday":{"open":"09:00","close":"17:00"}}"#).unwrap();

        assert_eq!(schedule.monday.open.as_deref(), Some("09:00"));
        assert!(schedule.tuesday.open.is_none());
        assert!(schedule.validate().is_ok());
    }
}
