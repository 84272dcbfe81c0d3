use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth,
    middleware::{self, CurrentUser},
    models::{CreateUserEntity, CreateVendorEntity, UserEntity, UserRole},
    schema::{users, vendors},
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let public = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(register))
        .routes(utoipa_axum::routes!(login));

    let protected = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(me))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ));

    utoipa_axum::router::OpenApiRouter::new().nest("/auth", public.merge(protected))
}

/// Public view of an account. Never includes the credential hash.
#[derive(Serialize, ToSchema)]
pub struct PublicUserRes {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_id: Option<String>,
    pub phone: Option<String>,
}

impl From<UserEntity> for PublicUserRes {
    fn from(user: UserEntity) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            student_id: user.student_id,
            phone: user.phone,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthRes {
    pub token: String,
    pub user: PublicUserRes,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub student_id: Option<String>,
    pub phone: Option<String>,
    // Required when registering as a vendor.
    pub vendor_name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Register a new account; vendor registrations create the storefront
/// profile in the same transaction.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterReq,
    responses(
        (status = 200, description = "User registered successfully", body = StdResponse<AuthRes, String>)
    )
)]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();
    let role = body.role.unwrap_or(UserRole::Student);

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    if body.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }

    if role == UserRole::Student && !email.ends_with(&state.config.auth.student_email_domain) {
        return Err(AppError::BadRequest(
            "Students must use a valid campus email address".into(),
        ));
    }

    let vendor_profile = if role == UserRole::Vendor {
        match (&body.vendor_name, &body.location) {
            (Some(vendor_name), Some(location)) => Some((vendor_name.clone(), location.clone())),
            _ => {
                return Err(AppError::BadRequest(
                    "Vendor name and location are required".into(),
                ));
            }
        }
    } else {
        None
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: i64 = users::table
        .filter(users::email.eq(&email))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check for existing user")?;

    if existing > 0 {
        return Err(AppError::BadRequest("User already exists".into()));
    }

    let password_hash = auth::hash_password(&body.password)?;
    let new_user = CreateUserEntity {
        name: body.name.trim().to_string(),
        email,
        password_hash,
        role: role.as_str().to_string(),
        student_id: if role == UserRole::Student {
            body.student_id
        } else {
            None
        },
        phone: body.phone.clone(),
    };

    let phone = body.phone;
    let description = body.description;
    let user = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let user: UserEntity = diesel::insert_into(users::table)
                    .values(new_user)
                    .returning(UserEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create user")?;

                if let Some((vendor_name, location)) = vendor_profile {
                    diesel::insert_into(vendors::table)
                        .values(CreateVendorEntity {
                            user_id: user.id,
                            name: vendor_name,
                            description,
                            location,
                            contact_phone: phone,
                            contact_email: Some(user.email.clone()),
                        })
                        .execute(conn)
                        .await
                        .context("Failed to create vendor profile")?;
                }

                Ok::<UserEntity, anyhow::Error>(user)
            })
        })
        .await
        .context("Transaction failed")?;

    let token = auth::issue_token(
        user.id,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )?;

    Ok(StdResponse {
        data: Some(AuthRes {
            token,
            user: user.into(),
        }),
        message: Some("User registered successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

/// Exchange credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Login successful", body = StdResponse<AuthRes, String>)
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: QueryResult<UserEntity> = users::table
        .filter(users::email.eq(&email))
        .get_result(conn)
        .await;

    let user = match user {
        Ok(user) => user,
        Err(DieselError::NotFound) => {
            return Err(AppError::BadRequest("Invalid credentials".into()));
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if !auth::verify_password(&body.password, &user.password_hash) {
        return Err(AppError::BadRequest("Invalid credentials".into()));
    }

    let token = auth::issue_token(
        user.id,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )?;

    Ok(StdResponse {
        data: Some(AuthRes {
            token,
            user: user.into(),
        }),
        message: Some("Login successful"),
    })
}

/// Fetch the authenticated account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = StdResponse<PublicUserRes, String>)
    )
)]
async fn me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(StdResponse {
        data: Some(PublicUserRes::from(user)),
        message: Some("Get current user successfully"),
    })
}
