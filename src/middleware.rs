use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use diesel::{QueryDsl, QueryResult};
use diesel_async::RunQueryDsl;

use crate::{
    aliases::DieselError,
    app_error::AppError,
    app_state::AppState,
    auth,
    models::{UserEntity, UserRole},
    schema::users,
};

/// The authenticated account, attached to the request by [`authenticate`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserEntity);

/// Resolves the bearer token to a live account row and attaches it to the
/// request. Routes behind this layer can rely on `Extension<CurrentUser>`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let claims = auth::verify_token(token, &state.config.auth.jwt_secret)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: QueryResult<UserEntity> = users::table.find(claims.sub).get_result(conn).await;

    let user = match user {
        Ok(user) => user,
        Err(DieselError::NotFound) => {
            return Err(AppError::Unauthorized("User not found".into()));
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

pub async fn require_student(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(
        req,
        next,
        &[UserRole::Student, UserRole::Admin],
        "Access denied. Student rights required.",
    )
    .await
}

pub async fn require_vendor(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(
        req,
        next,
        &[UserRole::Vendor, UserRole::Admin],
        "Access denied. Vendor rights required.",
    )
    .await
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(
        req,
        next,
        &[UserRole::Admin],
        "Access denied. Admin rights required.",
    )
    .await
}

async fn require_role(
    req: Request,
    next: Next,
    allowed: &[UserRole],
    denial: &str,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let role = user
        .0
        .role()
        .ok_or_else(|| AppError::ForbiddenResource(denial.to_string()))?;

    if allowed.contains(&role) {
        Ok(next.run(req).await)
    } else {
        Err(AppError::ForbiddenResource(denial.to_string()))
    }
}
