use anyhow::{Context, Result};
use axum::{
    Extension,
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    api::gateway::{self, InitiatePaymentReq},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, CurrentUser},
    models::{OrderEntity, PaymentStatus, VendorEntity},
    schema::{orders, vendors},
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let protected = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(process_payment))
        .route_layer(axum::middleware::from_fn(middleware::require_student))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ));

    // Gateway-facing callbacks carry no bearer token; the success path is
    // re-validated server-to-server instead.
    let callbacks = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(payment_success))
        .routes(utoipa_axum::routes!(payment_fail))
        .routes(utoipa_axum::routes!(payment_cancel));

    utoipa_axum::router::OpenApiRouter::new().nest("/payments", protected.merge(callbacks))
}

/// Transaction references compose the order id with the current time so
/// repeated attempts for one order stay distinguishable at the gateway.
fn transaction_reference(order_id: i32, now_millis: i64) -> String {
    format!("CEORDER-{order_id}-{now_millis}")
}

#[derive(Serialize, ToSchema)]
pub struct ProcessPaymentRes {
    pub url: String,
}

/// Open a hosted checkout session for an unpaid order and hand back the
/// redirect URL. The transaction reference is stored on the order before
/// the URL is returned so a later callback can always be correlated.
#[utoipa::path(
    post,
    path = "/process/{order_id}",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    params(
        ("order_id" = i32, Path, description = "Order ID to pay for")
    ),
    responses(
        (status = 200, description = "Checkout session created", body = StdResponse<ProcessPaymentRes, String>)
    )
)]
async fn process_payment(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = orders::table.find(order_id).get_result(conn).await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if order.user_id != user.id {
        return Err(AppError::ForbiddenResource(
            "Not authorized to pay for this order".into(),
        ));
    }

    if order.payment_status() == Some(PaymentStatus::Paid) {
        return Err(AppError::InvalidState("This order is already paid".into()));
    }

    let vendor: VendorEntity = vendors::table
        .find(order.vendor_id)
        .get_result(conn)
        .await
        .context("Failed to get vendor for order")?;

    let tran_id = transaction_reference(order.id, Utc::now().timestamp_millis());
    let gateway_req = InitiatePaymentReq::new(
        tran_id.clone(),
        order.id,
        order.total_amount,
        &vendor.name,
        &user.name,
        &user.email,
        user.phone.as_deref(),
    );

    let gateway_res = gateway::initiate_payment(state.http_client.clone(), &gateway_req).await?;

    diesel::update(orders::table.find(order.id))
        .set(orders::payment_ref.eq(&tran_id))
        .execute(conn)
        .await
        .context("Failed to store transaction reference")?;

    let url = gateway_res
        .gateway_page_url
        .ok_or_else(|| AppError::UpstreamError("Payment initialization failed".into()))?;

    Ok(StdResponse {
        data: Some(ProcessPaymentRes { url }),
        message: Some("Payment initiated successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct PaymentCallbackReq {
    pub val_id: Option<String>,
    pub tran_id: Option<String>,
    /// Pass-through order id set at initiation time.
    pub value_a: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentCallbackRes {
    pub order_id: i32,
}

fn callback_order_id(value_a: Option<&str>) -> Result<i32, AppError> {
    value_a
        .and_then(|raw| raw.parse::<i32>().ok())
        .ok_or_else(|| AppError::BadRequest("Invalid payment data".into()))
}

/// Gateway redirect after a successful charge. The validation id is
/// re-checked with the gateway before anything is trusted; marking an
/// already-paid order paid again is a no-op, so replays are harmless.
#[utoipa::path(
    post,
    path = "/success",
    tags = ["Payments"],
    request_body = PaymentCallbackReq,
    responses(
        (status = 200, description = "Payment recorded as paid", body = StdResponse<PaymentCallbackRes, String>)
    )
)]
async fn payment_success(
    State(state): State<AppState>,
    Json(body): Json<PaymentCallbackReq>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(val_id), Some(_tran_id)) = (&body.val_id, &body.tran_id) else {
        return Err(AppError::BadRequest("Invalid payment data".into()));
    };
    let order_id = callback_order_id(body.value_a.as_deref())?;

    let validation = gateway::validate_payment(state.http_client.clone(), val_id).await?;
    if !validation.is_valid() {
        return Err(AppError::BadRequest("Payment validation failed".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = diesel::update(orders::table.find(order_id))
        .set(orders::payment_status.eq(PaymentStatus::Paid.as_str()))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    tracing::info!("Order #{} has been paid", order.id);

    Ok(StdResponse {
        data: Some(PaymentCallbackRes { order_id: order.id }),
        message: Some("Payment successful"),
    })
}

/// Gateway redirect after a failed charge. The failure verdict is taken
/// as-is, without gateway re-validation.
#[utoipa::path(
    post,
    path = "/fail",
    tags = ["Payments"],
    request_body = PaymentCallbackReq,
    responses(
        (status = 200, description = "Payment recorded as failed", body = StdResponse<PaymentCallbackRes, String>)
    )
)]
async fn payment_fail(
    State(state): State<AppState>,
    Json(body): Json<PaymentCallbackReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.tran_id.is_none() {
        return Err(AppError::BadRequest("Invalid payment data".into()));
    }
    let order_id = callback_order_id(body.value_a.as_deref())?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = diesel::update(orders::table.find(order_id))
        .set(orders::payment_status.eq(PaymentStatus::Failed.as_str()))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    tracing::info!("Payment for order #{} failed", order.id);

    Ok(StdResponse {
        data: Some(PaymentCallbackRes { order_id: order.id }),
        message: Some("Payment failed"),
    })
}

/// Buyer backed out at the gateway; nothing on the order changes.
#[utoipa::path(
    post,
    path = "/cancel",
    tags = ["Payments"],
    request_body = PaymentCallbackReq,
    responses(
        (status = 200, description = "Payment cancellation acknowledged", body = StdResponse<PaymentCallbackRes, String>)
    )
)]
async fn payment_cancel(
    Json(body): Json<PaymentCallbackReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.tran_id.is_none() {
        return Err(AppError::BadRequest("Invalid payment data".into()));
    }
    let order_id = callback_order_id(body.value_a.as_deref())?;

    Ok(StdResponse {
        data: Some(PaymentCallbackRes { order_id }),
        message: Some("Payment cancelled"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_reference_embeds_order_and_time() {
        let reference = transaction_reference(42, 1700000000000);
        assert_eq!(reference, "CEORDER-42-1700000000000");

        // Same order, later attempt: still unique.
        assert_ne!(reference, transaction_reference(42, 1700000000001));
    }

    #[test]
    fn callback_order_id_parses_pass_through_field() {
        assert_eq!(callback_order_id(Some("17")).unwrap(), 17);
        assert!(matches!(
            callback_order_id(Some("abc")).unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            callback_order_id(None).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }
}
