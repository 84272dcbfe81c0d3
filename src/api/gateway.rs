use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::api::GatewayUrls;
use crate::app_error::AppError;

/// Everything the gateway needs to open a hosted checkout session. The
/// order id travels in `value_a` and comes back untouched on callbacks,
/// which is how they are correlated even if the buyer never returns.
#[derive(Serialize, Debug)]
pub struct InitiatePaymentReq {
    pub store_id: String,
    pub store_passwd: String,
    pub total_amount: f32,
    pub currency: String,
    pub tran_id: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub shipping_method: String,
    pub product_name: String,
    pub product_category: String,
    pub product_profile: String,
    pub cus_name: String,
    pub cus_email: String,
    pub cus_add1: String,
    pub cus_city: String,
    pub cus_country: String,
    pub cus_phone: String,
    pub value_a: String,
}

impl InitiatePaymentReq {
    pub fn new(
        tran_id: String,
        order_id: i32,
        total_amount: f32,
        vendor_name: &str,
        cus_name: &str,
        cus_email: &str,
        cus_phone: Option<&str>,
    ) -> Self {
        let client_url = GatewayUrls::get_client_url();

        Self {
            store_id: GatewayUrls::get_store_id(),
            store_passwd: GatewayUrls::get_store_password(),
            total_amount,
            currency: "BDT".to_string(),
            tran_id,
            success_url: format!("{client_url}/payment/success/{order_id}"),
            fail_url: format!("{client_url}/payment/fail/{order_id}"),
            cancel_url: format!("{client_url}/payment/cancel/{order_id}"),
            shipping_method: "NO".to_string(),
            product_name: format!("Order from {vendor_name}"),
            product_category: "Food".to_string(),
            product_profile: "general".to_string(),
            cus_name: cus_name.to_string(),
            cus_email: cus_email.to_string(),
            cus_add1: "Campus".to_string(),
            cus_city: "Chittagong".to_string(),
            cus_country: "Bangladesh".to_string(),
            cus_phone: cus_phone.unwrap_or("01700000000").to_string(),
            value_a: order_id.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct InitiatePaymentRes {
    pub status: Option<String>,
    #[serde(rename = "GatewayPageURL")]
    pub gateway_page_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ValidatePaymentRes {
    pub status: Option<String>,
}

impl ValidatePaymentRes {
    pub fn is_valid(&self) -> bool {
        self.status.as_deref() == Some("VALID")
    }
}

pub async fn initiate_payment(
    client: Client,
    req: &InitiatePaymentReq,
) -> Result<InitiatePaymentRes, AppError> {
    let url = format!("{}/gwprocess/v4/api.php", GatewayUrls::get_gateway_base_url());

    let res: InitiatePaymentRes = client
        .post(url)
        .form(req)
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("PaymentGateway".into()))?
        .json()
        .await
        .map_err(|_| AppError::UpstreamError("Payment initialization failed".into()))?;

    Ok(res)
}

/// Server-to-server re-validation of a success callback. Callbacks are
/// never trusted on their own.
pub async fn validate_payment(client: Client, val_id: &str) -> Result<ValidatePaymentRes, AppError> {
    let url = format!(
        "{}/validator/api/validationserverAPI.php",
        GatewayUrls::get_gateway_base_url()
    );

    let res: ValidatePaymentRes = client
        .get(url)
        .query(&[
            ("val_id", val_id.to_string()),
            ("store_id", GatewayUrls::get_store_id()),
            ("store_passwd", GatewayUrls::get_store_password()),
            ("format", "json".to_string()),
        ])
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("PaymentGateway".into()))?
        .json()
        .await
        .map_err(|_| AppError::UpstreamError("Payment validation failed".into()))?;

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_request_correlates_order_through_value_a() {
        let req = InitiatePaymentReq::new(
            "CEORDER-7-1700000000000".to_string(),
            7,
            250.0,
            "Campus Cafe",
            "Rahim",
            "rahim@cuet.ac.bd",
            None,
        );

        assert_eq!(req.value_a, "7");
        assert_eq!(req.total_amount, 250.0);
        assert_eq!(req.product_name, "Order from Campus Cafe");
        assert!(req.success_url.ends_with("/payment/success/7"));
        assert!(req.fail_url.ends_with("/payment/fail/7"));
        assert!(req.cancel_url.ends_with("/payment/cancel/7"));
        assert_eq!(req.cus_phone, "01700000000");
    }

    #[test]
    fn only_a_valid_verdict_passes() {
        let valid = ValidatePaymentRes {
            status: Some("VALID".to_string()),
        };
        let invalid = ValidatePaymentRes {
            status: Some("FAILED".to_string()),
        };
        let missing = ValidatePaymentRes { status: None };

        assert!(valid.is_valid());
        assert!(!invalid.is_valid());
        assert!(!missing.is_valid());
    }
}
