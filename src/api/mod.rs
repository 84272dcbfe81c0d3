pub mod gateway;

pub struct GatewayUrls;

impl GatewayUrls {
    pub fn get_gateway_base_url() -> String {
        std::env::var("PAYMENT_GATEWAY_URL")
            .unwrap_or("https://sandbox.sslcommerz.com".to_string())
    }

    pub fn get_store_id() -> String {
        std::env::var("PAYMENT_STORE_ID").unwrap_or("testbox".to_string())
    }

    pub fn get_store_password() -> String {
        std::env::var("PAYMENT_STORE_PASSWORD").unwrap_or("qwerty".to_string())
    }

    /// Base URL the gateway redirects buyers back to.
    pub fn get_client_url() -> String {
        std::env::var("CLIENT_URL").unwrap_or("http://localhost:5173".to_string())
    }
}
