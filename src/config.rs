use std::env;

/// Mercado Pago credentials (card/wallet gateway).
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    /// Shared secret for the `x-signature` webhook header.
    pub webhook_secret: String,
    pub api_url: String,
}

/// Flow credentials (bank-transfer gateway).
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub api_key: String,
    /// Shared secret used both to sign outbound calls and to verify
    /// confirmation callbacks.
    pub secret_key: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Base URL this service is reachable at (webhook confirmation URLs).
    pub base_url: String,
    /// Storefront base URL (customer return/redirect URLs).
    pub store_url: String,
    pub currency: String,
    /// Flat shipping charge added to every order, in the smallest currency unit.
    pub shipping_flat: i64,
    /// Shared key for the operator status-override endpoint.
    pub admin_api_key: Option<String>,
    pub dev_mode: bool,
    pub mercadopago: MercadoPagoConfig,
    pub flow: FlowConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TIENDA_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let store_url = env::var("STORE_URL").unwrap_or_else(|_| base_url.clone());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "tienda.db".to_string()),
            base_url,
            store_url,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "CLP".to_string()),
            shipping_flat: env::var("SHIPPING_FLAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            admin_api_key: env::var("ADMIN_API_KEY").ok(),
            dev_mode,
            mercadopago: MercadoPagoConfig {
                access_token: env::var("MP_ACCESS_TOKEN").unwrap_or_default(),
                webhook_secret: env::var("MP_WEBHOOK_SECRET").unwrap_or_default(),
                api_url: env::var("MP_API_URL")
                    .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            },
            flow: FlowConfig {
                api_key: env::var("FLOW_API_KEY").unwrap_or_default(),
                secret_key: env::var("FLOW_SECRET_KEY").unwrap_or_default(),
                api_url: env::var("FLOW_API_URL")
                    .unwrap_or_else(|_| "https://www.flow.cl/api".to_string()),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
