use log::*;
use sgw_common::Secret;

const DEFAULT_API_URL: &str = "https://api.mercadolibre.com";

#[derive(Debug, Clone)]
pub struct MeliConfig {
    /// Base URL for the marketplace API. Overridable mainly for tests.
    pub api_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// The redirect URL registered with the marketplace application. Must match exactly,
    /// or code exchanges are rejected.
    pub redirect_url: String,
}

impl Default for MeliConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            client_id: String::default(),
            client_secret: Secret::default(),
            redirect_url: String::default(),
        }
    }
}

impl MeliConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("SGW_MELI_API_URL").unwrap_or_else(|_| {
            info!("SGW_MELI_API_URL not set, using {DEFAULT_API_URL}");
            DEFAULT_API_URL.to_string()
        });
        let client_id = std::env::var("SGW_MELI_CLIENT_ID").unwrap_or_else(|_| {
            warn!("SGW_MELI_CLIENT_ID is not set. Please set it to your marketplace application id.");
            String::default()
        });
        let client_secret = Secret::new(std::env::var("SGW_MELI_CLIENT_SECRET").unwrap_or_else(|_| {
            warn!("SGW_MELI_CLIENT_SECRET is not set. Please set it to your marketplace application secret.");
            String::default()
        }));
        let redirect_url = std::env::var("SGW_MELI_REDIRECT_URL").unwrap_or_else(|_| {
            warn!("SGW_MELI_REDIRECT_URL is not set. OAuth code exchanges will be rejected by the marketplace.");
            String::default()
        });
        Self { api_url, client_id, client_secret, redirect_url }
    }
}
