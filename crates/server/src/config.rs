use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage_path: String,
    pub jwt_secret: String,
    pub whatsapp: WhatsAppConfig,
}

/// Credentials for the WhatsApp Cloud API. Token and sender are optional;
/// without them the notification route reports an upstream error.
#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub sender_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/buildtrack.db?mode=rwc".to_string()),
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "./data/projects".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            whatsapp: WhatsAppConfig {
                api_url: env::var("WHATSAPP_API_URL")
                    .unwrap_or_else(|_| "https://graph.facebook.com/v17.0".to_string()),
                token: non_empty_var("WHATSAPP_TOKEN"),
                sender_id: non_empty_var("WHATSAPP_SENDER_ID"),
            },
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
