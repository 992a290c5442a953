use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// HMAC secret shared with the identity provider that issues bearer
    /// tokens. Tokens are validated here, never issued.
    pub access_token_secret: String,
    /// Explicit CORS origins; empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let access_token_secret = env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| crate::error::AppError::Config("ACCESS_TOKEN_SECRET missing".into()))?;
        if access_token_secret.len() < 16 {
            return Err(crate::error::AppError::Config(
                "ACCESS_TOKEN_SECRET must be at least 16 bytes".into(),
            ));
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| Self::parse_list(&v))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            port,
            access_token_secret,
            cors_allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_trims_and_drops_empties() {
        let parsed = Config::parse_list("https://a.example, https://b.example ,,  ");
        assert_eq!(parsed, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_parse_list_empty_input() {
        assert!(Config::parse_list("").is_empty());
    }
}
