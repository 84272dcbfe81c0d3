use anyhow::{Context, Result};

#[derive(Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Students must register with an email ending in this domain.
    pub student_email_domain: String,
}

pub fn load() -> Result<Config> {
    Ok(Config {
        database: DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
        },
        server: ServerConfig {
            port: std::env::var("PORT")
                .unwrap_or("3000".to_string())
                .parse()
                .context("PORT is not a valid port number")?,
        },
        auth: AuthConfig {
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            token_ttl_days: std::env::var("TOKEN_TTL_DAYS")
                .unwrap_or("30".to_string())
                .parse()
                .context("TOKEN_TTL_DAYS is not a valid number of days")?,
            student_email_domain: std::env::var("STUDENT_EMAIL_DOMAIN")
                .unwrap_or("@cuet.ac.bd".to_string()),
        },
    })
}
