use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub nats: NatsConfig,
    pub registration: RegistrationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub topic_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistrationConfig {
    pub forbidden_usernames: Vec<String>,
    pub min_password_length: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("nats.topic_prefix", "reward")?
            .set_default(
                "registration.forbidden_usernames",
                vec!["admin", "administrator", "root", "moderator"],
            )?
            .set_default("registration.min_password_length", 4)?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("REWARD_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(port) = env::var("REWARD_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.nats.url.is_empty() {
            return Err("NATS URL is required".to_string());
        }

        if self.registration.min_password_length == 0 {
            return Err("Minimum password length cannot be 0".to_string());
        }

        Ok(())
    }
}
