use std::path::Path;

use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://propostas.db";
pub const DEFAULT_LOG_FILE: &str = "app.log";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";

/// Env files that were applied or skipped, kept so they can be logged once
/// tracing is up.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvFiles {
    pub loaded: Vec<&'static str>,
    pub missing: Vec<&'static str>,
}

impl EnvFiles {
    pub fn log(&self) {
        for path in &self.missing {
            warn!("Environment file {} not found, skipping", path);
        }
        for path in &self.loaded {
            info!("Loaded environment from: {}", path);
        }
    }
}

/// Files are applied most specific first without overriding, so the process
/// environment beats `.secrets.env`, which beats the profile file, which
/// beats `config/common.env`.
pub fn load_environment() -> Result<EnvFiles, dotenvy::Error> {
    let is_production =
        dotenvy::var("APP_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        [".secrets.env", "config/prod.env", "config/common.env"]
    } else {
        [".secrets.env", "config/dev.env", "config/common.env"]
    };

    let mut files = EnvFiles::default();
    for env_file in env_files {
        if load_env_file(env_file)? {
            files.loaded.push(env_file);
        } else {
            files.missing.push(env_file);
        }
    }

    Ok(files)
}

fn load_env_file(path: &str) -> Result<bool, dotenvy::Error> {
    if !Path::new(path).exists() {
        return Ok(false);
    }

    dotenvy::from_filename(path)?;
    Ok(true)
}

/// SMTP settings. `None` from [`MailConfig::from_env`] means mail is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl MailConfig {
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;
        let smtp_user = std::env::var("SMTP_USER").ok();

        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .ok()
                .or_else(|| smtp_user.clone())
                .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user,
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}
