use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::admission::domain::AcademicYear;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admissions: AdmissionsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            admissions: AdmissionsConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

const DEFAULT_HASH_COST: u32 = 10;

/// Numbering prefixes and admit defaults for the admission workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionsConfig {
    pub reference_prefix: String,
    pub admission_prefix: String,
    pub default_branch: String,
    pub default_section: String,
    /// Fixed academic year for admits; derived from the calendar when unset.
    pub academic_year: Option<AcademicYear>,
    pub password_hash_cost: u32,
}

impl Default for AdmissionsConfig {
    fn default() -> Self {
        Self {
            reference_prefix: "KSIS".to_string(),
            admission_prefix: "ADM".to_string(),
            default_branch: "Medavakkam, Chennai".to_string(),
            default_section: "A".to_string(),
            academic_year: None,
            password_hash_cost: DEFAULT_HASH_COST,
        }
    }
}

impl AdmissionsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let academic_year = match env::var("ADMISSIONS_ACADEMIC_YEAR") {
            Ok(raw) => Some(
                raw.parse::<AcademicYear>()
                    .map_err(|_| ConfigError::InvalidAcademicYear { value: raw })?,
            ),
            Err(_) => None,
        };

        let password_hash_cost = match env::var("ADMISSIONS_PASSWORD_HASH_COST") {
            Ok(raw) => {
                let cost = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidHashCost)?;
                if !(4..=31).contains(&cost) {
                    return Err(ConfigError::InvalidHashCost);
                }
                cost
            }
            Err(_) => defaults.password_hash_cost,
        };

        Ok(Self {
            reference_prefix: env::var("ADMISSIONS_REFERENCE_PREFIX")
                .unwrap_or(defaults.reference_prefix),
            admission_prefix: env::var("ADMISSIONS_ADMISSION_PREFIX")
                .unwrap_or(defaults.admission_prefix),
            default_branch: env::var("ADMISSIONS_DEFAULT_BRANCH")
                .unwrap_or(defaults.default_branch),
            default_section: env::var("ADMISSIONS_DEFAULT_SECTION")
                .unwrap_or(defaults.default_section),
            academic_year,
            password_hash_cost,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAcademicYear { value: String },
    InvalidHashCost,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAcademicYear { value } => write!(
                f,
                "ADMISSIONS_ACADEMIC_YEAR must look like 2025-2026 (found '{value}')"
            ),
            ConfigError::InvalidHashCost => {
                write!(f, "ADMISSIONS_PASSWORD_HASH_COST must be between 4 and 31")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidAcademicYear { .. }
            | ConfigError::InvalidHashCost => None,
        }
    }
}
