use std::{env, fs, path::PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://localhost:8080"];

const DEFAULT_DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "png", "jpg", "jpeg"];

const MAX_QUESTION_COUNT: u32 = 200;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    security: SecuritySettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    redis: RedisSettings,
    ai: AiSettings,
    storage: StorageSettings,
    s3: S3Settings,
    exam: ExamSettings,
    admin: AdminSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    host: ServerHost,
    port: ServerPort,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) access_token_expire_minutes: u64,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
    pub(crate) max_connections: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) db: u16,
    pub(crate) password: String,
}

#[derive(Debug, Clone)]
pub(crate) struct AiSettings {
    pub(crate) openai_api_key: String,
    pub(crate) openai_base_url: String,
    pub(crate) ai_model: String,
    pub(crate) ai_max_tokens: u32,
    pub(crate) ai_temperature: f64,
    pub(crate) ai_request_timeout: u64,
    pub(crate) ai_max_retries: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageSettings {
    pub(crate) max_document_size_mb: u64,
    pub(crate) allowed_document_extensions: Vec<String>,
    pub(crate) max_files_per_exam: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct S3Settings {
    pub(crate) endpoint: String,
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) bucket: String,
    pub(crate) region: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamSettings {
    pub(crate) auto_save_interval_seconds: u64,
    pub(crate) submit_grace_seconds: u64,
    pub(crate) default_question_count: u32,
    pub(crate) presigned_url_expire_minutes: u64,
    pub(crate) timer_sweep_interval_seconds: u64,
    pub(crate) grading_max_attempts: u32,
    pub(crate) grading_stale_minutes: u64,
    pub(crate) grading_worker_concurrency: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct AdminSettings {
    pub(crate) first_superuser_username: String,
    pub(crate) first_superuser_password: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerHost(String);

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPort(u16);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAM_ASSIST_HOST", "0.0.0.0");
        let port = env_or_default("EXAM_ASSIST_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAM_ASSIST_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAM_ASSIST_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Assist API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam_assist");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_assist");
        let database_url = env_optional("DATABASE_URL");
        let database_max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;
        require_positive("DATABASE_MAX_CONNECTIONS", u64::from(database_max_connections))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let ai = AiSettings::from_env()?;
        let storage = StorageSettings::from_env()?;
        let exam = ExamSettings::from_env()?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "https://s3.amazonaws.com");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "exam-assist-documents");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let first_superuser_username = env_or_default("FIRST_SUPERUSER_USERNAME", "admin");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("EXAM_ASSIST_LOG_LEVEL", "info");
        let json = env_optional("EXAM_ASSIST_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections: database_max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai,
            storage,
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            exam,
            admin: AdminSettings { first_superuser_username, first_superuser_password },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn max_document_bytes(&self) -> u64 {
        self.storage.max_document_bytes()
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.ai.validate()?;
        self.storage.validate()?;
        self.exam.validate()?;

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }

        if self.ai.openai_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
        }

        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}

impl AiSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            openai_api_key: env_or_default("OPENAI_API_KEY", ""),
            openai_base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ai_model: env_or_default("AI_MODEL", "gpt-4o"),
            ai_max_tokens: parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "8000"))?,
            ai_temperature: parse_f64(
                "AI_TEMPERATURE",
                env_or_default("AI_TEMPERATURE", "0.2"),
            )?,
            ai_request_timeout: parse_u64(
                "AI_REQUEST_TIMEOUT",
                env_or_default("AI_REQUEST_TIMEOUT", "300"),
            )?,
            ai_max_retries: parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "3"))?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.ai_temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai_temperature.to_string(),
            });
        }
        require_positive("AI_MAX_TOKENS", u64::from(self.ai_max_tokens))?;
        require_positive("AI_REQUEST_TIMEOUT", self.ai_request_timeout)
    }
}

impl StorageSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_document_size_mb: parse_u64(
                "MAX_DOCUMENT_SIZE_MB",
                env_or_default("MAX_DOCUMENT_SIZE_MB", "20"),
            )?,
            allowed_document_extensions: parse_string_list(
                env_optional("ALLOWED_DOCUMENT_EXTENSIONS"),
                DEFAULT_DOCUMENT_EXTENSIONS,
            ),
            max_files_per_exam: parse_u64(
                "MAX_FILES_PER_EXAM",
                env_or_default("MAX_FILES_PER_EXAM", "5"),
            )?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_document_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_DOCUMENT_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }
        if let Some(extension) = self
            .allowed_document_extensions
            .iter()
            .find(|extension| !is_supported_document_extension(extension))
        {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_DOCUMENT_EXTENSIONS",
                value: extension.clone(),
            });
        }
        require_positive("MAX_DOCUMENT_SIZE_MB", self.max_document_size_mb)?;
        require_positive("MAX_FILES_PER_EXAM", self.max_files_per_exam)
    }

    pub(crate) fn max_document_bytes(&self) -> u64 {
        self.max_document_size_mb * 1024 * 1024
    }
}

impl ExamSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            auto_save_interval_seconds: parse_u64(
                "AUTO_SAVE_INTERVAL_SECONDS",
                env_or_default("AUTO_SAVE_INTERVAL_SECONDS", "5"),
            )?,
            submit_grace_seconds: parse_u64(
                "SUBMIT_GRACE_SECONDS",
                env_or_default("SUBMIT_GRACE_SECONDS", "60"),
            )?,
            default_question_count: parse_u32(
                "DEFAULT_QUESTION_COUNT",
                env_or_default("DEFAULT_QUESTION_COUNT", "10"),
            )?,
            presigned_url_expire_minutes: parse_u64(
                "PRESIGNED_URL_EXPIRE_MINUTES",
                env_or_default("PRESIGNED_URL_EXPIRE_MINUTES", "15"),
            )?,
            timer_sweep_interval_seconds: parse_u64(
                "TIMER_SWEEP_INTERVAL_SECONDS",
                env_or_default("TIMER_SWEEP_INTERVAL_SECONDS", "30"),
            )?,
            grading_max_attempts: parse_u32(
                "GRADING_MAX_ATTEMPTS",
                env_or_default("GRADING_MAX_ATTEMPTS", "3"),
            )?,
            grading_stale_minutes: parse_u64(
                "GRADING_STALE_MINUTES",
                env_or_default("GRADING_STALE_MINUTES", "15"),
            )?,
            grading_worker_concurrency: parse_u64(
                "GRADING_WORKER_CONCURRENCY",
                env_or_default("GRADING_WORKER_CONCURRENCY", "3"),
            )? as usize,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_QUESTION_COUNT).contains(&self.default_question_count) {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_QUESTION_COUNT",
                value: self.default_question_count.to_string(),
            });
        }
        require_positive("AUTO_SAVE_INTERVAL_SECONDS", self.auto_save_interval_seconds)?;
        require_positive("PRESIGNED_URL_EXPIRE_MINUTES", self.presigned_url_expire_minutes)?;
        require_positive("TIMER_SWEEP_INTERVAL_SECONDS", self.timer_sweep_interval_seconds)?;
        require_positive("GRADING_MAX_ATTEMPTS", u64::from(self.grading_max_attempts))?;
        require_positive("GRADING_STALE_MINUTES", self.grading_stale_minutes)?;
        require_positive("GRADING_WORKER_CONCURRENCY", self.grading_worker_concurrency as u64)
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue { field, value: value.to_string() });
    }
    Ok(())
}

fn parse_f64(field: &'static str, value: String) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { field, value }),
    }
}

fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(default_cors_origins());
    };

    if raw.trim().is_empty() {
        return Ok(default_cors_origins());
    }

    if raw.trim_start().starts_with('[') {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?;
        if parsed.is_empty() {
            return Ok(default_cors_origins());
        }
        return Ok(parsed);
    }

    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Ok(default_cors_origins());
    }

    Ok(items)
}

fn default_cors_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect()
}

fn parse_string_list(value: Option<String>, defaults: &[&str]) -> Vec<String> {
    match value {
        Some(raw) => raw
            .split(',')
            .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect(),
        None => defaults.iter().map(|item| item.to_string()).collect(),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

fn is_supported_document_extension(extension: &str) -> bool {
    matches!(extension, "pdf" | "docx" | "txt" | "png" | "jpg" | "jpeg" | "webp")
}

fn load_or_create_secret_key() -> String {
    let path = secret_file_path();

    if let Ok(value) = fs::read_to_string(&path) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let new_key = generate_secret_key();

    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(error = %err, path = %parent.display(), "Failed to create secret key directory");
        }
    }

    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
                    tracing::warn!(error = %err, path = %path.display(), "Failed to set secret key file permissions");
                }
            }
            if let Err(err) = std::io::Write::write_all(&mut file, new_key.as_bytes()) {
                tracing::warn!(error = %err, path = %path.display(), "Failed to write secret key file");
            }
            return new_key;
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            if let Ok(value) = fs::read_to_string(&path) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "Failed to create secret key file");
        }
    }

    new_key
}

fn generate_secret_key() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn secret_file_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".secret_key")
}
