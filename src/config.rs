//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// 令牌有效期上限：十年
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:8080"
    pub addr: String,
    /// 优雅关闭宽限时间（秒），超时后强制退出
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 令牌签名密钥（HS256，至少 32 字符）
    pub jwt_secret: Secret<String>,
    /// 令牌有效期（秒），写入 `expires` 声明
    pub token_ttl_secs: u64,
    /// 校验时是否拒绝已过期的 `expires`
    pub enforce_token_expiry: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// 初始 operator 账号邮箱
    pub operator_email: String,
    /// 初始 operator 账号密码
    pub operator_password: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRefreshConfig {
    /// 策略缓存刷新间隔（秒）
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub bootstrap: BootstrapConfig,
    pub policy_refresh: PolicyRefreshConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:8080")?
            .set_default("server.graceful_shutdown_timeout_secs", 5)?
            .set_default("database.url", "postgresql://localhost/authz")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.token_ttl_secs", 365 * 3600)?
            .set_default("security.enforce_token_expiry", true)?
            .set_default("bootstrap.operator_email", "operator@localhost")?
            .set_default("bootstrap.operator_password", "change-this-operator-password")?
            .set_default("policy_refresh.interval_secs", 60)?;

        // 从环境变量加载配置（前缀为 AUTHZ_）
        settings = settings.add_source(
            Environment::with_prefix("AUTHZ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证签名密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.security.token_ttl_secs == 0 {
            return Err(ConfigError::Message("token_ttl_secs must be > 0".to_string()));
        }

        if self.security.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Message(format!(
                "token_ttl_secs must be <= {}",
                MAX_TOKEN_TTL_SECS
            )));
        }

        if self.policy_refresh.interval_secs == 0 {
            return Err(ConfigError::Message(
                "policy_refresh.interval_secs must be > 0".to_string(),
            ));
        }

        if !self.bootstrap.operator_email.contains('@') {
            return Err(ConfigError::Message(
                "bootstrap.operator_email must be an email address".to_string(),
            ));
        }

        Ok(())
    }
}
