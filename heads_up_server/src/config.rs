//! 服务器配置
//!
//! 所有环境变量都在这里集中读取一次，其余模块只接触校验过的 [`ServerConfig`]。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// 监听地址
    pub bind: SocketAddr,
    /// 每个连接发送 keepAlive 事件和 ping 的间隔
    pub keepalive: Duration,
    /// 超过这么久没有活动的连接会被清理
    pub idle_timeout: Duration,
    /// 重连令牌的有效期
    pub token_ttl: Duration,
    /// 每个订阅者发送队列的长度，队列满视为投递失败
    pub subscriber_buffer: usize,
    /// 快照目录；为空时使用内存存储
    pub snapshot_dir: Option<PathBuf>,
    /// 每次状态变更后自动持久化
    pub persist_on_update: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 25917)),
            keepalive: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            token_ttl: Duration::from_secs(30 * 60),
            subscriber_buffer: 32,
            snapshot_dir: None,
            persist_on_update: true,
        }
    }
}

impl ServerConfig {
    /// 从环境变量读取配置，未设置的项使用默认值
    ///
    /// 调用前应先用 `dotenvy::dotenv()` 载入 `.env` 文件。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 用任意的键值来源构造配置，测试时不需要修改进程环境变量
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        let config = ServerConfig {
            bind: parse_env_or(&lookup, "SERVER_BIND", defaults.bind)?,
            keepalive: Duration::from_secs(parse_env_or(&lookup, "KEEPALIVE_SECS", defaults.keepalive.as_secs())?),
            idle_timeout: Duration::from_secs(parse_env_or(
                &lookup,
                "IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
            token_ttl: Duration::from_secs(parse_env_or(&lookup, "TOKEN_TTL_SECS", defaults.token_ttl.as_secs())?),
            subscriber_buffer: parse_env_or(&lookup, "SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
            snapshot_dir: lookup("SNAPSHOT_DIR").filter(|dir| !dir.trim().is_empty()).map(PathBuf::from),
            persist_on_update: parse_env_or(&lookup, "PERSIST_ON_UPDATE", defaults.persist_on_update)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive.is_zero() {
            return Err(ConfigError::Invalid { var: "KEEPALIVE_SECS".to_string(), reason: "必须大于 0".to_string() });
        }
        if self.idle_timeout <= self.keepalive {
            return Err(ConfigError::Invalid {
                var: "IDLE_TIMEOUT_SECS".to_string(),
                reason: "必须大于 KEEPALIVE_SECS，否则正常连接也会被清理".to_string(),
            });
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid { var: "SUBSCRIBER_BUFFER".to_string(), reason: "必须大于 0".to_string() });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("环境变量 {var} 的值 {value:?} 无法解析")]
    Unparsable { var: String, value: String },
    #[error("配置项 {var} 无效: {reason}")]
    Invalid { var: String, reason: String },
}

/// 读取并解析一个环境变量，未设置时返回默认值
fn parse_env_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparsable { var: key.to_string(), value }),
    }
}
