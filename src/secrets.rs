//! 启动期凭证加载
//!
//! 凭证在任何组件构造之前显式加载并校验，缺失即快速失败，
//! 错误信息指明密钥在 Vault 中的获取位置。

use std::env;

use crate::error::{PipelineError, Result};

pub const USER_PROPERTIES_API_KEY: &str = "USER_PROPERTIES_API_KEY";
pub const GAME_ARCHIVE_API_KEY: &str = "GAME_ARCHIVE_API_KEY";

const USER_PROPERTIES_HINT: &str =
    "environment variable is not set. To get the API key in Vault, go to chess-prod > platform > user-properties";
const GAME_ARCHIVE_HINT: &str =
    "environment variable is not set. To get the API key in Vault, go to cluster-chess-prod-va-01 > platform > foundation > game-archive";

/// 两个上游服务的 API Key
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_properties_api_key: String,
    pub game_archive_api_key: String,
}

impl Credentials {
    /// 从进程环境读取凭证
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意查找函数读取凭证，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_properties_api_key =
            require(&lookup, USER_PROPERTIES_API_KEY, USER_PROPERTIES_HINT)?;
        let game_archive_api_key = require(&lookup, GAME_ARCHIVE_API_KEY, GAME_ARCHIVE_HINT)?;
        Ok(Self {
            user_properties_api_key,
            game_archive_api_key,
        })
    }
}

fn require<F>(lookup: &F, name: &str, hint: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PipelineError::MissingCredential {
            name: name.to_string(),
            hint: hint.to_string(),
        }),
    }
}
