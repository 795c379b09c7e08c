//! 采集管道统一错误类型
//!
//! - `FaultKind` 对上游故障进行分类，决定是否重试
//! - `UpstreamFault` 保留上游返回的原始诊断三元组（code / message / meta）
//! - `PipelineError` 是管道各组件对外的统一错误类型

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// 故障分类
///
/// `RateLimited` 与 `Transient` 可重试，其余一律直接上抛。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// 凭证缺失（启动期致命错误）
    MissingCredential,
    /// 上游限流
    RateLimited,
    /// 瞬时故障（超时、不可用等）
    Transient,
    /// 请求本身非法，重试无意义
    PermanentValidation,
    /// 鉴权被拒
    AuthorizationDenied,
    /// 无法归类的故障
    Unknown,
}

impl FaultKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaultKind::RateLimited | FaultKind::Transient)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::MissingCredential => "missing_credential",
            FaultKind::RateLimited => "rate_limited",
            FaultKind::Transient => "transient",
            FaultKind::PermanentValidation => "permanent_validation",
            FaultKind::AuthorizationDenied => "authorization_denied",
            FaultKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// 上游服务故障
///
/// 除分类结果外，必须完整保留上游返回的 code、消息与结构化元数据，
/// 便于日志与调用方定位问题。
#[derive(Debug, Clone, Error)]
#[error("[{kind}] code={code}: {message}")]
pub struct UpstreamFault {
    pub kind: FaultKind,
    pub code: String,
    pub message: String,
    pub meta: HashMap<String, String>,
}

impl UpstreamFault {
    pub fn new(kind: FaultKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            meta: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// 重试预算耗尽后对外呈现为瞬时故障，原始诊断信息保留，
    /// 尝试次数记入 meta。
    pub fn exhausted(mut self, attempts: u32) -> Self {
        self.kind = FaultKind::Transient;
        self.meta.insert("attempts".to_string(), attempts.to_string());
        self
    }
}

/// 管道统一错误类型
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 凭证缺失，启动前即失败，错误信息必须指明密钥获取位置
    #[error("missing credential {name}: {hint}")]
    MissingCredential { name: String, hint: String },

    /// 采样条件非法（如 rating_min >= rating_max），不发起任何网络调用
    #[error("invalid criteria: {0}")]
    Validation(String),

    /// 上游服务故障
    #[error("{service} fault: {fault}")]
    Upstream {
        service: &'static str,
        fault: UpstreamFault,
    },

    /// 持久化失败
    #[error("storage error: {0}")]
    Storage(String),

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn upstream(service: &'static str, fault: UpstreamFault) -> Self {
        PipelineError::Upstream { service, fault }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
