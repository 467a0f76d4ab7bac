//! 拦截器错误处理模块
//!
//! 提供统一的错误类型、错误代码以及到 gRPC `Status` 的转换

pub mod code;
pub mod grpc;

pub use code::ErrorCode;
pub use grpc::AuthError;

use thiserror::Error;

/// 拦截器核心错误类型
#[derive(Error, Debug)]
pub enum InterceptorError {
    /// 配置错误（选项构建、配置文件解析）
    #[error("configuration error: {0}")]
    Config(String),

    /// 元数据键或值不合法
    #[error("invalid metadata {kind} for key `{key}`")]
    InvalidMetadata { key: String, kind: &'static str },

    /// 认证失败
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl InterceptorError {
    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        InterceptorError::Config(msg.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            InterceptorError::Config(_) | InterceptorError::Toml(_) => {
                ErrorCode::ConfigurationError
            }
            InterceptorError::InvalidMetadata { kind: "key", .. } => ErrorCode::InvalidMetadataKey,
            InterceptorError::InvalidMetadata { .. } => ErrorCode::InvalidMetadataValue,
            InterceptorError::Auth(err) => err.code(),
            InterceptorError::Io(_) => ErrorCode::IoError,
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, InterceptorError>;
