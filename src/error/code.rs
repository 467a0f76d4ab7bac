//! 错误代码定义
//!
//! 拦截器核心只关心认证、元数据与配置三类错误，代码按类别分段：
//! - 2000-2999: 认证相关错误
//! - 3000-3999: 元数据相关错误
//! - 6000-6999: 系统/配置相关错误

use serde::{Deserialize, Serialize};
use std::fmt;
use tonic::Code;

/// 错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 认证相关错误 (2000-2999)
    // ============================================================
    AuthenticationRequired = 2000,
    AuthenticationInvalid = 2001,
    AuthenticationFailed = 2002,

    // ============================================================
    // 元数据相关错误 (3000-3999)
    // ============================================================
    InvalidMetadataKey = 3000,
    InvalidMetadataValue = 3001,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    InternalError = 6000,
    ConfigurationError = 6001,
    IoError = 6002,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorCode::AuthenticationInvalid => "AUTHENTICATION_INVALID",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::InvalidMetadataKey => "INVALID_METADATA_KEY",
            ErrorCode::InvalidMetadataValue => "INVALID_METADATA_VALUE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::IoError => "IO_ERROR",
        }
    }

    /// 映射到 gRPC 状态码
    pub fn grpc_code(&self) -> Code {
        match self.as_u32() {
            2000..=2999 => Code::Unauthenticated,
            3000..=3999 => Code::InvalidArgument,
            _ => Code::Internal,
        }
    }
}
