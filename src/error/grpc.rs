//! gRPC 错误处理
//!
//! 提供认证错误、拦截器错误与 `tonic::Status` 之间的转换

use super::{ErrorCode, InterceptorError};
use thiserror::Error;
use tonic::Status;

/// Basic 认证失败原因
///
/// 每个校验步骤对应一个独立的原因，全部映射为 `Unauthenticated`。
/// 注意前缀校验实际匹配的是 `Bearer `，错误文案沿用 `"Basic "`。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing auth header")]
    MissingHeader,

    #[error(r#"Missing "Basic " prefix in "Authorization" header"#)]
    MissingPrefix,

    #[error("Invalid base64 in header")]
    InvalidBase64,

    #[error("Invalid basic auth format")]
    InvalidFormat,

    #[error("Invalid username or password")]
    InvalidCredentials,
}

impl AuthError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::MissingHeader => ErrorCode::AuthenticationRequired,
            AuthError::MissingPrefix | AuthError::InvalidBase64 | AuthError::InvalidFormat => {
                ErrorCode::AuthenticationInvalid
            }
            AuthError::InvalidCredentials => ErrorCode::AuthenticationFailed,
        }
    }
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        Status::unauthenticated(err.to_string())
    }
}

impl From<InterceptorError> for Status {
    fn from(err: InterceptorError) -> Self {
        match err {
            InterceptorError::Auth(auth) => auth.into(),
            other => {
                let mut status = Status::new(other.code().grpc_code(), other.to_string());

                // 添加错误代码到 metadata
                if let Ok(value) = other.code().as_u32().to_string().parse() {
                    status.metadata_mut().insert("error-code", value);
                }

                status
            }
        }
    }
}
