use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tonic::Status;
use tracing::{debug, warn};

use super::Hook;
use crate::config::BasicAuthConfig;
use crate::context::{CallContext, CallType, lookup_incoming};
use crate::error::{AuthError, Result};

/// 认证头
pub const AUTHORIZATION_KEY: &str = "authorization";

/// 认证头前缀
pub const SCHEME_PREFIX: &str = "Bearer ";

/// Basic 认证选项，在安装拦截器时构建一次，之后只读
#[derive(Debug, Clone)]
pub struct BasicAuthOptions {
    call_type: CallType,
    enabled: bool,
    credentials: HashMap<String, String>,
}

impl BasicAuthOptions {
    /// 根据配置构建选项
    ///
    /// 启用认证但凭据表为空时视为配置错误。
    pub fn new(call_type: CallType, config: &BasicAuthConfig) -> Result<Self> {
        let credentials = config.credential_table()?;
        if config.enabled && credentials.is_empty() {
            return Err(crate::error::InterceptorError::config(
                "basic auth is enabled but no credentials are configured",
            ));
        }

        Ok(Self {
            call_type,
            enabled: config.enabled,
            credentials,
        })
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// 用户名与密码是否精确匹配凭据表
    pub fn authorized(&self, username: &str, password: &str) -> bool {
        self.credentials
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}

/// Basic 认证钩子
#[derive(Debug, Clone)]
pub struct BasicAuthHook {
    options: Arc<BasicAuthOptions>,
}

impl BasicAuthHook {
    pub fn new(options: BasicAuthOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &BasicAuthOptions {
        &self.options
    }

    /// 校验认证头，返回通过认证的用户名
    pub fn validate(&self, ctx: &CallContext) -> std::result::Result<String, AuthError> {
        let values = lookup_incoming(ctx, AUTHORIZATION_KEY);
        let raw = values.first().ok_or(AuthError::MissingHeader)?;

        let encoded = raw
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(AuthError::MissingPrefix)?;

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidBase64)?;
        let credential = String::from_utf8_lossy(&decoded);

        let (username, password) = credential
            .split_once(':')
            .ok_or(AuthError::InvalidFormat)?;

        if !self.options.authorized(username, password) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(username.to_string())
    }
}

impl Hook for BasicAuthHook {
    fn name(&self) -> &'static str {
        "basic-auth"
    }

    fn before(&self, ctx: &mut CallContext) -> std::result::Result<(), Status> {
        if !self.options.enabled {
            return Ok(());
        }

        match self.validate(ctx) {
            Ok(username) => {
                debug!(
                    parent: ctx.logger(),
                    user = %username,
                    call_type = self.options.call_type.as_str(),
                    "Request authenticated"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    parent: ctx.logger(),
                    reason = %err,
                    call_type = self.options.call_type.as_str(),
                    "Basic auth rejected"
                );
                ctx.event().add_error(&err.to_string());
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataMap;

    fn hook(user: &str, password: &str) -> BasicAuthHook {
        let config = BasicAuthConfig {
            enabled: true,
            credentials: HashMap::from([(user.to_string(), password.to_string())]),
            credential_lines: Vec::new(),
        };
        BasicAuthHook::new(BasicAuthOptions::new(CallType::UnaryServer, &config).unwrap())
    }

    fn context_with_header(value: &str) -> CallContext {
        let mut md = MetadataMap::new();
        md.insert(AUTHORIZATION_KEY, value.parse().unwrap());
        CallContext::new().with_incoming_metadata(md)
    }

    fn bearer(credential: &str) -> String {
        format!("Bearer {}", STANDARD.encode(credential))
    }

    #[test]
    fn valid_credentials_pass() {
        let mut ctx = context_with_header(&bearer("alice:secret"));
        assert_eq!(hook("alice", "secret").validate(&ctx), Ok("alice".to_string()));
        assert!(hook("alice", "secret").before(&mut ctx).is_ok());
    }

    #[test]
    fn password_may_contain_separator() {
        let ctx = context_with_header(&bearer("alice:se:cret"));
        assert!(hook("alice", "se:cret").validate(&ctx).is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let mut ctx = context_with_header(&bearer("alice:secret"));
        let status = hook("alice", "wrong").before(&mut ctx).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert_eq!(status.message(), "Invalid username or password");
    }

    #[test]
    fn missing_header_fails_first() {
        let ctx = CallContext::new();
        assert_eq!(hook("alice", "secret").validate(&ctx), Err(AuthError::MissingHeader));
    }

    #[test]
    fn basic_scheme_is_a_prefix_error() {
        let value = format!("Basic {}", STANDARD.encode("alice:secret"));
        let ctx = context_with_header(&value);
        assert_eq!(hook("alice", "secret").validate(&ctx), Err(AuthError::MissingPrefix));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let ctx = context_with_header("Bearer not*base64");
        assert_eq!(hook("alice", "secret").validate(&ctx), Err(AuthError::InvalidBase64));
    }

    #[test]
    fn credential_without_separator_is_rejected() {
        let ctx = context_with_header(&bearer("alicesecret"));
        assert_eq!(hook("alice", "secret").validate(&ctx), Err(AuthError::InvalidFormat));
    }

    #[test]
    fn unknown_user_is_rejected() {
        let ctx = context_with_header(&bearer("bob:secret"));
        assert_eq!(hook("alice", "secret").validate(&ctx), Err(AuthError::InvalidCredentials));
    }

    #[test]
    fn disabled_hook_passes_everything() {
        let config = BasicAuthConfig {
            enabled: false,
            credentials: HashMap::new(),
            credential_lines: Vec::new(),
        };
        let hook = BasicAuthHook::new(BasicAuthOptions::new(CallType::StreamServer, &config).unwrap());
        assert!(!hook.options().enabled());
        assert!(hook.before(&mut CallContext::new()).is_ok());
    }

    #[test]
    fn enabled_without_credentials_is_a_config_error() {
        let config = BasicAuthConfig {
            enabled: true,
            credentials: HashMap::new(),
            credential_lines: Vec::new(),
        };
        assert!(BasicAuthOptions::new(CallType::UnaryServer, &config).is_err());
    }
}
