use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::DEFAULT_ENTRY_NAME;
use crate::error::{InterceptorError, Result};

/// 拦截器配置，通常从 TOML 文件加载
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InterceptorConfig {
    #[serde(default)]
    pub entry: EntryConfig,
    pub basic_auth: Option<BasicAuthConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryConfig {
    #[serde(default = "default_entry_name")]
    pub name: String,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            name: default_entry_name(),
        }
    }
}

fn default_entry_name() -> String {
    DEFAULT_ENTRY_NAME.to_string()
}

/// Basic 认证配置
///
/// 凭据可以写成表（`credentials`），也可以写成 `user:pass` 形式的列表（`credential_lines`），
/// 两者合并后使用。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub credential_lines: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl BasicAuthConfig {
    /// 合并后的用户名到密码的映射
    pub fn credential_table(&self) -> Result<HashMap<String, String>> {
        let mut table = self.credentials.clone();
        for line in &self.credential_lines {
            let (user, password) = line
                .split_once(':')
                .filter(|(user, _)| !user.is_empty())
                .ok_or_else(|| {
                    InterceptorError::config(format!("credential line must be user:pass, got {line:?}"))
                })?;
            table.insert(user.to_string(), password.to_string());
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl InterceptorConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = InterceptorConfig::from_toml_str("").unwrap();
        assert_eq!(config.entry.name, "grpc-default");
        assert!(config.basic_auth.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn basic_auth_section_is_parsed() {
        let config = InterceptorConfig::from_toml_str(
            r#"
            [entry]
            name = "greeter"

            [basic_auth]
            credential_lines = ["bob:hunter2"]

            [basic_auth.credentials]
            alice = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.entry.name, "greeter");
        let auth = config.basic_auth.unwrap();
        assert!(auth.enabled);
        let table = auth.credential_table().unwrap();
        assert_eq!(table.get("alice").map(String::as_str), Some("secret"));
        assert_eq!(table.get("bob").map(String::as_str), Some("hunter2"));
    }

    #[test]
    fn malformed_credential_line_is_rejected() {
        let auth = BasicAuthConfig {
            enabled: true,
            credentials: HashMap::new(),
            credential_lines: vec!["no-separator".to_string()],
        };
        assert!(matches!(auth.credential_table(), Err(InterceptorError::Config(_))));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(matches!(
            InterceptorConfig::from_toml_str("entry = ["),
            Err(InterceptorError::Toml(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            InterceptorConfig::load_from_file("/nonexistent/interceptor.toml"),
            Err(InterceptorError::Io(_))
        ));
    }
}
