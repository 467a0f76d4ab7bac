//! 日志初始化
//!
//! 拦截器本身只产生 `tracing` 事件，由宿主进程决定是否安装订阅者。

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// 安装全局 tracing 订阅者
///
/// `RUST_LOG` 优先于配置中的级别。重复安装返回错误。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = Registry::default().with(env_filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_fails() {
        let config = LoggingConfig::default();
        // 同一进程中其它测试可能已经安装过订阅者，第二次一定失败
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
