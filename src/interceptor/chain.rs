use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tonic::Status;
use tracing::Instrument;

use super::Hook;
use super::auth::{BasicAuthHook, BasicAuthOptions};
use crate::config::InterceptorConfig;
use crate::context::{CallContext, CallType, DEFAULT_ENTRY_NAME, EntryResolver, TracingResolver};
use crate::error::Result;

/// 业务处理函数 / 调用器返回的 future，借用调用上下文
pub type CallFuture<'a, T> = BoxFuture<'a, std::result::Result<T, Status>>;

/// 拦截器链
///
/// 安装后只读，可通过 `Arc` 在任意多个并发调用之间共享。每个调用拥有自己的
/// [`CallContext`]，调用之间不共享可变状态。
#[derive(Clone)]
pub struct InterceptorChain {
    entry_name: String,
    resolver: Arc<dyn EntryResolver>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("entry_name", &self.entry_name)
            .field("hooks", &self.hook_names())
            .finish_non_exhaustive()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self {
            entry_name: DEFAULT_ENTRY_NAME.to_string(),
            resolver: Arc::new(TracingResolver),
            hooks: Vec::new(),
        }
    }

    /// 根据配置构建拦截器链，配置了 Basic 认证时安装认证钩子
    pub fn from_config(config: &InterceptorConfig, call_type: CallType) -> Result<Self> {
        let mut chain = Self::new().with_entry_name(config.entry.name.clone());

        if let Some(ref basic_auth) = config.basic_auth {
            let options = BasicAuthOptions::new(call_type, basic_auth)?;
            chain = chain.with_hook(BasicAuthHook::new(options));
        }

        Ok(chain)
    }

    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.entry_name = name;
        }
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EntryResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// 追加钩子，按安装顺序执行
    pub fn with_hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    pub(crate) fn resolver(&self) -> &dyn EntryResolver {
        self.resolver.as_ref()
    }

    /// 驱动单次调用：前置钩子 -> 调用 -> 记录终止错误 -> 后置钩子
    pub(crate) async fn drive<T, F>(&self, ctx: &mut CallContext, invoke: F) -> std::result::Result<T, Status>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut CallContext) -> CallFuture<'a, T> + Send,
    {
        self.enter(ctx)?;

        let span = ctx.logger().clone();
        let result = invoke(&mut *ctx).instrument(span).await;

        self.leave(ctx, result.as_ref().err());
        result
    }

    /// 执行前置钩子；失败时记录终止错误，调用方不得再执行后置钩子
    pub(crate) fn enter(&self, ctx: &mut CallContext) -> std::result::Result<(), Status> {
        if let Err(status) = self.run_before(ctx) {
            ctx.record_terminal_error(Some(status.clone()));
            return Err(status);
        }
        Ok(())
    }

    /// 记录终止错误并执行后置钩子
    pub(crate) fn leave(&self, ctx: &mut CallContext, outcome: Option<&Status>) {
        ctx.record_terminal_error(outcome.cloned());
        self.run_after(ctx);
    }

    fn run_before(&self, ctx: &mut CallContext) -> std::result::Result<(), Status> {
        for hook in &self.hooks {
            if let Err(status) = hook.before(ctx) {
                tracing::warn!(
                    parent: ctx.logger(),
                    hook = hook.name(),
                    code = ?status.code(),
                    reason = status.message(),
                    "Call aborted by hook"
                );
                return Err(status);
            }
        }
        Ok(())
    }

    fn run_after(&self, ctx: &mut CallContext) {
        for hook in &self.hooks {
            hook.after(ctx);
        }
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 记录执行顺序的钩子
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Hook for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn before(&self, _ctx: &mut CallContext) -> std::result::Result<(), Status> {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            if self.fail {
                return Err(Status::permission_denied("denied"));
            }
            Ok(())
        }

        fn after(&self, ctx: &mut CallContext) {
            let ok = ctx.rpc_info().map(|info| info.is_ok()).unwrap_or(true);
            self.log.lock().unwrap().push(format!("{}:after:{}", self.name, ok));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
            fail,
        }
    }

    #[tokio::test]
    async fn hooks_run_in_installation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with_hook(recorder("first", &log, false))
            .with_hook(recorder("second", &log, false));

        let mut ctx = CallContext::new();
        let invoke_log = log.clone();
        let result = chain
            .drive(&mut ctx, move |_ctx| {
                Box::pin(async move {
                    invoke_log.lock().unwrap().push("invoke".to_string());
                    Ok::<_, Status>(7)
                })
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:before", "second:before", "invoke", "first:after:true", "second:after:true"]
        );
    }

    #[tokio::test]
    async fn failing_before_hook_skips_invoke_and_after_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with_hook(recorder("gate", &log, true))
            .with_hook(recorder("never", &log, false));

        let mut ctx = CallContext::new();
        let invoke_log = log.clone();
        let result: std::result::Result<(), Status> = chain
            .drive(&mut ctx, move |_ctx| {
                Box::pin(async move {
                    invoke_log.lock().unwrap().push("invoke".to_string());
                    Ok::<_, Status>(())
                })
            })
            .await;

        assert_eq!(result.unwrap_err().code(), tonic::Code::PermissionDenied);
        assert_eq!(*log.lock().unwrap(), vec!["gate:before"]);
    }

    #[test]
    fn empty_entry_name_is_ignored() {
        let chain = InterceptorChain::new().with_entry_name("");
        assert_eq!(chain.entry_name(), DEFAULT_ENTRY_NAME);
        assert!(chain.hook_names().is_empty());
    }
}
