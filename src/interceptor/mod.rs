//! gRPC 拦截器模块
//!
//! 提供拦截器链（服务端/客户端 × 一元/流式四种调用形态）、流包装以及 Basic 认证钩子

pub mod auth;
pub mod chain;
pub mod client;
pub mod layer;
pub mod server;
pub mod stream;

pub use auth::{BasicAuthHook, BasicAuthOptions};
pub use chain::{CallFuture, InterceptorChain};
pub use layer::{InterceptorLayer, InterceptorService};
pub use stream::{ContextStream, ServerStream};

use tonic::Status;

use crate::context::CallContext;

/// 拦截器钩子
///
/// 同一调用内，前置钩子与后置钩子都按安装顺序同步执行。前置钩子返回错误时，
/// 调用立即终止：业务处理函数不会执行，后置钩子也不会执行。
pub trait Hook: Send + Sync {
    /// 钩子名称，用于日志
    fn name(&self) -> &'static str;

    /// 前置钩子，可读写调用上下文，返回错误则终止调用
    fn before(&self, _ctx: &mut CallContext) -> Result<(), Status> {
        Ok(())
    }

    /// 后置钩子，此时 `RpcInfo` 中已记录终止错误
    fn after(&self, _ctx: &mut CallContext) {}
}
