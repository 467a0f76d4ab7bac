//! Flare gRPC 拦截器
//!
//! 为 tonic 服务端与客户端提供统一的调用上下文：元数据桥接、RPC 信息解析、
//! 请求 ID、按入口名区分的日志与事件，以及可插拔的前置/后置钩子（内置 Basic 认证）。
//! 既可以在生成的服务方法里显式调用拦截器链，也可以通过 [`InterceptorLayer`]
//! 作为 tower 中间件整体安装。
//!
//! ```ignore
//! let chain = InterceptorChain::new()
//!     .with_entry_name("greeter")
//!     .with_hook(BasicAuthHook::new(options));
//!
//! chain
//!     .unary_server("/helloworld.Greeter/SayHello", request, |req, ctx| {
//!         Box::pin(async move { Ok(Response::new(reply(req, ctx))) })
//!     })
//!     .await
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod logging;

pub use config::{BasicAuthConfig, EntryConfig, InterceptorConfig, LoggingConfig};
pub use context::{
    CallContext, CallType, DEFAULT_ENTRY_NAME, EntryResolver, Event, GatewayInfo, NoopResolver,
    REQUEST_ID_KEY, RpcInfo, TracingResolver, lookup_incoming, lookup_outgoing, request_id,
};
pub use error::{AuthError, ErrorCode, InterceptorError, Result};
pub use interceptor::{
    BasicAuthHook, BasicAuthOptions, CallFuture, ContextStream, Hook, InterceptorChain,
    InterceptorLayer, InterceptorService, ServerStream,
};
pub use logging::init_tracing;
