//! 调用上下文模块
//!
//! 每个进行中的调用拥有一个 [`CallContext`]，由拦截器链以 `&mut` 的形式依次传给
//! 各个钩子和业务处理函数。读取接口总是返回可用的默认值，调用方无需判空。

pub mod event;
pub mod metadata;
pub mod rpc_info;

pub use event::{EntryResolver, Event, NoopEvent, NoopResolver, TracingEvent, TracingResolver};
pub use metadata::{REQUEST_ID_KEY, lookup_incoming, lookup_outgoing, request_id};
pub use rpc_info::{CallType, GatewayInfo, RpcInfo};

use std::sync::Arc;

use tonic::Request;
use tonic::metadata::MetadataMap;
use tracing::Span;

use crate::error::Result;

/// 未设置入口名时使用的默认名称
pub const DEFAULT_ENTRY_NAME: &str = "grpc-default";

/// 单次调用的上下文载荷
#[derive(Debug, Clone)]
pub struct CallContext {
    entry_name: String,
    logger: Span,
    event: Arc<dyn Event>,
    incoming: MetadataMap,
    outgoing: MetadataMap,
    rpc_info: Option<RpcInfo>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            entry_name: DEFAULT_ENTRY_NAME.to_string(),
            logger: Span::none(),
            event: event::noop_event(),
            incoming: MetadataMap::new(),
            outgoing: MetadataMap::new(),
            rpc_info: None,
        }
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为嵌套在服务端调用中的客户端调用创建子上下文
    ///
    /// 继承入口名、日志、事件以及两份元数据，不继承 `RpcInfo`。
    pub fn inherit(parent: &CallContext) -> Self {
        Self {
            rpc_info: None,
            ..parent.clone()
        }
    }

    #[must_use]
    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        self.set_entry_name(name);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: Arc<dyn Event>) -> Self {
        self.event = event;
        self
    }

    #[must_use]
    pub fn with_incoming_metadata(mut self, md: MetadataMap) -> Self {
        self.incoming = md;
        self
    }

    #[must_use]
    pub fn with_outgoing_metadata(mut self, md: MetadataMap) -> Self {
        self.outgoing = md;
        self
    }

    #[must_use]
    pub fn with_rpc_info(mut self, info: RpcInfo) -> Self {
        self.rpc_info = Some(info);
        self
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// 空名称保持默认入口名
    pub fn set_entry_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.entry_name = if name.is_empty() {
            DEFAULT_ENTRY_NAME.to_string()
        } else {
            name
        };
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Span) {
        self.logger = logger;
    }

    pub fn event(&self) -> &Arc<dyn Event> {
        &self.event
    }

    pub fn set_event(&mut self, event: Arc<dyn Event>) {
        self.event = event;
    }

    /// 是否已经挂载了非空事件
    pub fn has_event(&self) -> bool {
        !self.event.is_noop()
    }

    pub fn incoming_metadata(&self) -> &MetadataMap {
        &self.incoming
    }

    pub fn incoming_metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.incoming
    }

    pub fn set_incoming_metadata(&mut self, md: MetadataMap) {
        self.incoming = md;
    }

    pub fn outgoing_metadata(&self) -> &MetadataMap {
        &self.outgoing
    }

    pub fn outgoing_metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.outgoing
    }

    /// 追加一条出站元数据，同名键累积
    pub fn add_outgoing(&mut self, key: &str, value: &str) -> Result<()> {
        metadata::merge_outgoing(&mut self.outgoing, key, value)
    }

    pub fn rpc_info(&self) -> Option<&RpcInfo> {
        self.rpc_info.as_ref()
    }

    pub fn rpc_info_mut(&mut self) -> Option<&mut RpcInfo> {
        self.rpc_info.as_mut()
    }

    pub fn set_rpc_info(&mut self, info: RpcInfo) {
        self.rpc_info = Some(info);
    }

    /// 将终止错误写入 `RpcInfo`（如果已解析）
    pub fn record_terminal_error(&mut self, err: Option<tonic::Status>) {
        if let Some(info) = self.rpc_info.as_mut() {
            info.record_error(err);
        }
    }
}

/// 将上下文附加到请求上，返回携带上下文的请求
pub fn attach<T>(mut req: Request<T>, ctx: CallContext) -> Request<T> {
    req.extensions_mut().insert(ctx);
    req
}

/// 取得请求携带的上下文，没有时返回新的默认上下文
pub fn resolve<T>(req: &Request<T>) -> CallContext {
    req.extensions()
        .get::<CallContext>()
        .cloned()
        .unwrap_or_default()
}

/// 请求是否携带上下文
pub fn contains<T>(req: &Request<T>) -> bool {
    req.extensions().get::<CallContext>().is_some()
}

/// 从请求中取出上下文，没有时返回新的默认上下文
pub fn detach<T>(req: &mut Request<T>) -> CallContext {
    req.extensions_mut()
        .remove::<CallContext>()
        .unwrap_or_default()
}

pub fn entry_name<T>(req: &Request<T>) -> String {
    req.extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.entry_name().to_string())
        .unwrap_or_else(|| DEFAULT_ENTRY_NAME.to_string())
}

pub fn logger<T>(req: &Request<T>) -> Span {
    req.extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.logger().clone())
        .unwrap_or_else(Span::none)
}

pub fn event<T>(req: &Request<T>) -> Arc<dyn Event> {
    req.extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.event().clone())
        .unwrap_or_else(event::noop_event)
}

/// 入站元数据；请求未携带上下文时回退到传输层的元数据
pub fn incoming_metadata<T>(req: &Request<T>) -> MetadataMap {
    match req.extensions().get::<CallContext>() {
        Some(ctx) => ctx.incoming_metadata().clone(),
        None => metadata::read_incoming(req.metadata()),
    }
}

pub fn outgoing_metadata<T>(req: &Request<T>) -> MetadataMap {
    req.extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.outgoing_metadata().clone())
        .unwrap_or_default()
}

pub fn rpc_info<T>(req: &Request<T>) -> Option<RpcInfo> {
    req.extensions()
        .get::<CallContext>()
        .and_then(|ctx| ctx.rpc_info().cloned())
}
