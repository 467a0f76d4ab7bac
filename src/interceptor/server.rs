//! 服务端拦截：一元调用与流式调用
//!
//! 调用进入时构建 [`CallContext`]：复制入站元数据、解析 `RpcInfo`、生成请求 ID；
//! 调用结束时把出站元数据写入响应（或错误 `Status`）的元数据。
//! 流式响应的结束以响应流的终止为准，见 [`ServerStream`]。

use futures::Stream;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

use super::chain::{CallFuture, InterceptorChain};
use super::stream::{ContextStream, ServerStream};
use crate::context::{self, CallContext, CallType, RpcInfo, metadata};

impl InterceptorChain {
    /// 拦截一元服务端调用
    ///
    /// `full_method` 为完整方法名，例如 `/helloworld.Greeter/SayHello`。
    /// 交给业务处理函数的请求上附带了上下文快照，可用 [`context::resolve`] 读取。
    pub async fn unary_server<Req, Resp, H>(
        &self,
        full_method: &str,
        request: Request<Req>,
        handler: H,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send,
        H: for<'a> FnOnce(Request<Req>, &'a mut CallContext) -> CallFuture<'a, Response<Resp>> + Send,
    {
        let mut ctx = self.server_context(CallType::UnaryServer, full_method, &request);
        let result = self
            .drive(&mut ctx, move |ctx| {
                // 前置钩子已执行，快照包含钩子写入的内容
                let request = context::attach(request, ctx.clone());
                handler(request, ctx)
            })
            .await;

        match result {
            Ok(mut response) => {
                metadata::merge_into(response.metadata_mut(), ctx.outgoing_metadata());
                finish_event(&ctx, None);
                Ok(response)
            }
            Err(status) => Err(reject(&ctx, status)),
        }
    }

    /// 拦截流式服务端调用
    ///
    /// 业务处理函数收到 [`ContextStream`]，返回的响应流被包装为 [`ServerStream`]：
    /// 调用上下文随响应流一起存活，响应流结束（或第一次出错）时才记录终止错误、
    /// 执行后置钩子并结束事件。
    pub async fn stream_server<S, R, T, H>(
        &self,
        full_method: &str,
        request: Request<S>,
        handler: H,
    ) -> Result<Response<ServerStream<R>>, Status>
    where
        S: Send + 'static,
        R: Stream<Item = Result<T, Status>> + Unpin + Send,
        H: for<'a> FnOnce(ContextStream<'a, S>) -> CallFuture<'a, Response<R>> + Send,
    {
        let mut ctx = self.server_context(CallType::StreamServer, full_method, &request);
        if let Err(status) = self.enter(&mut ctx) {
            return Err(reject(&ctx, status));
        }

        let stream = request.into_inner();
        let span = ctx.logger().clone();
        let result = handler(ContextStream::new(stream, &mut ctx))
            .instrument(span)
            .await;

        match result {
            Ok(response) => {
                let (mut md, inner, extensions) = response.into_parts();
                metadata::merge_into(&mut md, ctx.outgoing_metadata());
                let tracked = ServerStream::new(inner, ctx, self.clone());
                Ok(Response::from_parts(md, tracked, extensions))
            }
            Err(status) => {
                self.leave(&mut ctx, Some(&status));
                Err(reject(&ctx, status))
            }
        }
    }

    fn server_context<T>(&self, call_type: CallType, full_method: &str, request: &Request<T>) -> CallContext {
        let remote = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        self.server_context_from(call_type, full_method, metadata::read_incoming(request.metadata()), remote)
    }

    /// 由方法名、入站元数据与对端地址构建服务端调用上下文
    pub(crate) fn server_context_from(
        &self,
        call_type: CallType,
        full_method: &str,
        incoming: MetadataMap,
        remote: String,
    ) -> CallContext {
        let info = RpcInfo::resolve(call_type, full_method, &incoming, &remote);

        let resolver = self.resolver();
        let logger = resolver.logger(self.entry_name());
        let event = resolver.event(self.entry_name());
        event.add_pair("service", &info.service);
        event.add_pair("method", &info.method);
        event.add_pair("call_type", call_type.as_str());
        event.add_pair("remote", &remote);

        let mut ctx = CallContext::new()
            .with_entry_name(self.entry_name())
            .with_logger(logger)
            .with_event(event)
            .with_incoming_metadata(incoming)
            .with_rpc_info(info);
        let request_id = metadata::set_request_id(&mut ctx);
        ctx.event().add_pair("request_id", &request_id);

        tracing::debug!(
            parent: ctx.logger(),
            method = full_method,
            call_type = call_type.as_str(),
            remote = %remote,
            request_id = %request_id,
            "Server call started"
        );

        ctx
    }
}

/// 错误返回前写入出站元数据并结束事件，错误码与错误信息保持不变
pub(crate) fn reject(ctx: &CallContext, mut status: Status) -> Status {
    metadata::merge_into(status.metadata_mut(), ctx.outgoing_metadata());
    finish_event(ctx, Some(&status));
    status
}

/// 以调用结果结束事件
pub(crate) fn finish_event(ctx: &CallContext, outcome: Option<&Status>) {
    let event = ctx.event();
    match outcome {
        None => {
            event.finish("ok");
            tracing::debug!(parent: ctx.logger(), "Server call finished");
        }
        Some(status) => {
            event.add_error(status.message());
            event.finish("error");
            tracing::debug!(
                parent: ctx.logger(),
                code = ?status.code(),
                reason = status.message(),
                "Server call failed"
            );
        }
    }
}
