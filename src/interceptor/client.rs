//! 客户端拦截：一元调用与流式调用
//!
//! 调用前先快照上下文中已有的入站/出站元数据（嵌套在服务端调用中时由此继承请求头），
//! 根据目标地址与方法名解析 `RpcInfo`，再把合并后的元数据写入请求头。
//! 调用成功后响应头追加到上下文的入站元数据中。

use tonic::{Request, Response, Status};

use super::chain::{CallFuture, InterceptorChain};
use crate::context::{CallContext, CallType, RpcInfo, metadata};

impl InterceptorChain {
    /// 拦截一元客户端调用
    ///
    /// `scope` 为本次调用的上下文，可以是新的 [`CallContext`]，也可以是通过
    /// [`CallContext::inherit`] 从服务端调用派生的子上下文。
    pub async fn unary_client<Req, Resp, F>(
        &self,
        scope: &mut CallContext,
        target: &str,
        full_method: &str,
        request: Request<Req>,
        invoker: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: for<'a> FnOnce(Request<Req>, &'a mut CallContext) -> CallFuture<'a, Response<Resp>> + Send + 'static,
    {
        self.client_call(CallType::UnaryClient, scope, target, full_method, request, invoker)
            .await
    }

    /// 拦截流式客户端调用，`Resp` 通常为 `tonic::Streaming<T>`
    pub async fn stream_client<Req, Resp, F>(
        &self,
        scope: &mut CallContext,
        target: &str,
        full_method: &str,
        request: Request<Req>,
        invoker: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: for<'a> FnOnce(Request<Req>, &'a mut CallContext) -> CallFuture<'a, Response<Resp>> + Send + 'static,
    {
        self.client_call(CallType::StreamClient, scope, target, full_method, request, invoker)
            .await
    }

    async fn client_call<Req, Resp, F>(
        &self,
        call_type: CallType,
        scope: &mut CallContext,
        target: &str,
        full_method: &str,
        mut request: Request<Req>,
        invoker: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: for<'a> FnOnce(Request<Req>, &'a mut CallContext) -> CallFuture<'a, Response<Resp>> + Send + 'static,
    {
        self.client_context(call_type, scope, target, full_method);

        let result = self
            .drive(scope, move |ctx| {
                Box::pin(async move {
                    // 钩子执行完毕后再发布，钩子追加的出站元数据同样生效
                    metadata::copy_absent(request.metadata_mut(), ctx.outgoing_metadata());

                    let response = invoker(request, &mut *ctx).await?;
                    metadata::merge_into(ctx.incoming_metadata_mut(), response.metadata());
                    Ok::<_, Status>(response)
                })
            })
            .await;

        match &result {
            Ok(_) => tracing::debug!(parent: scope.logger(), "Client call finished"),
            Err(status) => tracing::debug!(
                parent: scope.logger(),
                code = ?status.code(),
                reason = status.message(),
                "Client call failed"
            ),
        }

        result
    }

    fn client_context(&self, call_type: CallType, scope: &mut CallContext, target: &str, full_method: &str) {
        // 新建的上下文没有日志与事件，由协作方提供；继承来的保持不变
        let resolver = self.resolver();
        if scope.logger().is_none() {
            scope.set_logger(resolver.logger(self.entry_name()));
        }
        if !scope.has_event() {
            scope.set_event(resolver.event(self.entry_name()));
        }
        scope.set_entry_name(self.entry_name());

        // 入站元数据中未被显式覆盖的键继承到出站元数据
        let incoming = scope.incoming_metadata().clone();
        metadata::inherit_into(scope.outgoing_metadata_mut(), &incoming);

        let info = RpcInfo::resolve(call_type, full_method, &incoming, target);
        scope.event().add_pair("service", &info.service);
        scope.event().add_pair("method", &info.method);
        scope.event().add_pair("call_type", call_type.as_str());
        scope.set_rpc_info(info);

        tracing::debug!(
            parent: scope.logger(),
            method = full_method,
            call_type = call_type.as_str(),
            remote = target,
            "Client call started"
        );
    }
}
