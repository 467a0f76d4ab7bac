//! tower 中间件
//!
//! 把拦截器链作为 `tower::Layer` 安装到 tonic 服务上，例如
//! `Server::builder().layer(InterceptorLayer::new(chain))`。
//! 每个 HTTP/2 请求构建一个调用上下文，前置钩子失败时直接返回 gRPC 错误响应；
//! 上下文快照放入请求扩展，生成的服务代码可用 [`crate::context::resolve`] 读取。

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tonic::metadata::MetadataMap;
use tonic::transport::server::TcpConnectInfo;
use tonic::{Code, Status};
use tower::{Layer, Service};

use super::chain::InterceptorChain;
use super::server::{finish_event, reject};
use crate::context::{CallContext, CallType};

/// 拦截器中间件层
#[derive(Debug, Clone)]
pub struct InterceptorLayer {
    chain: InterceptorChain,
    call_type: CallType,
}

impl InterceptorLayer {
    /// HTTP 层无法区分调用形态，默认按一元服务端调用记录
    pub fn new(chain: InterceptorChain) -> Self {
        Self {
            chain,
            call_type: CallType::UnaryServer,
        }
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }
}

impl<S> Layer<S> for InterceptorLayer {
    type Service = InterceptorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptorService {
            inner,
            chain: self.chain.clone(),
            call_type: self.call_type,
        }
    }
}

/// 拦截器中间件服务
#[derive(Debug, Clone)]
pub struct InterceptorService<S> {
    inner: S,
    chain: InterceptorChain,
    call_type: CallType,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for InterceptorService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // 使用已就绪的服务，留下克隆体等待下一次 poll_ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let chain = self.chain.clone();
        let call_type = self.call_type;

        Box::pin(async move {
            let mut ctx = request_context(&chain, call_type, &req);
            if let Err(status) = chain.enter(&mut ctx) {
                return Ok(reject(&ctx, status).into_http());
            }

            req.extensions_mut().insert(ctx.clone());
            match inner.call(req).await {
                Ok(mut response) => {
                    append_headers(response.headers_mut(), ctx.outgoing_metadata());
                    // 只能观察到 trailers-only 的错误响应
                    let outcome = Status::from_header_map(response.headers())
                        .filter(|status| status.code() != Code::Ok);
                    chain.leave(&mut ctx, outcome.as_ref());
                    finish_event(&ctx, outcome.as_ref());
                    Ok(response)
                }
                Err(err) => {
                    let status = Status::unknown("inner service failed");
                    chain.leave(&mut ctx, Some(&status));
                    finish_event(&ctx, Some(&status));
                    Err(err)
                }
            }
        })
    }
}

fn request_context<B>(chain: &InterceptorChain, call_type: CallType, req: &http::Request<B>) -> CallContext {
    let incoming = MetadataMap::from_headers(req.headers().clone());
    let remote = req
        .extensions()
        .get::<TcpConnectInfo>()
        .and_then(TcpConnectInfo::remote_addr)
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    chain.server_context_from(call_type, req.uri().path(), incoming, remote)
}

fn append_headers(headers: &mut http::HeaderMap, outgoing: &MetadataMap) {
    let outgoing = outgoing.clone().into_headers();
    for (name, value) in &outgoing {
        headers.append(name.clone(), value.clone());
    }
}
