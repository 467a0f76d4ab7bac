//! 流包装
//!
//! 把底层双向流与调用上下文放在一起，收发操作原样转发，不做缓冲，
//! 不改变消息的分帧、顺序与流控。

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tonic::Status;

use super::chain::InterceptorChain;
use super::server::finish_event;
use crate::context::CallContext;

/// 携带调用上下文的流
#[derive(Debug)]
pub struct ContextStream<'a, S> {
    inner: S,
    ctx: &'a mut CallContext,
}

impl<'a, S> ContextStream<'a, S> {
    pub fn new(inner: S, ctx: &'a mut CallContext) -> Self {
        Self { inner, ctx }
    }

    pub fn context(&self) -> &CallContext {
        &*self.ctx
    }

    pub fn context_mut(&mut self) -> &mut CallContext {
        &mut *self.ctx
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// 拆出底层流
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// 接收下一条消息
    pub async fn recv(&mut self) -> Option<S::Item>
    where
        S: Stream + Unpin,
    {
        self.inner.next().await
    }

    /// 发送一条消息
    pub async fn send<I>(&mut self, item: I) -> Result<(), S::Error>
    where
        S: Sink<I> + Unpin,
    {
        self.inner.send(item).await
    }
}

impl<S> Stream for ContextStream<'_, S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S, I> Sink<I> for ContextStream<'_, S>
where
    S: Sink<I> + Unpin,
{
    type Error = S::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

/// 服务端响应流
///
/// 持有调用上下文直到响应流结束。第一次出现 `Err` 或流正常结束时记录终止错误、
/// 执行后置钩子并结束事件；流在结束前被丢弃（例如客户端取消）记为 `Cancelled`。
pub struct ServerStream<R> {
    inner: R,
    ctx: CallContext,
    chain: InterceptorChain,
    done: bool,
}

impl<R> ServerStream<R> {
    pub(crate) fn new(inner: R, ctx: CallContext, chain: InterceptorChain) -> Self {
        Self {
            inner,
            ctx,
            chain,
            done: false,
        }
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut CallContext {
        &mut self.ctx
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// 调用是否已经结束（后置钩子已执行）
    pub fn is_terminated(&self) -> bool {
        self.done
    }

    fn complete(&mut self, outcome: Option<Status>) {
        if self.done {
            return;
        }
        self.done = true;
        self.chain.leave(&mut self.ctx, outcome.as_ref());
        finish_event(&self.ctx, outcome.as_ref());
    }
}

impl<R, T> Stream for ServerStream<R>
where
    R: Stream<Item = Result<T, Status>> + Unpin,
{
    type Item = R::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Err(status))) => self.complete(Some(status.clone())),
            Poll::Ready(None) => self.complete(None),
            _ => {}
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<R> Drop for ServerStream<R> {
    fn drop(&mut self) {
        if !self.done {
            self.complete(Some(Status::cancelled("response stream dropped before completion")));
        }
    }
}

impl<R> fmt::Debug for ServerStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStream")
            .field("ctx", &self.ctx)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
