//! RPC 调用信息
//!
//! 每次调用在链路入口解析一次，在调用结束时再写入一次终止错误

use std::fmt;

use tonic::Status;
use tonic::metadata::MetadataMap;

use super::metadata::first_value;

/// grpc-gateway 转发的原始 HTTP 方法
pub const GATEWAY_METHOD_KEY: &str = "x-forwarded-method";
/// grpc-gateway 转发的原始 HTTP 路径
pub const GATEWAY_PATH_KEY: &str = "x-forwarded-path";
/// grpc-gateway 转发的原始 scheme
pub const GATEWAY_SCHEME_KEY: &str = "x-forwarded-scheme";
/// grpc-gateway 转发的原始 User-Agent
pub const GATEWAY_USER_AGENT_KEY: &str = "x-forwarded-user-agent";

/// 调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    UnaryServer,
    StreamServer,
    UnaryClient,
    StreamClient,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::UnaryServer => "UnaryServer",
            CallType::StreamServer => "StreamServer",
            CallType::UnaryClient => "UnaryClient",
            CallType::StreamClient => "StreamClient",
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, CallType::UnaryServer | CallType::StreamServer)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, CallType::StreamServer | CallType::StreamClient)
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 网关转发信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayInfo {
    pub method: String,
    pub path: String,
    pub scheme: String,
    pub user_agent: String,
}

impl GatewayInfo {
    /// 从入站元数据中提取网关字段，缺失的键返回空字符串
    pub fn from_metadata(md: &MetadataMap) -> Self {
        Self {
            method: first_value(md, GATEWAY_METHOD_KEY),
            path: first_value(md, GATEWAY_PATH_KEY),
            scheme: first_value(md, GATEWAY_SCHEME_KEY),
            user_agent: first_value(md, GATEWAY_USER_AGENT_KEY),
        }
    }
}

/// RPC 调用信息
#[derive(Debug, Clone)]
pub struct RpcInfo {
    pub service: String,
    pub method: String,
    pub gateway_method: String,
    pub gateway_path: String,
    pub gateway_scheme: String,
    pub gateway_user_agent: String,
    pub call_type: CallType,
    pub remote_ip: String,
    pub remote_port: String,
    /// 调用结束时写入；成功调用保持为 `None`
    pub terminal_error: Option<Status>,
}

impl RpcInfo {
    /// 根据完整方法名、入站元数据与对端地址构建调用信息
    ///
    /// `full_method` 形如 `/package.Service/Method`，`remote` 形如 `host:port`。
    pub fn resolve(call_type: CallType, full_method: &str, incoming: &MetadataMap, remote: &str) -> Self {
        let (service, method) = split_method(full_method);
        let gateway = GatewayInfo::from_metadata(incoming);
        let (remote_ip, remote_port) = split_host_port(remote);

        Self {
            service: service.to_string(),
            method: method.to_string(),
            gateway_method: gateway.method,
            gateway_path: gateway.path,
            gateway_scheme: gateway.scheme,
            gateway_user_agent: gateway.user_agent,
            call_type,
            remote_ip: remote_ip.to_string(),
            remote_port: remote_port.to_string(),
            terminal_error: None,
        }
    }

    /// 记录调用的终止错误
    pub fn record_error(&mut self, err: Option<Status>) {
        self.terminal_error = err;
    }

    /// 调用是否成功结束
    pub fn is_ok(&self) -> bool {
        self.terminal_error.is_none()
    }

    /// 重新拼接的完整方法名
    pub fn full_method(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

/// 在最后一个 `/` 处切分方法名，去掉前导 `/`
pub fn split_method(full_method: &str) -> (&str, &str) {
    let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);
    match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// 在最后一个 `:` 处切分地址，没有端口时端口为空
pub fn split_host_port(addr: &str) -> (&str, &str) {
    let addr = addr
        .strip_prefix("http://")
        .or_else(|| addr.strip_prefix("https://"))
        .unwrap_or(addr);

    // [::1]:8080 / [::1]
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => {
                let host = &rest[..end];
                let port = rest[end + 1..].strip_prefix(':').unwrap_or("");
                (host, port)
            }
            None => (addr, ""),
        };
    }

    match addr.rfind(':') {
        // 多个冒号且无方括号时视为纯 IPv6 地址
        Some(_) if addr.matches(':').count() > 1 => (addr, ""),
        Some(idx) => (&addr[..idx], &addr[idx + 1..]),
        None => (addr, ""),
    }
}
