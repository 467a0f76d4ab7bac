//! 元数据桥接
//!
//! 在传输层 `MetadataMap` 与调用上下文缓存之间复制、合并元数据。
//! 复制与合并同时处理 ASCII 与二进制（`-bin`）条目；读取函数都是全函数，
//! 缺失或非法的键只会得到空结果。

use tonic::metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue};
use uuid::Uuid;

use super::CallContext;
use crate::error::{InterceptorError, Result};

/// 请求 ID 元数据键，每次服务端调用都会写入响应元数据
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// 不随客户端调用继承的传输层保留头
const RESERVED_KEYS: &[&str] = &["te", "content-type", "user-agent", "authorization"];

/// 复制入站元数据
pub fn read_incoming(md: &MetadataMap) -> MetadataMap {
    let mut copy = MetadataMap::with_capacity(md.len());
    merge_into(&mut copy, md);
    copy
}

/// 向出站元数据追加一个值，同名键的多个值会累积而不会被覆盖
pub fn merge_outgoing(md: &mut MetadataMap, key: &str, value: &str) -> Result<()> {
    let key = MetadataKey::<Ascii>::from_bytes(key.as_bytes()).map_err(|_| {
        InterceptorError::InvalidMetadata {
            key: key.to_string(),
            kind: "key",
        }
    })?;
    let value = value
        .parse::<MetadataValue<Ascii>>()
        .map_err(|_| InterceptorError::InvalidMetadata {
            key: key.as_str().to_string(),
            kind: "value",
        })?;

    md.append(key, value);
    Ok(())
}

/// 读取某个键的全部值，按插入顺序返回
pub fn values(md: &MetadataMap, key: &str) -> Vec<String> {
    md.get_all(key)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// 读取某个二进制键（`-bin` 后缀）的全部值，值为解码后的字节
pub fn binary_values(md: &MetadataMap, key: &str) -> Vec<Vec<u8>> {
    md.get_all_bin(key)
        .iter()
        .filter_map(|v| v.to_bytes().ok())
        .map(|bytes| bytes.to_vec())
        .collect()
}

/// 读取某个键的第一个值，缺失时返回空字符串
pub fn first_value(md: &MetadataMap, key: &str) -> String {
    md.get(key)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// 将 `source` 的全部条目追加到 `target`
pub fn merge_into(target: &mut MetadataMap, source: &MetadataMap) {
    for entry in source.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                target.append(key.clone(), value.clone());
            }
            KeyAndValueRef::Binary(key, value) => {
                target.append_bin(key.clone(), value.clone());
            }
        }
    }
}

/// 将 `source` 中 `target` 尚未包含的键（连同全部值）复制过去
///
/// 已存在于 `target` 的键视为调用方显式覆盖，保持不变。
pub fn copy_absent(target: &mut MetadataMap, source: &MetadataMap) {
    copy_filtered(target, source, |_| true);
}

/// 与 [`copy_absent`] 相同，但跳过传输层保留头，用于客户端继承入站元数据
pub fn inherit_into(target: &mut MetadataMap, source: &MetadataMap) {
    copy_filtered(target, source, |key| !is_reserved(key));
}

fn copy_filtered(target: &mut MetadataMap, source: &MetadataMap, keep: impl Fn(&str) -> bool) {
    // 先收集再合并，同一个键的多个值要么全部复制，要么全部跳过
    let mut absent = MetadataMap::new();
    for entry in source.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                if keep(key.as_str()) && !target.contains_key(key.as_str()) {
                    absent.append(key.clone(), value.clone());
                }
            }
            KeyAndValueRef::Binary(key, value) => {
                if keep(key.as_str()) && !target.contains_key(key.as_str()) {
                    absent.append_bin(key.clone(), value.clone());
                }
            }
        }
    }
    merge_into(target, &absent);
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key) || key.starts_with("grpc-") || key.starts_with(':')
}

/// 从调用上下文的入站元数据中查找某个键
pub fn lookup_incoming(ctx: &CallContext, key: &str) -> Vec<String> {
    values(ctx.incoming_metadata(), key)
}

/// 从调用上下文的出站元数据中查找某个键
pub fn lookup_outgoing(ctx: &CallContext, key: &str) -> Vec<String> {
    values(ctx.outgoing_metadata(), key)
}

/// 生成新的请求 ID 并写入出站元数据
pub fn set_request_id(ctx: &mut CallContext) -> String {
    let request_id = Uuid::new_v4().to_string();
    // UUID 总是合法的 ASCII 元数据值
    if let Ok(value) = request_id.parse::<MetadataValue<Ascii>>() {
        ctx.outgoing_metadata_mut().append(REQUEST_ID_KEY, value);
    }
    request_id
}

/// 读取出站元数据中的请求 ID，没有时返回空字符串
pub fn request_id(ctx: &CallContext) -> String {
    first_value(ctx.outgoing_metadata(), REQUEST_ID_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_outgoing_accumulates_values() {
        let mut md = MetadataMap::new();
        merge_outgoing(&mut md, "ut-key", "v1").unwrap();
        merge_outgoing(&mut md, "ut-key", "v2").unwrap();

        assert_eq!(values(&md, "ut-key"), vec!["v1", "v2"]);
    }

    #[test]
    fn merge_outgoing_rejects_invalid_key() {
        let mut md = MetadataMap::new();
        let err = merge_outgoing(&mut md, "bad key", "v").unwrap_err();
        assert!(matches!(err, InterceptorError::InvalidMetadata { kind: "key", .. }));
        assert!(md.is_empty());
    }

    #[test]
    fn merge_outgoing_rejects_invalid_value() {
        let mut md = MetadataMap::new();
        let err = merge_outgoing(&mut md, "ut-key", "line\nbreak").unwrap_err();
        assert!(matches!(err, InterceptorError::InvalidMetadata { kind: "value", .. }));
    }

    #[test]
    fn lookups_are_total() {
        let md = MetadataMap::new();
        assert!(values(&md, "missing").is_empty());
        assert!(values(&md, "not a key").is_empty());
        assert_eq!(first_value(&md, "missing"), "");

        let ctx = CallContext::default();
        assert!(lookup_incoming(&ctx, "missing").is_empty());
        assert!(lookup_outgoing(&ctx, "missing").is_empty());
        assert_eq!(request_id(&ctx), "");
    }

    #[test]
    fn read_incoming_copies_ascii_and_binary_entries() {
        let mut md = MetadataMap::new();
        md.append("ut-key", "a".parse().unwrap());
        md.append("ut-key", "b".parse().unwrap());
        md.insert_bin("trace-bin", MetadataValue::from_bytes(b"\x00\x01"));

        let copy = read_incoming(&md);
        assert_eq!(values(&copy, "ut-key"), vec!["a", "b"]);
        assert_eq!(binary_values(&copy, "trace-bin"), vec![vec![0u8, 1]]);
        // 二进制键不出现在字符串读取结果中
        assert!(values(&copy, "trace-bin").is_empty());
    }

    #[test]
    fn inherit_into_copies_binary_entries() {
        let mut source = MetadataMap::new();
        source.append_bin("trace-bin", MetadataValue::from_bytes(b"a"));
        source.append_bin("trace-bin", MetadataValue::from_bytes(b"b"));
        source.insert_bin("grpc-status-details-bin", MetadataValue::from_bytes(b"x"));

        let mut target = MetadataMap::new();
        inherit_into(&mut target, &source);
        assert_eq!(binary_values(&target, "trace-bin"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(target.get_bin("grpc-status-details-bin").is_none());
    }

    #[test]
    fn inherit_into_keeps_explicit_overrides() {
        let mut source = MetadataMap::new();
        source.insert("x-tenant", "from-server".parse().unwrap());
        source.insert("x-user-id", "u-1".parse().unwrap());
        source.insert("user-agent", "grpc-go".parse().unwrap());
        source.insert("grpc-timeout", "1S".parse().unwrap());

        let mut target = MetadataMap::new();
        target.insert("x-tenant", "explicit".parse().unwrap());

        inherit_into(&mut target, &source);
        assert_eq!(values(&target, "x-tenant"), vec!["explicit"]);
        assert_eq!(values(&target, "x-user-id"), vec!["u-1"]);
        assert!(target.get("user-agent").is_none());
        assert!(target.get("grpc-timeout").is_none());
    }

    #[test]
    fn copy_absent_copies_every_value_of_missing_keys() {
        let mut source = MetadataMap::new();
        source.append("authorization", "Bearer abc".parse().unwrap());
        source.append("x-tag", "a".parse().unwrap());
        source.append("x-tag", "b".parse().unwrap());

        let mut target = MetadataMap::new();
        copy_absent(&mut target, &source);
        assert_eq!(values(&target, "x-tag"), vec!["a", "b"]);
        assert_eq!(values(&target, "authorization"), vec!["Bearer abc"]);
    }

    #[test]
    fn request_id_is_generated_per_call() {
        let mut first = CallContext::default();
        let mut second = CallContext::default();
        let a = set_request_id(&mut first);
        let b = set_request_id(&mut second);

        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert_eq!(request_id(&first), a);
        assert_eq!(lookup_outgoing(&first, REQUEST_ID_KEY), vec![a]);
    }
}
