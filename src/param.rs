// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了服务器遵循的 HTTP/1.0 与 HTTP/0.9 协议相关常量和数据结构，包括：
//! - 服务器可能产生的状态码及其原因短语（Reason Phrase）。
//! - 扩展名到 MIME 类型的映射表（内置分类器使用）。
//! - HTTP 方法与协议代际的强类型枚举。

use lazy_static::lazy_static;
use std::{collections::HashMap, fmt};

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "shaneyale-webserver/1.0";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 响应状态行中使用的协议版本
pub const HTTP_VERSION: &str = "HTTP/1.0";

/// 唯一允许的请求方法，用于 `Allow` 头
pub const ALLOWED_METHODS: &str = "GET";

/// MIME 分类失败时的兜底类型
pub const DEFAULT_MIME: &str = "text/html; charset=utf-8";

/// 错误响应使用的内容类型
pub const ERROR_CONTENT_TYPE: &str = "text/html";

/// 错误响应的占位正文，长度恰为 1 字节
pub const PLACEHOLDER_BODY: &[u8] = b"\n";

/// 未知状态码的原因短语
pub const UNKNOWN_STATUS_PHRASE: &str = "Unknown Status";

/// 文件正文传输的最大尝试次数
pub const MAX_TRANSFER_ATTEMPTS: usize = 3;

lazy_static! {
    /// 状态码与原因短语映射表。
    ///
    /// 只包含服务器实际会产生的状态码，其他状态码通过 [`reason_phrase`] 得到通用短语。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(400, "Bad Request");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(414, "URI Too Long");
        map.insert(500, "Internal Server Error");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表，供扩展名分类器使用。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("bin", "application/octet-stream");
        map.insert("bmp", "image/bmp");
        map.insert("css", "text/css; charset=utf-8");
        map.insert("csv", "text/csv; charset=utf-8");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html; charset=utf-8");
        map.insert("html", "text/html; charset=utf-8");
        map.insert("ico", "image/x-icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript; charset=utf-8");
        map.insert("json", "application/json; charset=utf-8");
        map.insert("md", "text/markdown; charset=utf-8");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("svg", "image/svg+xml");
        map.insert("tar", "application/x-tar");
        map.insert("txt", "text/plain; charset=utf-8");
        map.insert("wasm", "application/wasm");
        map.insert("webp", "image/webp");
        map.insert("woff2", "font/woff2");
        map.insert("xml", "text/xml; charset=utf-8");
        map.insert("zip", "application/zip");
        map
    };
}

/// 状态码到原因短语的全函数。未知状态码返回通用短语，不会失败。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES
        .get(&code)
        .copied()
        .unwrap_or(UNKNOWN_STATUS_PHRASE)
}

/// 请求所属的协议代际
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// HTTP/0.9：没有版本号、没有头部，响应只包含正文
    Legacy,
    /// HTTP/1.0：带版本号、头部与状态行
    Modern,
}

impl Generation {
    /// 该代际的响应是否需要状态行
    pub fn status_required(&self) -> bool {
        matches!(self, Generation::Modern)
    }
}

/// 请求行语法允许的 HTTP 方法。大小写严格匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpRequestMethod {
    /// 获取资源，唯一可能返回 200 的方法
    Get,
    /// 获取资源的元数据，语法上接受但返回 405
    Head,
    /// 提交数据，语法上接受但返回 405
    Post,
}

impl HttpRequestMethod {
    /// 从请求行的方法令牌解析，大小写敏感
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "POST" => Some(HttpRequestMethod::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Generation::Legacy => write!(f, "HTTP/0.9"),
            Generation::Modern => write!(f, "HTTP/1.0"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}
