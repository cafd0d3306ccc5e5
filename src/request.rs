// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求解析模块
//!
//! 该模块把一次 `recv` 读到的原始字节解析为结构化的 `Request`。
//! 解析器是一个纯状态机，同时兼容两代协议：
//! 1. HTTP/1.0 完整请求：`METHOD SP target SP HTTP/x.y`，随后是若干头部行。
//! 2. HTTP/0.9 简单请求：`GET SP target`，没有版本号，也没有头部。
//!
//! 解析永远不会失败：畸形输入被编码为状态码（400/405/414/505）。
//! 只有状态码为 200 的请求才会暴露目标路径。

use std::borrow::Cow;

use crate::param::{Generation, HttpRequestMethod};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::bytes::Regex;

lazy_static! {
    /// 完整请求行：方法、目标、版本号。目标按原始字节匹配，不做任何解码
    static ref FULL_REQUEST: Regex =
        Regex::new(r"(?-u)^(GET|POST|HEAD)\s(\S+)\s(HTTP/\d\.\d)$").unwrap();
    /// 简单请求行（HTTP/0.9）：只有 GET 和目标
    static ref SIMPLE_REQUEST: Regex = Regex::new(r"(?-u)^GET\s(\S+)$").unwrap();
    /// 头部行：字段名不含控制字符与分隔符，值不含控制字符
    static ref HEADER: Regex =
        Regex::new(r#"(?-u)^[^()<>@,;:\\"/\[\]?={} \t\x00-\x1F\x7F]+:[^\x00-\x1F\x7F]*$"#).unwrap();
    static ref CRLF_TERMINATOR: Regex = Regex::new(r"\r\n").unwrap();
    static ref LF_TERMINATOR: Regex = Regex::new(r"\n").unwrap();
}

/// 解析后的请求。构造后不可变。
#[derive(Debug, Clone)]
pub struct Request {
    /// 状态码，任何其他字段只有在它确定之后才可信
    status: u16,
    /// 请求目标的原始字节，已去掉查询字符串；非 200 时为空
    path: Vec<u8>,
    /// 协议代际，决定响应是否带状态行和头部
    generation: Generation,
    /// 请求行中的方法，请求行无法识别时为 `None`
    method: Option<HttpRequestMethod>,
    /// 客户端标识，仅用于日志
    user_agent: Option<String>,
    /// 不符合语法的头部行数量，仅用于诊断，不影响状态码
    malformed_headers: usize,
}

impl Request {
    /// 从一次读取得到的原始字节解析请求。
    ///
    /// # 参数
    /// * `buffer` - 从套接字读取的原始数据（不包含未读取部分）。
    /// * `id` - 连接 ID，用于日志追踪。
    pub fn parse(buffer: &[u8], id: u128) -> Self {
        let mut request = Self {
            status: 400,
            path: Vec::new(),
            generation: Generation::Modern,
            method: None,
            user_agent: None,
            malformed_headers: 0,
        };

        // 1. 没有任何换行符：空请求为 400，否则视为请求行过长
        if !buffer.contains(&b'\n') {
            request.status = if buffer.is_empty() { 400 } else { 414 };
            debug!("[ID{}]请求中没有行终止符，状态码{}", id, request.status);
            return request;
        }

        // 2. 行终止符对整个缓冲区只判定一次
        let terminator: &Regex = if CRLF_TERMINATOR.is_match(buffer) {
            &*CRLF_TERMINATOR
        } else {
            &*LF_TERMINATOR
        };
        let mut lines = terminator.split(buffer);

        // 3. 请求行基本检查
        let first_line = lines.next().unwrap_or_default();
        if first_line.len() < 5 || !first_line.contains(&b' ') {
            debug!("[ID{}]请求行过短或不含空格：{:?}", id, String::from_utf8_lossy(first_line));
            return request;
        }

        // 4. 依次匹配两种语法
        let target = if let Some(caps) = FULL_REQUEST.captures(first_line) {
            let method = std::str::from_utf8(&caps[1])
                .ok()
                .and_then(HttpRequestMethod::from_token);
            request.method = method;
            match &caps[3] {
                b"HTTP/1.0" => {
                    if method != Some(HttpRequestMethod::Get) {
                        request.status = 405;
                        return request;
                    }
                }
                b"HTTP/0.9" => {
                    request.generation = Generation::Legacy;
                    if method != Some(HttpRequestMethod::Get) {
                        warn!("[ID{}]HTTP/0.9请求只能使用GET，返回400", id);
                        return request;
                    }
                }
                version => {
                    debug!("[ID{}]不支持的协议版本：{}", id, String::from_utf8_lossy(version));
                    request.status = 505;
                    return request;
                }
            }
            caps[2].to_vec()
        } else if let Some(caps) = SIMPLE_REQUEST.captures(first_line) {
            request.method = Some(HttpRequestMethod::Get);
            request.generation = Generation::Legacy;
            caps[1].to_vec()
        } else {
            debug!("[ID{}]请求行不符合任何语法：{:?}", id, String::from_utf8_lossy(first_line));
            return request;
        };

        // 5. 成功：去掉查询字符串
        request.status = 200;
        request.path = match target.iter().position(|&b| b == b'?') {
            Some(pos) => target[..pos].to_vec(),
            None => target,
        };

        // 6. 只有 HTTP/1.0 请求读取头部
        if request.generation == Generation::Legacy {
            debug!("[ID{}]HTTP/0.9请求，不读取头部", id);
            return request;
        }
        for line in lines.take_while(|l| !l.is_empty()) {
            if !HEADER.is_match(line) {
                warn!("[ID{}]请求中包含不合法的头部：{:?}", id, String::from_utf8_lossy(line));
                request.malformed_headers += 1;
                continue;
            }
            if let Some(colon) = line.iter().position(|&b| b == b':') {
                let (name, value) = (&line[..colon], &line[colon + 1..]);
                if name.eq_ignore_ascii_case(b"user-agent") {
                    request.user_agent = Some(String::from_utf8_lossy(value).trim().to_string());
                }
            }
        }

        request
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取状态码
    pub fn status(&self) -> u16 {
        self.status
    }

    /// 请求是否可以用于解析文件（状态码为 200）
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// 获取请求目标的原始字节。只有状态码为 200 时才返回路径。
    pub fn target(&self) -> Option<&[u8]> {
        if self.is_ok() {
            Some(&self.path)
        } else {
            None
        }
    }

    /// 用于日志的目标路径，非 UTF-8 字节显示为替换字符
    pub fn display_target(&self) -> Cow<'_, str> {
        match self.target() {
            Some(target) => String::from_utf8_lossy(target),
            None => Cow::Borrowed("-"),
        }
    }

    /// 获取协议代际
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// 响应是否需要状态行
    pub fn status_required(&self) -> bool {
        self.generation.status_required()
    }

    /// 获取请求方法
    pub fn method(&self) -> Option<HttpRequestMethod> {
        self.method
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("-")
    }

    /// 不合法头部的数量
    pub fn malformed_headers(&self) -> usize {
        self.malformed_headers
    }
}
