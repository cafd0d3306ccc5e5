// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在连接处理生命周期中可能出现的各类异常情况。
//!
//! 请求解析阶段不会产生异常：畸形请求直接编码为状态码（400/414/505 等）。
//! 这里的变体覆盖的是文件解析、套接字 I/O、线程池以及启动阶段的失败。
//! 具体的 `io::Error` 在发生处即被记录到日志，向上只传递分类结果。

use std::fmt;

/// 服务器处理连接过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求的路径在文档根目录下不存在。对应 `404 Not Found`。
    FileNotFound,
    /// 文件存在但大小为 0。按约定与“未找到”同等处理。
    EmptyFile,
    /// 路径指向目录、设备等非普通文件。
    NotARegularFile,
    /// 文件存在但无法以只读方式打开。
    FileOpenFailed,
    /// 请求路径包含 `..` 等越出文档根目录的片段。
    PathEscapesRoot,
    /// 已打开的文件无法获取元数据（大小、修改时间）。对应 `500`。
    MetadataUnavailable,
    /// 从客户端套接字读取请求失败。
    RecvFailed,
    /// 向客户端套接字写入响应失败。
    SendFailed,
    /// `accept` 失败，连接句柄为空。
    AcceptFailed,
    /// 线程池已进入终止状态，拒绝新任务。
    PoolTerminated,
    /// 无法绑定或监听指定地址。启动阶段的致命错误。
    BindFailed,
    /// 配置文件存在但无法解析。
    ConfigInvalid,
    /// 守护进程化（fork/setsid/chdir）失败。
    DaemonizeFailed,
}

use Exception::*;

impl Exception {
    /// 该异常在 HTTP 语义下对应的状态码。
    ///
    /// 只有文件解析阶段的异常会映射到响应状态，其余异常发生时连接直接被放弃。
    pub fn status_code(&self) -> u16 {
        match self {
            FileNotFound | EmptyFile | NotARegularFile | FileOpenFailed | PathEscapesRoot => 404,
            _ => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileNotFound => write!(f, "File not found (404)"),
            EmptyFile => write!(f, "File is empty, treated as not found (404)"),
            NotARegularFile => write!(f, "Path is not a regular file (404)"),
            FileOpenFailed => write!(f, "File couldn't be opened read-only (404)"),
            PathEscapesRoot => write!(f, "Path escapes the document root (404)"),
            MetadataUnavailable => write!(f, "File metadata unavailable (500)"),
            RecvFailed => write!(f, "Failed to receive the request"),
            SendFailed => write!(f, "Failed to send the response"),
            AcceptFailed => write!(f, "Failed to accept a connection"),
            PoolTerminated => write!(f, "Thread pool is terminating"),
            BindFailed => write!(f, "Failed to bind or listen"),
            ConfigInvalid => write!(f, "Configuration file is invalid"),
            DaemonizeFailed => write!(f, "Failed to daemonize"),
        }
    }
}
