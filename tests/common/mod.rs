// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试共用的服务器夹具：在临时目录上启动真实服务器，监听随机端口。

#![allow(dead_code)]

use std::{
    fs,
    io::{Read, Write},
    net::{Shutdown, TcpStream},
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use stealing_webserver::{config::MimeClassifierKind, Config, Server, ServerHandle};
use tempfile::TempDir;

pub const INDEX_HTML: &[u8] = b"<html><body><h1>Hello</h1></body></html>\n";

pub struct TestServer {
    pub handle: ServerHandle,
    runner: Option<JoinHandle<()>>,
    /// 外层目录，文档根目录是其中的 `www`，外层还放着一个根目录之外的文件
    pub outer: TempDir,
}

impl TestServer {
    pub fn start(workers: usize) -> Self {
        Self::start_with(workers, |_| {})
    }

    pub fn start_with(workers: usize, customize: impl FnOnce(&mut Config)) -> Self {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("www");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("index.html"), INDEX_HTML).unwrap();
        fs::write(root.join("sub").join("page.txt"), b"nested page").unwrap();
        fs::write(root.join("empty.txt"), b"").unwrap();
        fs::write(root.join("data.bin"), binary_payload()).unwrap();
        fs::write(outer.path().join("secret.txt"), b"top secret").unwrap();

        let mut config = Config::new();
        config
            .set_www_root(root.to_str().unwrap())
            .set_address("127.0.0.1")
            .set_port(0)
            .set_worker_threads(workers)
            .set_mime_classifier(MimeClassifierKind::Extension);
        customize(&mut config);

        let server = Server::bind(&config, Arc::new(AtomicBool::new(false))).unwrap();
        let handle = server.handle();
        let runner = thread::spawn(move || server.run());

        Self {
            handle,
            runner: Some(runner),
            outer,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.outer.path().join("www")
    }

    /// 发送原始请求并读取直到服务端关闭连接
    pub fn request(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.handle.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.write_all(raw).unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        reply
    }

    /// 发送请求后关闭写端，适用于不带换行符的请求
    pub fn request_half_closed(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.handle.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.write_all(raw).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        reply
    }

    /// 停机并等待接收线程与线程池退出
    pub fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(runner) = self.runner.take() {
            runner.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.runner.is_some() {
            self.stop();
        }
    }
}

pub fn binary_payload() -> Vec<u8> {
    (0..100_000u32).map(|i| (i * 7 % 256) as u8).collect()
}

/// 拆分为 (状态行, 头部列表, 正文)
pub fn parse_response(reply: &[u8]) -> (String, Vec<(String, String)>, Vec<u8>) {
    let end = reply
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("响应中没有头部结束标记");
    let head = String::from_utf8_lossy(&reply[..end]).to_string();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (status_line, headers, reply[end + 4..].to_vec())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
