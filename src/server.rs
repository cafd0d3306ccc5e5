// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器模块
//!
//! 接收线程只负责 `accept` 和提交任务，从不自己处理连接。
//! 每个连接对应线程池中的一个任务，严格按“读取 → 解析 → 解析文件 → 响应 → 释放”顺序执行。

use std::{
    io::Read,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{
    config::{Config, MimeClassifierKind},
    connection::{Connection, ConnectionStats},
    exception::Exception,
    file::{ExtensionClassifier, FileCommandClassifier, MimeClassifier, Resolver},
    process,
    request::Request,
    response::Response,
    scheduler::ThreadPool,
};

/// 所有连接任务共享的只读上下文，启动时构建一次
pub struct ServerContext {
    resolver: Resolver,
    recv_buffer_size: usize,
    read_timeout: Option<Duration>,
}

impl ServerContext {
    pub fn new(config: &Config) -> Self {
        let classifier: Arc<dyn MimeClassifier> = match config.mime_classifier() {
            MimeClassifierKind::File => Arc::new(FileCommandClassifier::new(config.file_command())),
            MimeClassifierKind::Extension => Arc::new(ExtensionClassifier),
        };
        Self {
            resolver: Resolver::new(config.root_path(), classifier, config.allow_traversal()),
            recv_buffer_size: config.recv_buffer_size(),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

/// 可以在其他线程中用来停机和观察连接计数的句柄
#[derive(Clone)]
pub struct ServerHandle {
    terminate: Arc<AtomicBool>,
    local_addr: SocketAddr,
    stats: Arc<ConnectionStats>,
}

impl ServerHandle {
    /// 请求停机：设置终止标志并唤醒接收线程
    pub fn shutdown(&self) {
        process::request_shutdown(&self.terminate, self.local_addr);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    pool: ThreadPool,
    context: Arc<ServerContext>,
    terminate: Arc<AtomicBool>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// 按配置绑定监听地址。绑定失败是致命错误。
    pub fn bind(config: &Config, terminate: Arc<AtomicBool>) -> Result<Self, Exception> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address).map_err(|e| {
            error!("无法绑定地址：{}，错误：{}", address, e);
            Exception::BindFailed
        })?;
        info!("地址{}绑定完成", address);
        Self::from_listener(listener, config, terminate)
    }

    /// 在已经监听的套接字上构建服务器
    pub fn from_listener(
        listener: TcpListener,
        config: &Config,
        terminate: Arc<AtomicBool>,
    ) -> Result<Self, Exception> {
        let local_addr = listener.local_addr().map_err(|e| {
            error!("无法获取监听地址：{}", e);
            Exception::BindFailed
        })?;
        let pool = ThreadPool::with_terminate_flag(config.worker_threads(), Arc::clone(&terminate))
            .map_err(|_| Exception::PoolTerminated)?;
        info!("www root: {}", config.www_root());

        Ok(Self {
            listener,
            local_addr,
            pool,
            context: Arc::new(ServerContext::new(config)),
            terminate,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            terminate: Arc::clone(&self.terminate),
            local_addr: self.local_addr,
            stats: Arc::clone(&self.stats),
        }
    }

    /// 接收循环。观察到终止标志后返回，线程池随之析构并等待工作线程退出。
    pub fn run(self) {
        info!("服务端开始在{}上接受连接", self.local_addr);
        let mut id: u128 = 0;
        loop {
            let connection = Connection::accept(&self.listener, id, &self.stats);
            if self.terminate.load(Ordering::Acquire) {
                info!("接收线程观察到终止标志，正在退出...");
                break;
            }
            if !connection.is_open() {
                continue;
            }
            debug!("[ID{}]TCP连接已建立：{:?}", id, connection.peer());

            let context = Arc::clone(&self.context);
            if let Err(e) = self
                .pool
                .submit(move || handle_connection(connection, &context))
            {
                warn!("[ID{}]无法提交连接任务：{}", id, e);
                break;
            }
            id += 1;
        }
        info!(
            "共接受{}个连接，仍有{}个连接未关闭",
            self.stats.opened(),
            self.stats.active()
        );
    }
}

/// 处理单个连接。任务结束时句柄被释放，最后一个持有者关闭套接字。
pub fn handle_connection(connection: Connection, context: &ServerContext) {
    let (stream, id) = match (connection.stream(), connection.id()) {
        (Some(stream), Some(id)) => (stream, id),
        _ => return,
    };

    // 不发送数据的客户端最多占用工作线程一个超时周期
    if let Err(e) = stream.set_read_timeout(context.read_timeout) {
        warn!("[ID{}]无法设置读取超时：{}", id, e);
    }
    let buffer = match receive(stream, context.recv_buffer_size, id) {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!("[ID{}]放弃该连接：{}", id, e);
            return;
        }
    };

    let start_time = Instant::now();
    let request = Request::parse(&buffer, id);
    let resolved = request.target().map(|target| context.resolver.resolve(target, id));
    let response = Response::for_request(&request, resolved.as_ref());

    info!(
        "[ID{}] {}, {}, {}, {}, {}",
        id,
        request.generation(),
        request.display_target(),
        request
            .method()
            .map_or_else(|| "-".to_string(), |m| m.to_string()),
        response.status(),
        request.user_agent(),
    );

    match response.send(stream, id) {
        Ok(sent) => debug!(
            "[ID{}]响应发送完毕，正文{}字节，用时{}ms",
            id,
            sent,
            start_time.elapsed().as_millis()
        ),
        Err(e) => warn!("[ID{}]放弃该连接：{}", id, e),
    }
}

/// 单次读取请求，最多 `capacity` 字节
fn receive(mut stream: &TcpStream, capacity: usize, id: u128) -> Result<Vec<u8>, Exception> {
    let mut buffer = vec![0u8; capacity];
    let received = stream.read(&mut buffer).map_err(|e| {
        error!("[ID{}]读取TCPStream时遇到错误：{}", id, e);
        Exception::RecvFailed
    })?;
    buffer.truncate(received);
    debug!("[ID{}]收到{}字节的请求", id, received);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;

    fn config_for(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::new();
        config
            .set_www_root(dir.path().to_str().unwrap())
            .set_worker_threads(2)
            .set_mime_classifier(MimeClassifierKind::Extension);
        config
    }

    #[test]
    fn test_handle_connection_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let context = ServerContext::new(&config_for(&dir));
        let stats = Arc::new(ConnectionStats::new());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.write_all(b"GET /a.txt HTTP/1.0\r\n\r\n").unwrap();
        let connection = Connection::accept(&listener, 0, &stats);

        handle_connection(connection, &context);
        assert_eq!(stats.closed(), 1);

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert!(reply.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(reply.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(reply.ends_with("\r\n\r\nabc"));
    }

    #[test]
    fn test_handle_connection_ignores_empty_handle() {
        let dir = tempfile::tempdir().unwrap();
        let context = ServerContext::new(&config_for(&dir));
        handle_connection(Connection::none(), &context);
    }

    #[test]
    fn test_run_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&dir);
        config.set_address("127.0.0.1").set_port(0);
        let server = Server::bind(&config, Arc::new(AtomicBool::new(false))).unwrap();
        let handle = server.handle();
        let runner = thread::spawn(move || server.run());

        let mut client = TcpStream::connect(handle.local_addr()).unwrap();
        client.write_all(b"GET /missing HTTP/1.0\r\n\r\n").unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert!(reply.starts_with("HTTP/1.0 404 Not Found\r\n"));

        handle.shutdown();
        runner.join().unwrap();
        assert_eq!(handle.stats().active(), 0);
    }

    #[test]
    fn test_silent_client_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&dir);
        config.set_read_timeout_ms(100);
        let context = ServerContext::new(&config);
        let stats = Arc::new(ConnectionStats::new());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let connection = Connection::accept(&listener, 0, &stats);

        let start = Instant::now();
        handle_connection(connection, &context);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.closed(), 1);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = Config::new();
        config
            .set_address("127.0.0.1")
            .set_port(occupied.local_addr().unwrap().port())
            .set_worker_threads(1);
        let result = Server::bind(&config, Arc::new(AtomicBool::new(false)));
        assert_eq!(result.err(), Some(Exception::BindFailed));
    }
}
