// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 工作窃取静态文件服务器
//!
//! 程序入口：解析命令行、加载配置、初始化日志，完成进程级准备后启动接收循环。
//! - 支持 HTTP/1.0 与旧式 HTTP/0.9 请求，只提供 GET
//! - 连接由固定大小的工作窃取线程池处理
//! - 文件正文以零拷贝方式发送
//! - SIGINT/SIGTERM 触发优雅停机

use std::{
    path::PathBuf,
    process,
    sync::{atomic::AtomicBool, Arc},
};

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};

use stealing_webserver::{config::MimeClassifierKind, process as bootstrap, Config, Server};

const LOG_CONFIG_PATH: &str = "config/log4rs.yaml";

#[derive(Parser, Debug)]
#[command(name = "stealing-webserver")]
#[command(about = "HTTP/1.0 与 HTTP/0.9 静态文件服务器")]
#[command(version)]
struct Cli {
    /// 监听地址，例如 127.0.0.1
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 文档根目录
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// TOML 配置文件
    #[arg(short, long)]
    config: Option<String>,

    /// log4rs 的 YAML 配置文件
    #[arg(long, default_value = LOG_CONFIG_PATH)]
    log_config: String,

    /// 工作线程数，0 表示硬件线程数减一
    #[arg(short, long)]
    workers: Option<usize>,

    /// 使用扩展名表而不是 `file` 命令判断 MIME 类型
    #[arg(long)]
    extension_mime: bool,

    /// 以守护进程方式运行
    #[arg(long)]
    daemon: bool,
}

fn init_logging(path: &str) {
    // 日志系统：优先采用外部 YAML 配置，缺失时退回到输出到标准错误的控制台日志
    if let Err(e) = log4rs::init_file(path, Default::default()) {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} [{T}] {m}{n}",
            )))
            .build();
        let fallback = log4rs::config::Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .build(Root::builder().appender("stderr").build(LevelFilter::Info));
        match fallback.map(log4rs::init_config) {
            Ok(Ok(_)) => warn!("无法从{}加载日志配置，使用默认控制台日志：{}", path, e),
            _ => eprintln!("日志系统初始化失败：{}", e),
        }
    }
}

fn build_config(cli: &Cli) -> Config {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("配置加载失败：{}", e);
            process::exit(1);
        }
    };
    if let Some(host) = &cli.host {
        config.set_address(host);
    }
    if let Some(port) = cli.port {
        config.set_port(port);
    }
    if let Some(workers) = cli.workers {
        config.set_worker_threads(workers);
    }
    if cli.extension_mime {
        config.set_mime_classifier(MimeClassifierKind::Extension);
    }

    let root = cli
        .directory
        .clone()
        .unwrap_or_else(|| config.root_path());
    // 守护进程会切换到 `/`，提前把根目录规范化为绝对路径
    match root.canonicalize() {
        Ok(root) => {
            config.set_www_root(&root.to_string_lossy());
        }
        Err(e) => {
            error!("文档根目录{}不可用：{}", root.display(), e);
            process::exit(1);
        }
    }
    config
}

fn main() {
    let cli = Cli::parse();

    // 1. 初始化日志系统
    init_logging(&cli.log_config);

    // 2. 加载配置，命令行参数覆盖配置文件
    let config = build_config(&cli);
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    // 3. 可选的守护进程化，必须在创建任何线程之前完成
    if cli.daemon {
        if let Err(e) = bootstrap::daemonize() {
            error!("守护进程化失败：{}", e);
            process::exit(1);
        }
        info!("已进入守护进程模式");
    }

    // 4. 提升文件描述符上限
    if config.raise_fd_limit() {
        if let Err(e) = bootstrap::raise_fd_limit() {
            warn!("无法读取文件描述符上限：{}", e);
        }
    }

    // 5. 绑定监听地址并创建线程池，失败时无法提供任何服务
    let terminate = Arc::new(AtomicBool::new(false));
    let server = match Server::bind(&config, Arc::clone(&terminate)) {
        Ok(server) => server,
        Err(e) => {
            error!("服务器启动失败：{}", e);
            process::exit(1);
        }
    };

    // 6. 信号处理：SIGINT/SIGTERM 设置终止标志并唤醒接收线程
    if let Err(e) = bootstrap::install_signal_handlers(terminate, server.local_addr()) {
        warn!("无法注册信号处理，只能强制终止进程：{}", e);
    }

    // 7. 接收循环，返回时线程池已经回收所有工作线程
    server.run();
    info!("服务器已停止");
}
