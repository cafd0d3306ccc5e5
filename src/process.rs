// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 进程引导模块
//!
//! 服务器开始接受连接之前需要完成的进程级准备工作：
//! 提升文件描述符上限、可选的守护进程化，以及 SIGINT/SIGTERM 信号处理。

use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{error, info, warn};

use crate::exception::Exception;

/// 把 `RLIMIT_NOFILE` 的软限制提升到硬限制，返回提升后的软限制
#[cfg(unix)]
pub fn raise_fd_limit() -> io::Result<libc::rlim_t> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: limit 是有效的可写结构体
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    if limit.rlim_cur < limit.rlim_max {
        let raised = libc::rlimit {
            rlim_cur: limit.rlim_max,
            rlim_max: limit.rlim_max,
        };
        // SAFETY: raised 是有效的结构体，软限制不超过硬限制
        if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &raised) } != 0 {
            let e = io::Error::last_os_error();
            warn!("无法提升文件描述符上限，保持{}：{}", limit.rlim_cur, e);
            return Ok(limit.rlim_cur);
        }
        limit = raised;
    }
    info!("进程最多可同时处理{}个文件描述符", limit.rlim_cur);
    Ok(limit.rlim_cur)
}

#[cfg(not(unix))]
pub fn raise_fd_limit() -> io::Result<u64> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "RLIMIT_NOFILE"))
}

/// 脱离终端成为守护进程。
///
/// 父进程在 fork 后直接退出；子进程清空 umask、创建新会话、切换到 `/`，
/// 并把标准输入输出重定向到 `/dev/null`。必须在创建任何线程之前调用。
#[cfg(unix)]
pub fn daemonize() -> Result<(), Exception> {
    // SAFETY: 调用时进程仍是单线程的
    match unsafe { libc::fork() } {
        -1 => {
            error!("fork失败：{}", io::Error::last_os_error());
            return Err(Exception::DaemonizeFailed);
        }
        0 => {}
        _ => std::process::exit(0),
    }

    // SAFETY: 以下均为不涉及内存安全的系统调用
    unsafe {
        libc::umask(0);
        if libc::setsid() == -1 {
            error!("setsid失败：{}", io::Error::last_os_error());
            return Err(Exception::DaemonizeFailed);
        }
    }
    std::env::set_current_dir("/").map_err(|e| {
        error!("无法切换到根目录：{}", e);
        Exception::DaemonizeFailed
    })?;
    redirect_stdio()
}

#[cfg(unix)]
fn redirect_stdio() -> Result<(), Exception> {
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;

    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| {
            error!("无法打开/dev/null：{}", e);
            Exception::DaemonizeFailed
        })?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: 两个描述符都有效，dup2 只替换目标描述符
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } == -1 {
            error!("无法重定向描述符{}：{}", fd, io::Error::last_os_error());
            return Err(Exception::DaemonizeFailed);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize() -> Result<(), Exception> {
    error!("当前平台不支持守护进程模式");
    Err(Exception::DaemonizeFailed)
}

/// 把监听地址转换为可以从本机连上的地址，未指定地址改为回环地址
pub fn wake_address(listening: SocketAddr) -> SocketAddr {
    let ip = match listening.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, listening.port())
}

/// 设置终止标志，并向监听地址发起一次连接，使阻塞在 `accept` 上的接收线程醒来
pub fn request_shutdown(terminate: &AtomicBool, listening: SocketAddr) {
    terminate.store(true, Ordering::Release);
    if let Err(e) = TcpStream::connect(wake_address(listening)) {
        warn!("唤醒接收线程失败：{}", e);
    }
}

/// 在后台线程中等待 SIGINT/SIGTERM，收到后请求停机
#[cfg(unix)]
pub fn install_signal_handlers(
    terminate: Arc<AtomicBool>,
    listening: SocketAddr,
) -> io::Result<JoinHandle<()>> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!("收到信号{}，开始停机", signal);
                request_shutdown(&terminate, listening);
            }
        })
}

#[cfg(not(unix))]
pub fn install_signal_handlers(
    _terminate: Arc<AtomicBool>,
    _listening: SocketAddr,
) -> io::Result<JoinHandle<()>> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "signals"))
}
