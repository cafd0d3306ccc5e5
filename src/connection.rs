// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接句柄模块
//!
//! `Connection` 是对已接受套接字的引用计数包装：克隆只增加计数，
//! 最后一个持有者释放时底层描述符被关闭，并且只关闭一次。
//! `accept` 失败时得到一个空句柄，调用方必须跳过它。

use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::{debug, error};

use crate::exception::Exception;

/// 连接的打开/关闭计数，由接收循环与所有连接共享
#[derive(Debug, Default)]
pub struct ConnectionStats {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已接受的连接总数
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }

    /// 已关闭的连接总数
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Acquire)
    }

    /// 当前仍然打开的连接数
    pub fn active(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }
}

struct Inner {
    id: u128,
    stream: TcpStream,
    peer: Option<SocketAddr>,
    stats: Arc<ConnectionStats>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // TcpStream 在这里随 Inner 一起析构，描述符只会被关闭这一次
        self.stats.closed.fetch_add(1, Ordering::AcqRel);
        debug!("[ID{}]连接已关闭", self.id);
    }
}

/// 在线程间传递的连接句柄
#[derive(Clone, Default)]
pub struct Connection {
    inner: Option<Arc<Inner>>,
}

impl Connection {
    /// 从监听套接字接受一个连接。失败时记录日志并返回空句柄。
    pub fn accept(listener: &TcpListener, id: u128, stats: &Arc<ConnectionStats>) -> Self {
        match listener.accept() {
            Ok((stream, peer)) => Self::from_stream(stream, Some(peer), id, stats),
            Err(e) => {
                error!("[ID{}]{}，连接句柄为空：{}", id, Exception::AcceptFailed, e);
                Self::none()
            }
        }
    }

    /// 包装一个已经建立的流
    pub fn from_stream(
        stream: TcpStream,
        peer: Option<SocketAddr>,
        id: u128,
        stats: &Arc<ConnectionStats>,
    ) -> Self {
        stats.opened.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Some(Arc::new(Inner {
                id,
                stream,
                peer,
                stats: Arc::clone(stats),
            })),
        }
    }

    /// 表示“没有连接”的空句柄
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 句柄是否持有一个真实的连接
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// 底层流。空句柄返回 `None`。
    pub fn stream(&self) -> Option<&TcpStream> {
        self.inner.as_ref().map(|i| &i.stream)
    }

    pub fn id(&self) -> Option<u128> {
        self.inner.as_ref().map(|i| i.id)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.as_ref().and_then(|i| i.peer)
    }

    /// 当前共享该连接的持有者数量，空句柄为 0
    pub fn holders(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }
}
