// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, info, warn};
use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

use crate::exception::Exception;

/// 默认配置文件位置
pub const DEFAULT_CONFIG_PATH: &str = "config/development.toml";

/// 文件类型分类方式
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MimeClassifierKind {
    /// 调用外部 `file` 命令
    #[default]
    File,
    /// 按扩展名查表
    Extension,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    www_root: String,
    address: String,
    port: u16,
    worker_threads: usize,
    recv_buffer_size: usize,
    /// 单次读取请求的超时时间（毫秒），0 表示不设超时
    read_timeout_ms: u64,
    mime_classifier: MimeClassifierKind,
    file_command: String,
    allow_traversal: bool,
    raise_fd_limit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: ".".to_string(),
            address: "127.0.0.1".to_string(),
            port: 7878,
            worker_threads: 0,
            recv_buffer_size: 8192,
            read_timeout_ms: 30_000,
            mime_classifier: MimeClassifierKind::File,
            file_command: "file".to_string(),
            allow_traversal: false,
            raise_fd_limit: true,
        }
    }

    /// 从 TOML 字符串构建配置，未给出的字段使用默认值
    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let mut config: Config = toml::from_str(content).map_err(|e| {
            error!("无法成功从配置文件构建配置对象：{}", e);
            Exception::ConfigInvalid
        })?;
        config.normalize();
        Ok(config)
    }

    /// 读取并解析配置文件
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename).map_err(|e| {
            error!("无法打开配置文件{}：{}", filename, e);
            Exception::ConfigInvalid
        })?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val).map_err(|e| {
            error!("读取配置文件{}失败：{}", filename, e);
            Exception::ConfigInvalid
        })?;
        Self::from_toml_str(&str_val)
    }

    /// 加载配置。
    ///
    /// 显式指定的配置文件必须存在且合法；未指定时尝试默认位置，不存在则使用默认配置。
    pub fn load(explicit: Option<&str>) -> Result<Self, Exception> {
        match explicit {
            Some(path) => Self::from_toml(path),
            None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_toml(DEFAULT_CONFIG_PATH)
            }
            None => {
                info!("未找到配置文件{}，使用默认配置", DEFAULT_CONFIG_PATH);
                let mut config = Self::new();
                config.normalize();
                Ok(config)
            }
        }
    }

    fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = default_worker_threads();
        }
        if self.recv_buffer_size == 0 {
            warn!("recv_buffer_size被设置为0，无法接收任何请求，因此该值将被改为8192。");
            self.recv_buffer_size = 8192;
        }
    }
}

/// 硬件线程数减一，留给接收线程，至少为 1
pub fn default_worker_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    /// 读取请求的超时，未设置时返回 `None`
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn mime_classifier(&self) -> MimeClassifierKind {
        self.mime_classifier
    }

    pub fn file_command(&self) -> &str {
        &self.file_command
    }

    pub fn allow_traversal(&self) -> bool {
        self.allow_traversal
    }

    pub fn raise_fd_limit(&self) -> bool {
        self.raise_fd_limit
    }

    /// `address:port` 形式的监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.www_root)
    }
}

impl Config {
    pub fn set_www_root(&mut self, www_root: &str) -> &mut Self {
        self.www_root = www_root.to_string();
        self
    }

    pub fn set_address(&mut self, address: &str) -> &mut Self {
        self.address = address.to_string();
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_worker_threads(&mut self, worker_threads: usize) -> &mut Self {
        self.worker_threads = if worker_threads == 0 {
            default_worker_threads()
        } else {
            worker_threads
        };
        self
    }

    pub fn set_recv_buffer_size(&mut self, size: usize) -> &mut Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    pub fn set_read_timeout_ms(&mut self, ms: u64) -> &mut Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn set_mime_classifier(&mut self, kind: MimeClassifierKind) -> &mut Self {
        self.mime_classifier = kind;
        self
    }

    pub fn set_allow_traversal(&mut self, allow: bool) -> &mut Self {
        self.allow_traversal = allow;
        self
    }

    pub fn set_raise_fd_limit(&mut self, raise: bool) -> &mut Self {
        self.raise_fd_limit = raise;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.www_root(), ".");
        assert_eq!(config.bind_address(), "127.0.0.1:7878");
        assert_eq!(config.recv_buffer_size(), 8192);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.mime_classifier(), MimeClassifierKind::File);
        assert!(!config.allow_traversal());
        assert!(config.raise_fd_limit());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str("port = 9000\nmime_classifier = \"extension\"\n").unwrap();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.address(), "127.0.0.1");
        assert_eq!(config.mime_classifier(), MimeClassifierKind::Extension);
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn test_zero_read_timeout_disables_it() {
        let config = Config::from_toml_str("read_timeout_ms = 0").unwrap();
        assert_eq!(config.read_timeout(), None);
        let config = Config::from_toml_str("read_timeout_ms = 250").unwrap();
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert_eq!(
            Config::from_toml_str("port = \"not a number\"").err(),
            Some(Exception::ConfigInvalid)
        );
        assert_eq!(
            Config::from_toml_str("mime_classifier = \"magic\"").err(),
            Some(Exception::ConfigInvalid)
        );
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "www_root = \"/srv/www\"\nworker_threads = 3\nallow_traversal = true").unwrap();
        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.www_root(), "/srv/www");
        assert_eq!(config.worker_threads(), 3);
        assert!(config.allow_traversal());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert_eq!(
            Config::load(Some("/nonexistent/config.toml")).err(),
            Some(Exception::ConfigInvalid)
        );
    }

    #[test]
    fn test_zero_workers_means_hardware_default() {
        let config = Config::from_toml_str("worker_threads = 0").unwrap();
        assert_eq!(config.worker_threads(), default_worker_threads());
        let mut config = Config::new();
        config.set_worker_threads(0);
        assert!(config.worker_threads() >= 1);
    }
}
