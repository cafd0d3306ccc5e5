// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 文件资源模块
//!
//! `FileResource` 独占一个只读打开的文件描述符，并惰性地计算、缓存三项元数据：
//! 字节大小、MIME 类型和最后修改时间。元数据在每个实例上至多计算一次，
//! 描述符随实例析构关闭且只关闭一次。
//!
//! 注意这里只缓存元数据，从不缓存文件内容。

use std::{
    cell::OnceCell,
    fs::{self, File},
    path::{Component, Path, PathBuf},
    process::Command,
    sync::Arc,
};

use log::{debug, error, warn};

use crate::{
    exception::Exception,
    param::{DEFAULT_MIME, MIME_TYPES},
    util::format_system_time,
};

/// 可插拔的文件类型分类能力。
///
/// 分类是尽力而为的：返回 `None` 时调用方使用 [`DEFAULT_MIME`]。
#[cfg_attr(test, mockall::automock)]
pub trait MimeClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> Option<String>;
}

/// 调用外部 `file --brief --mime <path>` 子进程进行分类，读取其标准输出的第一行。
pub struct FileCommandClassifier {
    command: String,
}

impl FileCommandClassifier {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl MimeClassifier for FileCommandClassifier {
    fn classify(&self, path: &Path) -> Option<String> {
        let output = match Command::new(&self.command)
            .arg("--brief")
            .arg("--mime")
            .arg(path)
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                error!("无法启动文件类型分类子进程{}：{}", &self.command, e);
                return None;
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().unwrap_or("").trim_end();
        if line.is_empty() {
            warn!("文件类型分类子进程没有输出，路径：{}", path.display());
            return None;
        }
        Some(line.to_string())
    }
}

/// 基于扩展名查表的内置分类器，不产生子进程
pub struct ExtensionClassifier;

impl MimeClassifier for ExtensionClassifier {
    fn classify(&self, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        MIME_TYPES.get(extension.as_str()).map(|m| m.to_string())
    }
}

/// 一次性计算出的文件属性
#[derive(Debug, Clone)]
struct FileProperties {
    size: u64,
    mime_type: String,
    last_modified: String,
}

/// 一次请求对应的文件资源
pub struct FileResource {
    location: PathBuf,
    file: File,
    classifier: Arc<dyn MimeClassifier>,
    properties: OnceCell<Result<FileProperties, Exception>>,
    #[cfg(test)]
    loads: std::cell::Cell<usize>,
}

impl FileResource {
    fn new(location: PathBuf, file: File, classifier: Arc<dyn MimeClassifier>) -> Self {
        Self {
            location,
            file,
            classifier,
            properties: OnceCell::new(),
            #[cfg(test)]
            loads: std::cell::Cell::new(0),
        }
    }

    fn properties(&self) -> Result<&FileProperties, Exception> {
        self.properties
            .get_or_init(|| self.load_properties())
            .as_ref()
            .map_err(|e| *e)
    }

    fn load_properties(&self) -> Result<FileProperties, Exception> {
        #[cfg(test)]
        self.loads.set(self.loads.get() + 1);

        let metadata = self.file.metadata().map_err(|e| {
            error!("无法获取文件{}的元数据：{}", self.location.display(), e);
            Exception::MetadataUnavailable
        })?;
        let modified = metadata.modified().map_err(|e| {
            error!("无法获取文件{}的修改时间：{}", self.location.display(), e);
            Exception::MetadataUnavailable
        })?;
        let mime_type = self
            .classifier
            .classify(&self.location)
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        Ok(FileProperties {
            size: metadata.len(),
            mime_type,
            last_modified: format_system_time(modified),
        })
    }

    /// 文件字节数
    pub fn size(&self) -> Result<u64, Exception> {
        self.properties().map(|p| p.size)
    }

    /// MIME 类型，分类失败时为默认值
    pub fn mime_type(&self) -> Result<&str, Exception> {
        self.properties().map(|p| p.mime_type.as_str())
    }

    /// 最后修改时间，RFC 1123 风格
    pub fn last_modified(&self) -> Result<&str, Exception> {
        self.properties().map(|p| p.last_modified.as_str())
    }

    /// 规范化后的文件路径，用于 `Location` 头
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// 底层只读文件
    pub fn file(&self) -> &File {
        &self.file
    }
}

/// 把请求目标映射为文件资源
pub struct Resolver {
    root: PathBuf,
    classifier: Arc<dyn MimeClassifier>,
    allow_traversal: bool,
}

impl Resolver {
    pub fn new(root: PathBuf, classifier: Arc<dyn MimeClassifier>, allow_traversal: bool) -> Self {
        Self {
            root,
            classifier,
            allow_traversal,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析请求路径。
    ///
    /// 目标是请求中的原始字节，去掉前导 `/` 后拼接到文档根目录；路径不存在、
    /// 不是普通文件、大小为 0 或无法打开时都视为“未找到”。
    pub fn resolve(&self, target: &[u8], id: u128) -> Result<FileResource, Exception> {
        let start = target.iter().position(|&b| b != b'/').unwrap_or(target.len());
        let relative = target_path(&target[start..]);
        if !self.allow_traversal && relative.components().any(|c| c == Component::ParentDir) {
            warn!(
                "[ID{}]请求路径{}试图越出文档根目录",
                id,
                String::from_utf8_lossy(target)
            );
            return Err(Exception::PathEscapesRoot);
        }
        let location = self.root.join(relative);
        debug!("[ID{}]映射物理路径：{}", id, location.display());

        let metadata = match fs::metadata(&location) {
            Ok(m) => m,
            Err(e) => {
                debug!("[ID{}]无法获取{}的元数据：{}", id, location.display(), e);
                return Err(Exception::FileNotFound);
            }
        };
        if !metadata.is_file() {
            return Err(Exception::NotARegularFile);
        }
        if metadata.len() == 0 {
            return Err(Exception::EmptyFile);
        }

        let file = match File::open(&location) {
            Ok(f) => f,
            Err(e) => {
                warn!("[ID{}]无法打开文件{}：{}", id, location.display(), e);
                return Err(Exception::FileOpenFailed);
            }
        };

        let location = match location.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("[ID{}]无法规范化路径{}：{}", id, location.display(), e);
                location
            }
        };
        Ok(FileResource::new(location, file, Arc::clone(&self.classifier)))
    }
}

/// 原始字节直接作为文件名，不做任何解码
#[cfg(unix)]
fn target_path(bytes: &[u8]) -> PathBuf {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn target_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
