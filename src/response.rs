// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应模块
//!
//! 根据请求状态与协议代际构造并发送响应：
//! - 现代请求（HTTP/1.0）总是先收到状态行；200 响应随后是固定顺序的头部和文件正文，
//!   其余状态只附带一个 1 字节的 `text/html` 占位正文。
//! - 旧式请求（HTTP/0.9）没有状态行也没有头部：200 只发送文件字节，错误时什么也不发送。
//!
//! 正文通过零拷贝方式（Linux 上为 `sendfile`）从文件描述符直接写入套接字，最多尝试 3 次。

use std::{fs::File, io::Write, net::TcpStream};

use log::{debug, error, warn};

use crate::{
    exception::Exception,
    file::FileResource,
    param::*,
    request::Request,
    util::{format_file_size, http_date_now},
};

/// 一次待发送的响应
pub struct Response<'a> {
    status: u16,
    generation: Generation,
    file: Option<&'a FileResource>,
}

impl<'a> Response<'a> {
    /// 携带文件正文的 200 响应
    pub fn from_file(generation: Generation, file: &'a FileResource) -> Self {
        Self {
            status: 200,
            generation,
            file: Some(file),
        }
    }

    /// 不携带正文的错误响应
    pub fn from_status_code(status: u16, generation: Generation) -> Self {
        Self {
            status,
            generation,
            file: None,
        }
    }

    /// 由解析结果与文件解析结果决定响应。
    ///
    /// `resolved` 只在请求状态为 200 时才会有值。
    pub fn for_request(
        request: &Request,
        resolved: Option<&'a Result<FileResource, Exception>>,
    ) -> Self {
        let generation = request.generation();
        match resolved {
            Some(Ok(file)) if request.is_ok() => Self::from_file(generation, file),
            Some(Err(e)) if request.is_ok() => Self::from_status_code(e.status_code(), generation),
            _ => Self::from_status_code(request.status(), generation),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// 把响应写入套接字，返回传输的正文字节数。
    ///
    /// 发送失败只影响当前连接：错误被记录后返回，由调用方放弃该连接。
    pub fn send(&self, stream: &TcpStream, id: u128) -> Result<u64, Exception> {
        let file = match self.file {
            Some(file) if self.status == 200 => file,
            _ => return self.send_error(stream, self.status, id),
        };

        // 元数据在打开文件之后才第一次计算，失败时降级为 500
        let (size, head) = match file.size().and_then(|size| Ok((size, header_block(file)?))) {
            Ok(v) => v,
            Err(e) => {
                error!("[ID{}]无法读取文件元数据，响应降级：{}", id, e);
                return self.send_error(stream, e.status_code(), id);
            }
        };

        if self.generation.status_required() {
            let mut head_bytes = status_line(200);
            head_bytes.push_str(&head);
            write_all(stream, head_bytes.as_bytes(), id)?;
        }

        let sent = transfer_file(stream, file.file(), size, id);
        if sent < size {
            warn!(
                "[ID{}]文件{}只发送了{}/{}字节",
                id,
                file.location().display(),
                sent,
                size
            );
        } else {
            debug!(
                "[ID{}]文件{}发送完成，共{}",
                id,
                file.location().display(),
                format_file_size(sent)
            );
        }
        Ok(sent)
    }

    fn send_error(&self, stream: &TcpStream, status: u16, id: u128) -> Result<u64, Exception> {
        if !self.generation.status_required() {
            // 旧式客户端只会看到连接被关闭
            debug!("[ID{}]旧式请求的状态{}不发送任何内容", id, status);
            return Ok(0);
        }
        let mut message = status_line(status);
        // 除 Content-Type 外不带任何头部
        message.push_str(&format!("Content-Type: {}{}{}", ERROR_CONTENT_TYPE, CRLF, CRLF));
        let mut bytes = message.into_bytes();
        bytes.extend_from_slice(PLACEHOLDER_BODY);
        write_all(stream, &bytes, id)?;
        Ok(PLACEHOLDER_BODY.len() as u64)
    }
}

/// `HTTP/1.0 <code> <reason>\r\n`
pub fn status_line(code: u16) -> String {
    format!("{} {} {}{}", HTTP_VERSION, code, reason_phrase(code), CRLF)
}

/// 200 响应的头部块，以空行结尾
pub fn header_block(file: &FileResource) -> Result<String, Exception> {
    let now = http_date_now();
    let mut head = String::new();
    let mut push = |name: &str, value: &str| {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str(CRLF);
    };
    push("Date", &now);
    push("Location", &file.location().display().to_string());
    push("Server", SERVER_NAME);
    push("Allow", ALLOWED_METHODS);
    push("Content-Length", &file.size()?.to_string());
    push("Content-Type", file.mime_type()?);
    push("Expires", &now);
    push("Last-Modified", file.last_modified()?);
    head.push_str(CRLF);
    Ok(head)
}

fn write_all(mut stream: &TcpStream, bytes: &[u8], id: u128) -> Result<(), Exception> {
    stream.write_all(bytes).map_err(|e| {
        error!("[ID{}]发送响应失败：{}", id, e);
        Exception::SendFailed
    })
}

/// 把文件的前 `size` 字节发送到套接字，返回实际发送的字节数。
///
/// 最多尝试 [`MAX_TRANSFER_ATTEMPTS`] 次；出错或全部发送完成即停止。
pub fn transfer_file(stream: &TcpStream, file: &File, size: u64, id: u128) -> u64 {
    let mut offset = 0u64;
    for attempt in 1..=MAX_TRANSFER_ATTEMPTS {
        match send_chunk(stream, file, offset, size - offset) {
            Ok(n) => {
                offset += n;
                debug!("[ID{}]第{}次传输发送了{}字节", id, attempt, n);
                if offset >= size {
                    break;
                }
            }
            Err(e) => {
                error!("[ID{}]第{}次传输失败：{}", id, attempt, e);
                break;
            }
        }
    }
    offset
}

#[cfg(target_os = "linux")]
fn send_chunk(stream: &TcpStream, file: &File, offset: u64, count: u64) -> std::io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut off = offset as libc::off_t;
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    // SAFETY: 两个描述符在调用期间都由借用保持打开，off 指向有效的栈变量
    let sent = unsafe { libc::sendfile(stream.as_raw_fd(), file.as_raw_fd(), &mut off, count) };
    if sent < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(sent as u64)
}

#[cfg(not(target_os = "linux"))]
fn send_chunk(mut stream: &TcpStream, mut file: &File, offset: u64, count: u64) -> std::io::Result<u64> {
    use std::io::{self, Read, Seek, SeekFrom};

    file.seek(SeekFrom::Start(offset))?;
    io::copy(&mut file.take(count), &mut stream)
}
