// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// 按 RFC 1123 风格格式化时间：`Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 格式化文件系统时间戳
pub fn format_system_time(time: SystemTime) -> String {
    format_http_date(&DateTime::<Utc>::from(time))
}

/// 当前时间的 HTTP 日期字符串，用于 `Date` 与 `Expires` 头
pub fn http_date_now() -> String {
    format_http_date(&Utc::now())
}

/// 把字节数格式化为便于阅读的大小，仅用于日志
pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
