//! エラーログとセキュリティ関連の機能

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use log::warn;

use crate::common::RequestContext;
use crate::error::Diagnostic;

const RULE: &str = "================================================================================";
const THIN_RULE: &str = "--------------------------------------------------------------------------------";

/// エラー内容をログファイルに追記する
pub fn log_error_to_file(path: &Path, message: &str) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC");
    let local_time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f %Z");

    let mut block = String::new();
    block.push_str(RULE);
    block.push_str("\nPGBRIDGE CGI ERROR\n");
    block.push_str(&format!("Timestamp (UTC): {}\n", timestamp));
    block.push_str(&format!("Timestamp (Local): {}\n", local_time));
    block.push_str(&format!("Process ID: {}\n", std::process::id()));
    block.push_str(THIN_RULE);
    block.push('\n');
    block.push_str(message);
    block.push('\n');
    block.push_str(RULE);
    block.push_str("\n\n");

    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(block.as_bytes()));
    if let Err(e) = written {
        warn!("Failed to write error log {}: {}", path.display(), e);
    }
}

/// 診断情報とリクエストの要約（センシティブ値はマスク）からログ本文を作る
pub fn format_failure(diagnostic: &Diagnostic, ctx: Option<&RequestContext>) -> String {
    let mut lines = vec![
        format!("code: {}", diagnostic.code),
        format!("message: {}", diagnostic.message),
    ];
    if let Some(detail) = &diagnostic.detail {
        lines.push(format!("detail: {}", detail));
    }
    let context = match diagnostic.context.split_once('?') {
        Some((head, query)) => format!("{}?{}", head, redact_query_string(query)),
        None => diagnostic.context.clone(),
    };
    lines.push(format!("context: {}", context));
    if let Some(ctx) = ctx {
        lines.push(gather_request_context(ctx));
    }
    lines.join("\n")
}

/// 失敗時に記録するリクエストの詳細を構築
pub fn gather_request_context(ctx: &RequestContext) -> String {
    let mut lines = Vec::new();
    lines.push("Request context:".to_string());
    lines.push(format!("  REQUEST_METHOD={}", ctx.method));
    lines.push(format!("  PATH={}", ctx.path));
    lines.push(format!("  QUERY_STRING={}", redact_query_string(&ctx.query_string)));

    for key in ["CONTENT_TYPE", "CONTENT_LENGTH", "SERVER_PROTOCOL", "SERVER_NAME", "SERVER_PORT", "REMOTE_ADDR"] {
        if let Some(val) = ctx.env(key) {
            lines.push(format!("  {}={}", key, redact_value_for_log(key, val)));
        }
    }

    lines.push("  HTTP headers:".to_string());
    if ctx.headers.is_empty() {
        lines.push("    (none)".to_string());
    }
    for (name, value) in ctx.headers.iter() {
        lines.push(format!("    {}={}", name, redact_value_for_log(name, value)));
    }

    lines.join("\n")
}

pub fn redact_value_for_log(key: &str, value: &str) -> String {
    let key_l = key.to_ascii_lowercase();
    if key_l == "query_string" {
        return redact_query_string(value);
    }
    if is_sensitive_key_like(&key_l) {
        return "***redacted***".to_string();
    }
    // 長すぎる値は切り詰める（例：User-Agent）
    match value.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...[truncated]", &value[..cut]),
        None => value.to_string(),
    }
}

pub fn is_sensitive_key_like(lower_key: &str) -> bool {
    const PATTERNS: [&str; 14] = [
        "authorization",
        "cookie",
        "token",
        "secret",
        "password",
        "pass",
        "jwt",
        "auth",
        "session",
        "csrf",
        "signature",
        "private",
        "key",
        "credential",
    ];
    PATTERNS.iter().any(|p| lower_key.contains(p))
}

pub fn redact_query_string(qs: &str) -> String {
    qs.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            if is_sensitive_key_like(&k.to_ascii_lowercase()) {
                format!("{}=***redacted***", k)
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
