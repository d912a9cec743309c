//! CGIレスポンスの組み立て

use std::io::{self, Write};

use crate::common::{reason_phrase, FieldMap, ResponseDocument};
use crate::error::Error;
use super::validation::{is_valid_header_name, is_valid_header_value};

/// ステータス行（理由句が空なら末尾の空白は付けない）
pub fn status_line(status: u16) -> String {
    format!("Status: {} {}", status, reason_phrase(status))
        .trim_end()
        .to_string()
}

/// ステータス行・ヘッダー・空行・本文を連結する
fn assemble(status: u16, headers: &FieldMap, body: &str) -> String {
    let mut out = status_line(status);
    out.push_str("\r\n");
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

/// ハンドラが書いたレスポンス文書を出力テキストに仕上げる
///
/// - 本文が空ならステータスコードの文字列を本文にする
/// - `Content-Type` は未設定の場合のみ `text/plain`
/// - `Connection` は常に `close` で上書き
/// - 予約ヘッダー（`Status`）を拒否し、不正なヘッダーはエラーにする
pub fn finalize(status: u16, document: &ResponseDocument) -> Result<String, Error> {
    let mut headers = FieldMap::headers();
    for (name, value) in document.headers().iter() {
        if name.eq_ignore_ascii_case("Status") {
            return Err(Error::InvalidHeader("handlers must not set the Status header".to_string()));
        }
        if !is_valid_header_name(name) || !is_valid_header_value(value) {
            return Err(Error::InvalidHeader(format!("rejected header '{}'", name.escape_debug())));
        }
        headers.insert(name, value);
    }
    headers.insert_if_absent("Content-Type", "text/plain");
    headers.insert("Connection", "close");

    let body = if document.is_empty() {
        status.to_string()
    } else {
        document.body()
    };
    Ok(assemble(status, &headers, &body))
}

/// HTMLとして安全に埋め込めるようにエスケープする
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// エラー時の最小限のHTMLレスポンス
///
/// ハンドラの出力は一切含めず、素のメッセージだけを載せる。
pub fn error_output(status: u16, message: &str) -> String {
    let reason = reason_phrase(status);
    let title = if reason.is_empty() { status.to_string() } else { format!("{} {}", status, reason) };
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head><body><h1>{title}</h1><p>{message}</p></body></html>\n",
        title = escape_html(&title),
        message = escape_html(message),
    );
    let mut headers = FieldMap::headers();
    headers.insert("Content-Type", "text/html");
    headers.insert("Connection", "close");
    assemble(status, &headers, &body)
}

/// 出力テキストを任意のライターへ書き出す
pub fn write_output_to<W: Write>(output: &str, out: &mut W) -> Result<(), Error> {
    out.write_all(output.as_bytes())
        .map_err(|e| Error::InternalServerError(format!("Failed to write response: {}", e)))?;
    out.flush()
        .map_err(|e| Error::InternalServerError(format!("Failed to flush response: {}", e)))
}

/// 出力テキストを標準出力に書き出す
pub fn write_output(output: &str) -> Result<(), Error> {
    let mut out = io::stdout().lock();
    write_output_to(output, &mut out)
}
