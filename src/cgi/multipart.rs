//! multipart/form-data ボディの解析

use bytes::Bytes;
use log::debug;

use crate::common::split::{split, split_once};
use crate::common::{FieldMap, UploadedFile};

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// MIMEタイプが指定されていないファイルの既定値
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// multipartボディの解析結果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    /// `name` と `filename` を両方持つパート
    pub files: Vec<UploadedFile>,
    /// `filename` を持たないパート（最初の出現を優先）
    pub fields: FieldMap,
}

/// パートのヘッダーブロックを `name: value` として解析する（同名は最初の出現を優先）
pub fn parse_part_headers(block: &[u8]) -> FieldMap {
    let text = String::from_utf8_lossy(block);
    let mut headers = FieldMap::headers();
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                headers.insert_if_absent(name, value.trim());
            }
        }
    }
    headers
}

/// `form-data; name="f"; filename="a.txt"` からパラメータを取り出す
pub fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in disposition.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => params.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    params.push(current);

    params.iter().find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        let unquoted = v
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(v);
        Some(unquoted.to_string())
    })
}

/// multipartボディを解析する
///
/// 境界文字列はボディ1行目（CRLFまで）から読み取る。境界で分割した各チャンクを
/// 最初の空行でヘッダーと中身に分け、`Content-Disposition` に `name` と `filename`
/// の両方があればアップロードファイルとして扱う。
pub fn parse_multipart(body: &Bytes) -> MultipartBody {
    let mut result = MultipartBody::default();

    let boundary = match split_once(body, CRLF) {
        Some((first, _)) => first,
        None => body.as_ref(),
    };
    if boundary.is_empty() {
        debug!("multipart body without boundary line");
        return result;
    }

    for range in split(body, boundary) {
        let chunk = body.slice(range);
        // 境界直後の改行を取り除く
        let chunk = if chunk.starts_with(CRLF) { chunk.slice(CRLF.len()..) } else { chunk };
        let Some((header_block, content)) = split_once(&chunk, HEADER_END) else {
            continue;
        };
        let headers = parse_part_headers(header_block);
        let Some(disposition) = headers.get("Content-Disposition") else {
            continue;
        };
        let Some(name) = disposition_param(disposition, "name") else {
            continue;
        };

        // 中身の末尾にある次の境界前の改行は中身に含めない
        let content_start = chunk.len() - content.len();
        let mut content_end = chunk.len();
        if content.ends_with(CRLF) {
            content_end -= CRLF.len();
        }
        let content = chunk.slice(content_start..content_end);

        match disposition_param(disposition, "filename") {
            Some(filename) => {
                let content_type = headers
                    .get("Content-Type")
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(DEFAULT_FILE_TYPE)
                    .to_string();
                debug!("multipart file part: name={} filename={} ({} bytes)", name, filename, content.len());
                result.files.push(UploadedFile {
                    name,
                    filename,
                    content_type,
                    content,
                });
            }
            None => {
                result
                    .fields
                    .insert_if_absent(name, String::from_utf8_lossy(&content).into_owned());
            }
        }
    }

    result
}
