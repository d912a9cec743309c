//! リクエストデコーダ
//!
//! 環境変数の塊と入力バイト列から `RequestContext` を組み立てる。

use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;
use log::{debug, warn};

use crate::common::codec;
use crate::common::{FieldMap, Method, RequestContext};
use crate::config::Config;
use crate::error::Error;
use super::multipart::parse_multipart;
use super::request::{environment_map, headers_from_environment, parse_environment};

/// `a=1&b=2` をデコードしながらマップへ追加する（既存の名前は上書きしない）
pub fn merge_query_pairs(target: &mut FieldMap, query_string: &str) {
    for pair in query_string.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        target.insert_if_absent(codec::decode(key), codec::decode(value));
    }
}

/// クエリ文字列をパースしてURLデコードを行う（同名は最初の出現を優先）
pub fn parse_query_string(query_string: &str) -> FieldMap {
    let mut params = FieldMap::new();
    merge_query_pairs(&mut params, query_string);
    params
}

/// gzipボディを解凍する（上限を超える場合はエラー）
fn decompress_gzip(body: &[u8], max_body_size: usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .take(max_body_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::InvalidRequest(format!("Failed to decompress gzip body: {}", e)))?;
    if out.len() > max_body_size {
        return Err(Error::PayloadTooLarge(format!(
            "Decompressed body exceeds maximum allowed size {} bytes",
            max_body_size
        )));
    }
    Ok(out)
}

/// 環境変数の塊だけからリクエストの識別情報を復元する
///
/// メソッド・URL・クエリ変数・ヘッダーと、参照元・エージェント・ユーザー名・IPを埋める。
/// 失敗しないため、ボディの解釈に失敗した場合も監査レコードにはこの情報が残る。
pub fn decode_identity(environment: &str) -> RequestContext {
    let entries = parse_environment(environment);
    let env = environment_map(&entries);
    let headers = headers_from_environment(&entries);

    let method = env
        .get("REQUEST_METHOD")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map_or(Method::GET, Method::parse);
    let url = env
        .get("REQUEST_URI")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| "/".to_string());

    let mut ctx = RequestContext::new(method, url);
    merge_query_pairs(&mut ctx.query, &ctx.query_string);

    ctx.referrer = headers.get("Referer").map(str::to_string);
    ctx.agent = headers.get("User-Agent").map(str::to_string);
    ctx.username = headers
        .get("X-Remote-User")
        .map(str::to_string)
        .or_else(|| env.get("REMOTE_USER").cloned());
    ctx.ip = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env.get("REMOTE_ADDR").cloned());
    ctx.headers = headers;
    ctx.environment = env;
    ctx
}

/// POSTボディを解釈してコンテキストに反映する
pub fn decode_body(ctx: &mut RequestContext, input: &[u8], config: &Config) -> Result<(), Error> {
    if input.len() > config.max_body_size {
        return Err(Error::PayloadTooLarge(format!(
            "Request body size {} bytes exceeds maximum allowed size {} bytes",
            input.len(),
            config.max_body_size
        )));
    }
    if ctx.method != Method::POST || input.is_empty() {
        return Ok(());
    }

    let mut body = Bytes::copy_from_slice(input);
    let encoding = ctx.header("Content-Encoding").unwrap_or("");
    if encoding.eq_ignore_ascii_case("gzip") {
        body = Bytes::from(decompress_gzip(&body, config.max_body_size)?);
    }

    let content_type = ctx
        .env("CONTENT_TYPE")
        .or_else(|| ctx.header("Content-Type"))
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let parsed = parse_multipart(&body);
        debug!("decoded multipart body: {} files, {} fields", parsed.files.len(), parsed.fields.len());
        ctx.files = parsed.files;
        ctx.form_fields = parsed.fields;
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = String::from_utf8_lossy(&body);
        merge_query_pairs(&mut ctx.query, text.trim());
    } else if !content_type.is_empty() {
        debug!("leaving POST body of type {} undecoded", content_type);
    } else {
        warn!("POST body without Content-Type");
    }
    Ok(())
}

/// 環境変数の塊と入力からリクエストを復元する
pub fn decode(environment: &str, input: &[u8], config: &Config) -> Result<RequestContext, Error> {
    let mut ctx = decode_identity(environment);
    decode_body(&mut ctx, input, config)?;
    Ok(ctx)
}
