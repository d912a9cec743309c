//! CGI環境のシリアライズ形式と標準入力の読み込み

use std::collections::HashMap;
use std::io::{self, Read};

use crate::common::FieldMap;
use crate::error::Error;

/// シリアライズ時に先頭へ置くバナー行（デコード時は読み飛ばされる）
pub const ENVIRONMENT_BANNER: &str = "# pgbridge environment";

/// 環境変数名として妥当か（英字または `_` で始まり、英数字と `_` のみ）
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 環境変数の塊を (名前, 値) の列に分解する
///
/// 改行で分割して各行をtrimし、1行目はシリアライズ形式の都合で必ず読み飛ばす。
/// `NAME=value` の形の行だけを最初の `=` で分割して採用する。
pub fn parse_environment(blob: &str) -> Vec<(String, String)> {
    blob.split('\n')
        .skip(1)
        .map(str::trim)
        .filter_map(|line| {
            let (name, value) = line.split_once('=')?;
            is_env_name(name).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// 環境変数の列をマップにする（同名は最初の出現を優先）
pub fn environment_map(entries: &[(String, String)]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (k, v) in entries {
        map.entry(k.clone()).or_insert_with(|| v.clone());
    }
    map
}

/// `HTTP_X_AUTH_TOKEN` -> `X-Auth-Token` のように変換する
pub fn header_name_from_env(key: &str) -> Option<String> {
    let rest = key.strip_prefix("HTTP_")?;
    let name = rest
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
            }
        })
        .collect::<Vec<String>>()
        .join("-");
    Some(name)
}

/// 環境変数からHTTPヘッダーを取り出す
pub fn headers_from_environment(entries: &[(String, String)]) -> FieldMap {
    let mut headers = FieldMap::headers();
    for (key, value) in entries {
        if let Some(name) = header_name_from_env(key) {
            headers.insert_if_absent(name, value.clone());
        }
    }
    headers
}

/// プロセス環境変数を環境変数の塊へシリアライズする
pub fn serialize_environment<I, K, V>(vars: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::from(ENVIRONMENT_BANNER);
    for (k, v) in vars {
        // 値に改行を含む変数は形式上表現できないので1行目だけを残す
        let value = v.as_ref().lines().next().unwrap_or("");
        out.push('\n');
        out.push_str(k.as_ref());
        out.push('=');
        out.push_str(value);
    }
    out
}

/// リクエストボディを読み込む
///
/// `CONTENT_LENGTH` バイトまで、かつ `max_body_size + 1` バイトまでしか読まない。
/// 上限超過の判定はデコーダが行う。
pub fn read_request_body<R: Read>(input: R, content_length: Option<&str>, max_body_size: usize) -> Result<Vec<u8>, Error> {
    let length = match content_length.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(n) if n > 0 => n,
        _ => return Ok(Vec::new()),
    };
    let limit = length.min(max_body_size as u64 + 1);
    let mut buffer = Vec::with_capacity(limit as usize);
    input
        .take(limit)
        .read_to_end(&mut buffer)
        .map_err(|e| Error::InvalidRequest(format!("Failed to read request body: {}", e)))?;
    Ok(buffer)
}

/// 標準入力からリクエストボディを読み込む
pub fn read_stdin_body(content_length: Option<&str>, max_body_size: usize) -> Result<Vec<u8>, Error> {
    read_request_body(io::stdin().lock(), content_length, max_body_size)
}
