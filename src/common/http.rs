//! HTTP関連の基本型

use std::fmt;
use serde::Serialize;
use crate::error::Error;
use super::fields::FieldMap;

/// HTTPステータスコード（理由句テーブルを持つもの）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    MovedPermanently = 301,
    MovedTemporarily = 302,
    BadRequest = 400,
    PermissionDenied = 403,
    NotFound = 404,
    Conflict = 409,
    PayloadTooLarge = 413,
    InternalServerError = 500,
}

impl StatusCode {
    /// u16の値を取得
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// u16からStatusCodeに変換（テーブルにないものはNone）
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(StatusCode::Ok),
            301 => Some(StatusCode::MovedPermanently),
            302 => Some(StatusCode::MovedTemporarily),
            400 => Some(StatusCode::BadRequest),
            403 => Some(StatusCode::PermissionDenied),
            404 => Some(StatusCode::NotFound),
            409 => Some(StatusCode::Conflict),
            413 => Some(StatusCode::PayloadTooLarge),
            500 => Some(StatusCode::InternalServerError),
            _ => None,
        }
    }

    /// 理由句を取得
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::PermissionDenied => "Permission Denied",
            StatusCode::NotFound => "Not Found",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> u16 {
        status.as_u16()
    }
}

/// ステータスコードの理由句（未登録のコードは空文字）
pub fn reason_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code).map(|s| s.reason_phrase()).unwrap_or("")
}

/// HTTPメソッド
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// 上記以外（`REQUEST_METHOD` の値をそのまま保持）
    Other(String),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::HEAD => write!(f, "HEAD"),
            Method::OPTIONS => write!(f, "OPTIONS"),
            Method::Other(method) => f.write_str(method),
        }
    }
}

impl Method {
    /// 文字列からMethodに変換
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "PATCH" => Some(Method::PATCH),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            _ => None,
        }
    }

    /// `REQUEST_METHOD` の値を解釈する（未知のメソッドは `Other` として保持）
    pub fn parse(method: &str) -> Self {
        Self::from_str(method).unwrap_or_else(|| Method::Other(method.to_string()))
    }
}

/// レスポンス文書のアキュムレータ
///
/// ハンドラは本文の断片を追記し、ヘッダーを設定する。ステータスはハンドラの戻り値で決まる。
#[derive(Debug, Clone)]
pub struct ResponseDocument {
    fragments: Vec<String>,
    headers: FieldMap,
    debug: Option<serde_json::Value>,
}

impl Default for ResponseDocument {
    fn default() -> Self {
        Self {
            fragments: Vec::new(),
            headers: FieldMap::headers(),
            debug: None,
        }
    }
}

impl ResponseDocument {
    /// 空のResponseDocumentを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 本文の断片を追記
    pub fn append(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// 値をJSONとしてシリアライズして追記
    pub fn append_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let json = serde_json::to_string(value)?;
        self.append(json);
        Ok(())
    }

    /// ヘッダーを設定（同名は後勝ち）
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// 未設定の場合のみヘッダーを設定
    pub fn default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert_if_absent(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &FieldMap {
        &self.headers
    }

    /// 監査レコードに残すデバッグ情報を設定
    pub fn set_debug(&mut self, value: serde_json::Value) {
        self.debug = Some(value);
    }

    pub fn take_debug(&mut self) -> Option<serde_json::Value> {
        self.debug.take()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// 追記順に連結した本文
    pub fn body(&self) -> String {
        self.fragments.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(Method::from_str("GET"), Some(Method::GET));
        assert_eq!(Method::from_str("get"), Some(Method::GET));
        assert_eq!(Method::from_str("POST"), Some(Method::POST));
        assert_eq!(Method::from_str("OPTIONS"), Some(Method::OPTIONS));
        assert_eq!(Method::from_str("INVALID"), None);
    }

    #[test]
    fn test_method_parse_keeps_unknown() {
        assert_eq!(Method::parse("delete"), Method::DELETE);
        let other = Method::parse("PROPFIND");
        assert_eq!(other, Method::Other("PROPFIND".to_string()));
        assert_eq!(other.to_string(), "PROPFIND");
    }

    #[test]
    fn test_reason_phrase_table() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(301), "Moved Permanently");
        assert_eq!(reason_phrase(302), "Moved Temporarily");
        assert_eq!(reason_phrase(400), "Bad Request");
        assert_eq!(reason_phrase(403), "Permission Denied");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(409), "Conflict");
        assert_eq!(reason_phrase(500), "Internal Server Error");
        assert_eq!(reason_phrase(201), "");
        assert_eq!(reason_phrase(418), "");
    }

    #[test]
    fn test_status_code_from_trait() {
        let status_u16: u16 = StatusCode::Ok.into();
        assert_eq!(status_u16, 200);
        assert_eq!(StatusCode::from_u16(409), Some(StatusCode::Conflict));
    }

    #[test]
    fn test_response_document_fragments_in_order() {
        let mut doc = ResponseDocument::new();
        assert!(doc.is_empty());
        doc.append("<p>");
        doc.append("hello");
        doc.append("</p>");
        assert_eq!(doc.body(), "<p>hello</p>");
    }

    #[test]
    fn test_response_document_headers() {
        let mut doc = ResponseDocument::new();
        doc.set_header("Content-Type", "text/html");
        doc.set_header("content-type", "application/json");
        doc.default_header("Content-Type", "text/plain");
        assert_eq!(doc.header("Content-Type"), Some("application/json"));
        assert_eq!(doc.headers().len(), 1);
    }

    #[test]
    fn test_append_json() {
        let mut doc = ResponseDocument::new();
        doc.append_json(&serde_json::json!({"error": "x", "columns": ["a"]})).unwrap();
        assert_eq!(doc.body(), r#"{"error":"x","columns":["a"]}"#);
    }
}
