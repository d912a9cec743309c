//! リクエストコンテキストの実装
//!
//! 1リクエストの間だけ存在するデコード済みのデータ。リクエストごとに新しく作られ、
//! スコープを抜けると破棄される。

use std::collections::HashMap;
use bytes::Bytes;

use super::fields::FieldMap;
use super::http::Method;

/// アップロードされたファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// フォームのフィールド名
    pub name: String,
    /// クライアントが送ったファイル名
    pub filename: String,
    /// MIMEタイプ（未指定なら application/octet-stream）
    pub content_type: String,
    /// 中身
    pub content: Bytes,
}

/// デコード済みリクエスト
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTPメソッド
    pub method: Method,
    /// 生のURL（クエリ文字列を含む）
    pub url: String,
    /// `?` より前のパス
    pub path: String,
    /// 前後の `/` を除いて分割したパス
    pub segments: Vec<String>,
    /// 生のクエリ文字列
    pub query_string: String,
    pub referrer: Option<String>,
    pub agent: Option<String>,
    pub username: Option<String>,
    pub ip: Option<String>,
    /// CGI環境変数
    pub environment: HashMap<String, String>,
    /// HTTPヘッダー（`HTTP_` 接頭辞の環境変数から生成）
    pub headers: FieldMap,
    /// クエリ変数（URLが優先、POSTボディは未登録の名前のみ追加）
    pub query: FieldMap,
    /// multipartのファイルを持たないフィールド
    pub form_fields: FieldMap,
    /// アップロードファイル
    pub files: Vec<UploadedFile>,
}

impl RequestContext {
    /// 指定メソッド・URLの空のコンテキストを作成
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query_string) = match url.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (url.clone(), String::new()),
        };
        let segments = path_segments(&path);
        Self {
            method,
            url,
            path,
            segments,
            query_string,
            referrer: None,
            agent: None,
            username: None,
            ip: None,
            environment: HashMap::new(),
            headers: FieldMap::headers(),
            query: FieldMap::new(),
            form_fields: FieldMap::new(),
            files: Vec::new(),
        }
    }

    /// クエリ変数を追加（テスト・組み込み用）
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert_if_absent(key, value);
        self
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn query_var(&self, name: &str) -> Option<&str> {
        self.query.get(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(|s| s.as_str())
    }

    /// フィールド名でアップロードファイルを探す
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// ログ・診断用のリクエスト行
    pub fn request_line(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// パスを前後の `/` を除いて分割する（ルートは空）
pub fn path_segments(path: &str) -> Vec<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(|s| s.to_string()).collect()
}
