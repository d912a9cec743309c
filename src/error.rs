//! エラー型の定義

use serde::Serialize;
use thiserror::Error;

/// エラーの分類（ディスパッチャがステータスコードを決めるために使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力・検証エラー（400系）
    Input,
    /// ルートが存在しない
    NotFound,
    /// 上記以外すべて（500）
    Internal,
}

/// アプリケーションのエラー型
#[derive(Error, Debug)]
pub enum Error {
    /// 不正なリクエスト（デコード不能なボディ、未知のメソッドなど）
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 解決できないリレーション
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// サポートしていない操作（複合主キーでの参照など）
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// リクエストのルーティングエラー
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// リクエストボディが上限を超えた
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// データベースエラー（SQLSTATEを保持）
    #[error("Database error: {message}")]
    Database {
        code: Option<String>,
        message: String,
        detail: Option<String>,
    },

    /// ハンドラ内でpanicが発生した
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    /// 出力できないヘッダー
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// レスポンスのシリアライズエラー
    #[error("Failed to serialize response: {0}")]
    ResponseSerializationError(String),

    /// 設定エラー
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 内部サーバーエラー
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl Error {
    /// エラーの分類を取得
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_)
            | Error::UnknownRelation(_)
            | Error::Unsupported(_)
            | Error::PayloadTooLarge(_) => ErrorKind::Input,
            Error::RouteNotFound(_) => ErrorKind::NotFound,
            // SQLSTATE クラス22（data exception）はリテラルの型変換失敗など入力起因
            Error::Database { code: Some(code), .. } if code.starts_with("22") => ErrorKind::Input,
            _ => ErrorKind::Internal,
        }
    }

    /// エラーからHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match (self, self.kind()) {
            (Error::PayloadTooLarge(_), _) => 413,
            (_, ErrorKind::Input) => 400,
            (_, ErrorKind::NotFound) => 404,
            (_, ErrorKind::Internal) => 500,
        }
    }

    /// 機械可読なエラーコード
    pub fn code(&self) -> String {
        let code = match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::UnknownRelation(_) => "unknown_relation",
            Error::Unsupported(_) => "unsupported",
            Error::RouteNotFound(_) => "route_not_found",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::Database { code: Some(code), .. } => return code.clone(),
            Error::Database { code: None, .. } => "database",
            Error::HandlerPanic(_) => "handler_panic",
            Error::InvalidHeader(_) => "invalid_header",
            Error::ResponseSerializationError(_) => "response_serialization",
            Error::ConfigurationError(_) => "configuration",
            Error::InternalServerError(_) => "internal",
        };
        code.to_string()
    }

    /// クライアントに見せてよい素のメッセージ（接頭辞なし）
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidRequest(m)
            | Error::UnknownRelation(m)
            | Error::Unsupported(m)
            | Error::RouteNotFound(m)
            | Error::PayloadTooLarge(m)
            | Error::HandlerPanic(m)
            | Error::InvalidHeader(m)
            | Error::ResponseSerializationError(m)
            | Error::ConfigurationError(m)
            | Error::InternalServerError(m) => m,
            Error::Database { message, .. } => message,
        }
    }

    /// 監査レコード用の診断情報を構築
    pub fn diagnostic(&self, context: impl Into<String>) -> Diagnostic {
        let detail = match self {
            Error::Database { detail, .. } => detail.clone(),
            _ => None,
        };
        Diagnostic {
            code: self.code(),
            message: self.message().to_string(),
            detail,
            context: context.into(),
        }
    }
}

/// 監査レコードに残す診断情報（クライアントには返さない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub context: String,
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::ResponseSerializationError(value.to_string())
    }
}
