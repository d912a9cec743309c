//! pgbridge: CGIリクエストをデコードし、PostgreSQLのリレーションをREST APIとして公開する基盤
//!
//! 生の環境変数とボディからリクエストを復元し、登録されたハンドラを一度だけ実行して
//! 常に整形済みのHTTPレスポンステキストを返す。

use std::sync::Arc;

pub mod cgi;
pub mod common;
pub mod config;
pub mod error;
pub mod handler;
pub mod rest;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use cgi::{AuditSink, RequestRecord};
pub use common::*;
pub use config::Config;
pub use error::*;
pub use handler::*;

/// ルート表と監査シンクを組み立てるビルダー
#[derive(Default)]
pub struct BridgeBuilder {
    handlers: Vec<Box<dyn common::Handler>>,
    audit_sinks: Vec<Arc<dyn AuditSink>>,
    config: Config,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラを追加
    ///
    /// パターン中の `/` の数で降順に並べ替える。同数の場合は登録順を保つ。
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: common::Handler + 'static,
    {
        self.handlers.push(Box::new(handler));
        self.handlers.sort_by(|a, b| {
            let count_a = a.path_pattern().matches('/').count();
            let count_b = b.path_pattern().matches('/').count();
            count_b.cmp(&count_a)
        });
        self
    }

    /// 監査シンクを追加
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sinks.push(sink);
        self
    }

    /// 設定を差し替える
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Bridge {
        Bridge {
            handlers: self.handlers,
            audit_sinks: self.audit_sinks,
            config: self.config,
        }
    }
}

/// リクエストを処理するアプリケーション
pub struct Bridge {
    handlers: Vec<Box<dyn common::Handler>>,
    audit_sinks: Vec<Arc<dyn AuditSink>>,
    config: Config,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// 指定されたパスにマッチする最も具体的なハンドラを取得
    pub fn find_handler(&self, path: &str, method: &common::Method) -> Option<&dyn common::Handler> {
        self.handlers
            .iter()
            .find(|handler| handler.matches(path, method))
            .map(|handler| handler.as_ref())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audit_sinks(&self) -> &[Arc<dyn AuditSink>] {
        &self.audit_sinks
    }

    /// リクエストを取り込み、完全なレスポンステキストを返す
    pub async fn submit(&self, environment: &str, input: &[u8]) -> String {
        cgi::submit(self, environment, input).await
    }

    /// ハンドラを実行せずに失敗として応答する（監査レコードとエラーログは通常どおり残る）
    pub async fn reject(&self, environment: &str, input: &[u8], err: &Error) -> String {
        cgi::reject(self, environment, input, err).await
    }
}
