//! リクエストの監査レコード
//!
//! 1リクエストにつき1レコードを作り、ディスパッチ完了後に各シンクへ永続化する。
//! シンクの失敗はログに残すだけでレスポンスには影響させない。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::common::RequestContext;
use crate::error::{Diagnostic, Error};

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::encode(bytes))
}

/// 1リクエスト分の監査レコード
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub ip: Option<String>,
    pub method: String,
    pub url: String,
    pub referrer: Option<String>,
    pub username: Option<String>,
    pub status: u16,
    pub size: usize,
    pub agent: Option<String>,
    /// 受け取った環境変数の塊（そのまま）
    pub environment: String,
    /// 受け取った入力（JSONではbase64）
    #[serde(serialize_with = "serialize_base64")]
    pub input: Vec<u8>,
    pub output: String,
    pub error: Option<Diagnostic>,
    pub debug: Option<serde_json::Value>,
}

impl RequestRecord {
    /// 取り込み開始時点のレコードを作成
    pub fn begin(environment: &str, input: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration_ms: 0.0,
            ip: None,
            method: String::new(),
            url: String::new(),
            referrer: None,
            username: None,
            status: 0,
            size: 0,
            agent: None,
            environment: environment.to_string(),
            input: input.to_vec(),
            output: String::new(),
            error: None,
            debug: None,
        }
    }

    /// デコード済みリクエストの情報を反映
    pub fn apply_context(&mut self, ctx: &RequestContext) {
        self.ip = ctx.ip.clone();
        self.method = ctx.method.to_string();
        self.url = ctx.url.clone();
        self.referrer = ctx.referrer.clone();
        self.username = ctx.username.clone();
        self.agent = ctx.agent.clone();
    }

    /// 出力と所要時間を確定する
    pub fn finish(&mut self, elapsed: Duration, output: &str) {
        self.duration_ms = elapsed.as_micros() as f64 / 1000.0;
        self.size = output.len();
        self.output = output.to_string();
    }
}

/// 監査レコードの永続化先
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// レコードを書き込む
    async fn record(&self, record: &RequestRecord) -> Result<(), Error>;
}

/// JSON Lines形式でファイルに追記するシンク
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, record: &RequestRecord) -> Result<(), Error> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::InternalServerError(format!("Failed to open audit log {}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::InternalServerError(format!("Failed to append audit log: {}", e)))
    }
}

/// メモリ上に保持するシンク（組み込み・テスト用）
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<RequestRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに記録されたレコードのコピー
    pub fn records(&self) -> Vec<RequestRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &RequestRecord) -> Result<(), Error> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}
