//! 実行時設定
//!
//! グローバルな設定アクセサは持たず、`Config` をデコーダ・ディスパッチャ・
//! RESTハンドラへ明示的に渡す。

use std::env;
use std::path::PathBuf;

/// リクエストボディ上限のデフォルト（5MB）
pub const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// 修飾されていないリレーション名に使うスキーマのデフォルト
pub const DEFAULT_SCHEMA: &str = "public";

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// 接続先DSN
    pub database_url: Option<String>,
    /// 受け付ける入力の最大バイト数
    pub max_body_size: usize,
    /// 既定のスキーマ
    pub default_schema: String,
    /// `limit` の上限（未設定なら無制限）
    pub max_limit: Option<u64>,
    /// 主キー参照でヒットしなかった場合に404を返すか
    pub lookup_miss_not_found: bool,
    /// JSON Lines形式の監査ログファイル
    pub audit_log_path: Option<PathBuf>,
    /// 監査レコードを `pgbridge_requests` テーブルへ書き込むか
    pub audit_table: bool,
    /// 人間向けのエラーログファイル
    pub error_log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            default_schema: DEFAULT_SCHEMA.to_string(),
            max_limit: None,
            lookup_miss_not_found: false,
            audit_log_path: None,
            audit_table: false,
            error_log_path: None,
        }
    }
}

impl Config {
    /// 新しいConfigを作成（すべてデフォルト値）
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数から設定を読み込む
    /// 不正な値は警告なしにデフォルトへフォールバックする
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: non_empty_var("PGBRIDGE_DATABASE_URL").or_else(|| non_empty_var("DATABASE_URL")),
            max_body_size: non_empty_var("PGBRIDGE_MAX_BODY_SIZE")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.max_body_size),
            default_schema: non_empty_var("PGBRIDGE_SCHEMA").unwrap_or(defaults.default_schema),
            max_limit: non_empty_var("PGBRIDGE_MAX_LIMIT").and_then(|s| s.parse::<u64>().ok()),
            lookup_miss_not_found: flag_var("PGBRIDGE_LOOKUP_MISS_404"),
            audit_log_path: non_empty_var("PGBRIDGE_AUDIT_LOG").map(PathBuf::from),
            audit_table: flag_var("PGBRIDGE_AUDIT_TABLE"),
            error_log_path: non_empty_var("PGBRIDGE_ERROR_LOG").map(PathBuf::from),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    pub fn with_max_limit(mut self, limit: u64) -> Self {
        self.max_limit = Some(limit);
        self
    }

    pub fn with_lookup_miss_not_found(mut self, enabled: bool) -> Self {
        self.lookup_miss_not_found = enabled;
        self
    }

    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }

    pub fn with_error_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log_path = Some(path.into());
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag_var(key: &str) -> bool {
    matches!(
        non_empty_var(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}
