use std::sync::OnceLock;

#[cfg(debug_assertions)]
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error};
#[cfg(debug_assertions)]
use log::warn;
use regex::Regex;

use crate::common::{Handler, Method, RequestContext, ResponseDocument};
use crate::error::Error;

use super::pattern::{anchor_pattern, ensure_safe_pattern};

/// ルートハンドラー
///
/// 関数はレスポンス文書に断片とヘッダーを書き込み、ステータスコードを返す。
pub struct RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    /// ルートパス（正規表現パターン）
    pub path_pattern: String,
    /// コンパイル済み正規表現（キャッシュ）
    pub compiled_regex: OnceLock<Result<Regex, regex::Error>>,
    /// HTTPメソッド
    pub method: Method,
    /// ハンドラー関数
    pub handler_fn: F,
}

impl<F> RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    /// パターンを検証してRouteHandlerを作成
    pub fn try_new(method: Method, path_pattern: impl Into<String>, handler_fn: F) -> Result<Self, Error> {
        let safe_pattern = ensure_safe_pattern(&path_pattern.into())?;
        debug!("Registering handler for {} with pattern: {}", method, safe_pattern);
        Ok(Self {
            method,
            path_pattern: safe_pattern,
            compiled_regex: OnceLock::new(),
            handler_fn,
        })
    }

    /// RouteHandlerを作成（不正なパターンはどのパスにもマッチしない）
    pub fn new(method: Method, path_pattern: impl Into<String>, handler_fn: F) -> Self {
        let safe_pattern = anchor_pattern(&path_pattern.into());
        debug!("Registering handler for {} with pattern: {}", method, safe_pattern);
        Self {
            method,
            path_pattern: safe_pattern,
            compiled_regex: OnceLock::new(),
            handler_fn,
        }
    }
}

#[async_trait]
impl<F> Handler for RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    fn matches(&self, path: &str, method: &Method) -> bool {
        if method != &self.method {
            return false;
        }

        let compiled_result = self.compiled_regex.get_or_init(|| Regex::new(&self.path_pattern));

        match compiled_result {
            Ok(regex) => {
                // デバッグビルド時のみ遅いマッチを警告
                #[cfg(debug_assertions)]
                {
                    let start_time = Instant::now();
                    let is_match = regex.is_match(path);
                    let elapsed = start_time.elapsed();
                    if elapsed > Duration::from_millis(100) {
                        warn!(
                            "Slow regex matching detected: pattern '{}' took {:?} for path '{}'",
                            self.path_pattern, elapsed, path
                        );
                    }
                    debug!("Path matching: {} against pattern {}: {}", path, self.path_pattern, is_match);
                    is_match
                }
                #[cfg(not(debug_assertions))]
                {
                    regex.is_match(path)
                }
            }
            Err(e) => {
                error!("Invalid regex pattern: {} - {}. Route is disabled.", self.path_pattern, e);
                false
            }
        }
    }

    fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    async fn handle(&self, ctx: &RequestContext, res: &mut ResponseDocument) -> Result<u16, Error> {
        (self.handler_fn)(ctx, res)
    }
}
