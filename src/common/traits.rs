//! コアトレイト定義（Handler）

use async_trait::async_trait;
use crate::error::Error;
use super::context::RequestContext;
use super::http::{Method, ResponseDocument};

/// ハンドラーの特性
///
/// `handle` は1リクエストにつき一度だけ呼ばれる。本文の断片とヘッダーは
/// `ResponseDocument` に書き込み、ステータスコードを返す。
#[async_trait]
pub trait Handler: Send + Sync {
    /// パスとメソッドがこのハンドラにマッチするかどうかを判定
    fn matches(&self, path: &str, method: &Method) -> bool;

    /// ハンドラに関連付けられたパスパターン文字列を取得
    fn path_pattern(&self) -> &str;

    /// リクエストを処理
    async fn handle(&self, ctx: &RequestContext, res: &mut ResponseDocument) -> Result<u16, Error>;
}
