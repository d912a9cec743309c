//! CGIメイン実行ロジック
//!
//! `submit` は環境変数の塊と入力を受け取り、常に完全なレスポンステキストを返す。
//! 失敗は一度だけ捕捉され、ステータスコードに分類されて最小限のHTMLに置き換わる。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use log::{debug, error, info};

use crate::common::{Handler, RequestContext, ResponseDocument};
use crate::error::Error;
use crate::Bridge;
use super::audit::RequestRecord;
use super::decoder::{decode_body, decode_identity};
use super::error_logging::{format_failure, log_error_to_file};
use super::response::{error_output, finalize};

/// panicのペイロードからメッセージを取り出す
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic occurred in handler".to_string()
    }
}

/// エラーを記録し、クライアント向けのHTMLに変換する
fn fail(record: &mut RequestRecord, err: &Error, context: &str) -> String {
    let status = err.status_code();
    error!("{} failed with {}: {}", context, status, err);
    record.status = status;
    record.error = Some(err.diagnostic(context));
    error_output(status, err.message())
}

/// ハンドラを一度だけ実行し、レスポンステキストを組み立てる
///
/// ハンドラのエラー・panic・レスポンス組み立ての失敗はここで捕捉される。
/// 失敗時はハンドラが書いた断片もヘッダーもすべて捨てる。
pub async fn dispatch(ctx: &RequestContext, handler: &dyn Handler, record: &mut RequestRecord) -> String {
    let mut document = ResponseDocument::new();

    let outcome = AssertUnwindSafe(handler.handle(ctx, &mut document))
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(Error::HandlerPanic(panic_message(payload.as_ref()))),
    };
    record.debug = document.take_debug();

    let rendered = result.and_then(|status| finalize(status, &document).map(|output| (status, output)));
    match rendered {
        Ok((status, output)) => {
            record.status = status;
            output
        }
        Err(err) => fail(record, &err, &ctx.request_line()),
    }
}

/// リクエストを取り込み、ハンドラを実行してレスポンステキストを返す
///
/// 外側には決して失敗を返さない。監査レコードは登録されたすべてのシンクに書き込まれる。
pub async fn submit(bridge: &Bridge, environment: &str, input: &[u8]) -> String {
    let started = Instant::now();
    let mut record = RequestRecord::begin(environment, input);

    let mut ctx = decode_identity(environment);
    record.apply_context(&ctx);
    debug!("Processing CGI request: {}", ctx.request_line());

    let output = match decode_body(&mut ctx, input, bridge.config()) {
        Ok(()) => match bridge.find_handler(&ctx.path, &ctx.method) {
            Some(handler) => dispatch(&ctx, handler, &mut record).await,
            None => {
                let err = Error::RouteNotFound(format!("{} {}", ctx.method, ctx.path));
                fail(&mut record, &err, &ctx.request_line())
            }
        },
        Err(err) => fail(&mut record, &err, &format!("request decoding: {}", ctx.request_line())),
    };

    conclude(bridge, record, started, &ctx, output).await
}

/// ハンドラを実行できない状態（起動失敗・入力の読み込み失敗）のリクエストを記録して応答する
///
/// 識別情報は環境変数の塊から復元し、通常の失敗と同じく監査レコードとエラーログに残す。
pub async fn reject(bridge: &Bridge, environment: &str, input: &[u8], err: &Error) -> String {
    let started = Instant::now();
    let mut record = RequestRecord::begin(environment, input);
    let ctx = decode_identity(environment);
    record.apply_context(&ctx);

    let output = fail(&mut record, err, &format!("startup: {}", ctx.request_line()));
    conclude(bridge, record, started, &ctx, output).await
}

/// レコードを確定し、エラーログと監査シンクへ書き出す
async fn conclude(
    bridge: &Bridge,
    mut record: RequestRecord,
    started: Instant,
    ctx: &RequestContext,
    output: String,
) -> String {
    record.finish(started.elapsed(), &output);

    if let (Some(path), Some(diagnostic)) = (&bridge.config().error_log_path, &record.error) {
        log_error_to_file(path, &format_failure(diagnostic, Some(ctx)));
    }

    for sink in bridge.audit_sinks() {
        if let Err(e) = sink.record(&record).await {
            error!("Failed to persist audit record {}: {}", record.id, e);
        }
    }

    info!(
        "{} {} -> {} ({} bytes, {:.1} ms)",
        record.method, record.url, record.status, record.size, record.duration_ms
    );
    output
}
