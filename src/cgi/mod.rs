//! CGI環境での実行をサポートするモジュール
//!
//! 環境変数の塊と入力バイト列からリクエストを構築し、
//! HTTPレスポンスフォーマットのテキストを返すための機能を提供します。

pub mod audit;
pub mod core;
pub mod decoder;
pub mod error_logging;
pub mod multipart;
pub mod request;
pub mod response;
pub mod validation;

pub use self::audit::{AuditSink, FileAuditSink, MemoryAuditSink, RequestRecord};
pub use self::core::{dispatch, reject, submit};
pub use self::decoder::{decode, decode_body, decode_identity};
pub use self::response::{error_output, finalize, write_output};

#[cfg(test)]
mod tests;
