//! CGI環境でのエントリポイント
//!
//! プロセス環境変数と標準入力を取り込み、RESTハンドラで処理したレスポンスを標準出力に書き出す。

use std::env;
use std::sync::Arc;

use env_logger::Env;
use log::{error, info, warn};
use pgbridge::cgi::request::{read_stdin_body, serialize_environment};
use pgbridge::cgi::{write_output, FileAuditSink};
use pgbridge::postgres::{PgAuditSink, PgDatabase};
use pgbridge::rest::RestHandler;
use pgbridge::{Bridge, BridgeBuilder, Config, Error};

/// データベースに依存しない監査シンクだけを登録したビルダー
fn base_builder(config: &Config) -> BridgeBuilder {
    let mut builder = Bridge::builder();
    if let Some(path) = &config.audit_log_path {
        builder = builder.audit_sink(Arc::new(FileAuditSink::new(path.clone())));
    }
    builder
}

async fn connect(config: &Config) -> Result<PgDatabase, Error> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| Error::ConfigurationError("PGBRIDGE_DATABASE_URL is not set".to_string()))?;
    PgDatabase::connect(url).await
}

async fn serve(config: Config, environment: &str) -> String {
    let content_length = env::var("CONTENT_LENGTH").ok();
    let input = match read_stdin_body(content_length.as_deref(), config.max_body_size) {
        Ok(input) => input,
        Err(e) => {
            error!("Failed to read request body: {}", e);
            let bridge = base_builder(&config).config(config).build();
            return bridge.reject(environment, b"", &e).await;
        }
    };

    let db = match connect(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to start pgbridge: {}", e);
            let bridge = base_builder(&config).config(config).build();
            return bridge.reject(environment, &input, &e).await;
        }
    };

    let mut builder = base_builder(&config).handler(RestHandler::new(Arc::new(db.clone()), &config));
    if config.audit_table {
        match PgAuditSink::connect_and_migrate(db.pool().clone()).await {
            Ok(sink) => builder = builder.audit_sink(Arc::new(sink)),
            Err(e) => warn!("Audit table disabled: {}", e),
        }
    }
    builder.config(config).build().submit(environment, &input).await
}

#[tokio::main]
async fn main() {
    // CGIでは標準出力がHTTPレスポンスとなるため、ログは標準エラー出力に出力する
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting pgbridge CGI application");

    let config = Config::from_env();
    let environment = serialize_environment(
        env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    );

    let output = serve(config, &environment).await;

    if let Err(e) = write_output(&output) {
        error!("Error writing CGI response: {}", e);
        std::process::exit(1);
    }
}
