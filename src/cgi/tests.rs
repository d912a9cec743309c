//! CGIモジュールのテスト

use std::io::{Read, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::common::{Method, RequestContext, ResponseDocument};
use crate::config::Config;
use crate::error::Error;
use crate::handler::get;
use super::audit::{AuditSink, FileAuditSink, MemoryAuditSink, RequestRecord};
use super::core::dispatch;
use super::decoder::{decode, decode_body, decode_identity, parse_query_string};
use super::error_logging::{
    format_failure, gather_request_context, is_sensitive_key_like, log_error_to_file, redact_query_string,
    redact_value_for_log,
};
use super::request::{header_name_from_env, parse_environment, read_request_body, serialize_environment};
use super::response::{error_output, finalize, status_line};
use super::validation::{is_valid_header_name, is_valid_header_value};

fn env_blob(vars: &[(&str, &str)]) -> String {
    serialize_environment(vars.iter().copied())
}

#[test]
fn test_parse_query_string() {
    let params = parse_query_string("name=John&age=30&city=Tokyo&name=Jane");

    assert_eq!(params.get("name"), Some("John"));
    assert_eq!(params.get("age"), Some("30"));
    assert_eq!(params.get("city"), Some("Tokyo"));
    assert_eq!(params.len(), 3);
}

#[test]
fn test_parse_query_string_url_encoding() {
    let query = "name=%E3%81%82%E3%81%84%E3%81%86%E3%81%88%E3%81%8A&city=Tokyo+Station&lang=ja%2Den&flag";
    let params = parse_query_string(query);

    assert_eq!(params.get("name"), Some("あいうえお"));
    assert_eq!(params.get("city"), Some("Tokyo Station"));
    assert_eq!(params.get("lang"), Some("ja-en"));
    assert_eq!(params.get("flag"), Some(""));
}

#[test]
fn test_parse_environment_skips_first_line() {
    let blob = "REQUEST_METHOD=POST\nREQUEST_URI=/x\n  HTTP_HOST=example.com  \nnot a variable\n=empty\nQUERY_STRING=a=b";
    let entries = parse_environment(blob);

    assert_eq!(
        entries,
        vec![
            ("REQUEST_URI".to_string(), "/x".to_string()),
            ("HTTP_HOST".to_string(), "example.com".to_string()),
            ("QUERY_STRING".to_string(), "a=b".to_string()),
        ]
    );
}

#[test]
fn test_serialize_environment_keeps_first_line_of_values() {
    let blob = env_blob(&[("A", "1"), ("B", "two\nlines")]);
    assert_eq!(blob, "# pgbridge environment\nA=1\nB=two");
    assert_eq!(parse_environment(&blob).len(), 2);
}

#[test]
fn test_header_name_from_env() {
    assert_eq!(header_name_from_env("HTTP_X_AUTH_TOKEN").as_deref(), Some("X-Auth-Token"));
    assert_eq!(header_name_from_env("HTTP_USER_AGENT").as_deref(), Some("User-Agent"));
    assert_eq!(header_name_from_env("CONTENT_LENGTH"), None);
}

#[test]
fn test_decode_get_request() {
    let blob = env_blob(&[
        ("REQUEST_METHOD", "GET"),
        ("REQUEST_URI", "/people/?age=gte.18&name=A%20B"),
        ("HTTP_USER_AGENT", "curl/8.0"),
        ("HTTP_REFERER", "https://example.com/"),
        ("HTTP_X_FORWARDED_FOR", "203.0.113.7, 10.0.0.1"),
        ("REMOTE_ADDR", "10.0.0.1"),
        ("REMOTE_USER", "alice"),
    ]);
    let ctx = decode(&blob, b"", &Config::default()).unwrap();

    assert_eq!(ctx.method, Method::GET);
    assert_eq!(ctx.url, "/people/?age=gte.18&name=A%20B");
    assert_eq!(ctx.path, "/people/");
    assert_eq!(ctx.segments, vec!["people"]);
    assert_eq!(ctx.query_string, "age=gte.18&name=A%20B");
    assert_eq!(ctx.query_var("age"), Some("gte.18"));
    assert_eq!(ctx.query_var("name"), Some("A B"));
    assert_eq!(ctx.agent.as_deref(), Some("curl/8.0"));
    assert_eq!(ctx.referrer.as_deref(), Some("https://example.com/"));
    assert_eq!(ctx.ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(ctx.username.as_deref(), Some("alice"));
    assert_eq!(ctx.header("x-forwarded-for"), Some("203.0.113.7, 10.0.0.1"));
    assert_eq!(ctx.env("REMOTE_ADDR"), Some("10.0.0.1"));
}

#[test]
fn test_decode_defaults() {
    let ctx = decode("banner only", b"", &Config::default()).unwrap();

    assert_eq!(ctx.method, Method::GET);
    assert_eq!(ctx.url, "/");
    assert!(ctx.segments.is_empty());
    assert!(ctx.query.is_empty());
    assert_eq!(ctx.ip, None);
}

#[test]
fn test_decode_identity_fallbacks() {
    let blob = env_blob(&[("HTTP_X_REMOTE_USER", "bob"), ("REMOTE_USER", "alice"), ("REMOTE_ADDR", "192.0.2.1")]);
    let ctx = decode(&blob, b"", &Config::default()).unwrap();

    assert_eq!(ctx.username.as_deref(), Some("bob"));
    assert_eq!(ctx.ip.as_deref(), Some("192.0.2.1"));
}

#[test]
fn test_decode_keeps_unknown_method() {
    let blob = env_blob(&[("REQUEST_METHOD", "PROPFIND"), ("REQUEST_URI", "/dav")]);
    let ctx = decode(&blob, b"", &Config::default()).unwrap();

    assert_eq!(ctx.method, Method::Other("PROPFIND".to_string()));
    assert_eq!(ctx.request_line(), "PROPFIND /dav");
}

#[test]
fn test_identity_survives_body_failure() {
    let blob = env_blob(&[
        ("REQUEST_METHOD", "POST"),
        ("REQUEST_URI", "/items?x=1"),
        ("REMOTE_ADDR", "203.0.113.9"),
        ("HTTP_USER_AGENT", "client/1"),
    ]);
    let mut ctx = decode_identity(&blob);
    let err = decode_body(&mut ctx, b"0123456789", &Config::default().with_max_body_size(4)).unwrap_err();

    assert_eq!(err.status_code(), 413);
    assert_eq!(ctx.method, Method::POST);
    assert_eq!(ctx.url, "/items?x=1");
    assert_eq!(ctx.query_var("x"), Some("1"));
    assert_eq!(ctx.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(ctx.agent.as_deref(), Some("client/1"));
}

#[test]
fn test_decode_urlencoded_post_does_not_override_url_query() {
    let blob = env_blob(&[
        ("REQUEST_METHOD", "POST"),
        ("REQUEST_URI", "/form?name=url"),
        ("CONTENT_TYPE", "application/x-www-form-urlencoded; charset=UTF-8"),
    ]);
    let ctx = decode(&blob, b"  name=body&city=Osaka+Kita\r\n", &Config::default()).unwrap();

    assert_eq!(ctx.query_var("name"), Some("url"));
    assert_eq!(ctx.query_var("city"), Some("Osaka Kita"));
}

#[test]
fn test_decode_multipart_post() {
    let body = concat!(
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "hello\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n",
        "\r\n",
        "greeting\r\n",
        "--XyZ--\r\n",
    );
    let blob = env_blob(&[
        ("REQUEST_METHOD", "POST"),
        ("REQUEST_URI", "/upload"),
        ("CONTENT_TYPE", "multipart/form-data; boundary=XyZ"),
    ]);
    let ctx = decode(&blob, body.as_bytes(), &Config::default()).unwrap();

    assert_eq!(ctx.files.len(), 1);
    let file = ctx.file("f").unwrap();
    assert_eq!(file.filename, "a.txt");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(&file.content[..], b"hello");
    assert_eq!(ctx.form_fields.get("title"), Some("greeting"));
    assert!(ctx.query.is_empty());
}

#[test]
fn test_decode_gzip_body() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"q=compressed").unwrap();
    let compressed = encoder.finish().unwrap();

    let blob = env_blob(&[
        ("REQUEST_METHOD", "POST"),
        ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
        ("HTTP_CONTENT_ENCODING", "gzip"),
    ]);
    let ctx = decode(&blob, &compressed, &Config::default()).unwrap();
    assert_eq!(ctx.query_var("q"), Some("compressed"));

    match decode(&blob, b"not gzip", &Config::default()) {
        Err(Error::InvalidRequest(_)) => {}
        other => panic!("Expected InvalidRequest, got {:?}", other.map(|c| c.url)),
    }
}

#[test]
fn test_decode_payload_too_large() {
    let blob = env_blob(&[("REQUEST_METHOD", "POST")]);
    let config = Config::default().with_max_body_size(4);

    let err = decode(&blob, b"12345", &config).unwrap_err();
    assert_eq!(err.status_code(), 413);
    assert!(decode(&blob, b"1234", &config).is_ok());
}

#[test]
fn test_read_request_body_respects_limits() {
    let input = b"abcdefghij".to_vec();

    assert_eq!(read_request_body(&input[..], Some("4"), 100).unwrap(), b"abcd");
    assert_eq!(read_request_body(&input[..], Some("10"), 3).unwrap(), b"abcd");
    assert!(read_request_body(&input[..], None, 100).unwrap().is_empty());
    assert!(read_request_body(&input[..], Some("junk"), 100).unwrap().is_empty());
}

#[test]
fn test_is_valid_header_name() {
    assert!(is_valid_header_name("Content-Type"));
    assert!(is_valid_header_name("X-Custom_Header.v2"));
    assert!(is_valid_header_name("Accept"));

    assert!(!is_valid_header_name(""));
    assert!(!is_valid_header_name("Content\rType"));
    assert!(!is_valid_header_name("Content\nType"));
    assert!(!is_valid_header_name("Content Type"));
    assert!(!is_valid_header_name("Content:Type"));
}

#[test]
fn test_is_valid_header_value() {
    assert!(is_valid_header_value("text/html"));
    assert!(is_valid_header_value("application/json; charset=utf-8"));
    assert!(is_valid_header_value(""));
    assert!(is_valid_header_value("value\twith\ttab"));

    // CRLFによるヘッダー注入
    assert!(!is_valid_header_value("text/html\r\nSet-Cookie: malicious"));
    assert!(!is_valid_header_value("text/html\nX-Evil: attack"));
    assert!(!is_valid_header_value("value\x00with\x01control"));
}

#[test]
fn test_status_line() {
    assert_eq!(status_line(200), "Status: 200 OK");
    assert_eq!(status_line(403), "Status: 403 Permission Denied");
    assert_eq!(status_line(302), "Status: 302 Moved Temporarily");
    assert_eq!(status_line(418), "Status: 418");
}

#[test]
fn test_finalize_defaults() {
    let mut doc = ResponseDocument::new();
    doc.set_header("Connection", "keep-alive");
    let output = finalize(204, &doc).unwrap();

    assert_eq!(output, "Status: 204\r\nConnection: close\r\nContent-Type: text/plain\r\n\r\n204");
}

#[test]
fn test_finalize_keeps_handler_content_type_and_fragment_order() {
    let mut doc = ResponseDocument::new();
    doc.append("<p>");
    doc.append("hi");
    doc.append("</p>");
    doc.set_header("Content-Type", "text/html");
    doc.set_header("content-type", "text/html; charset=utf-8");
    let output = finalize(200, &doc).unwrap();

    assert_eq!(
        output,
        "Status: 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n<p>hi</p>"
    );
}

#[test]
fn test_finalize_rejects_unsafe_headers() {
    let mut doc = ResponseDocument::new();
    doc.set_header("X-Evil", "a\r\nSet-Cookie: b");
    assert!(matches!(finalize(200, &doc), Err(Error::InvalidHeader(_))));

    let mut doc = ResponseDocument::new();
    doc.set_header("Status", "200 OK");
    assert!(matches!(finalize(200, &doc), Err(Error::InvalidHeader(_))));
}

#[test]
fn test_error_output_is_minimal_html() {
    let output = error_output(400, "bad <input>");

    assert!(output.starts_with("Status: 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n"));
    assert!(output.contains("<p>bad &lt;input&gt;</p>"));
}

#[tokio::test]
async fn test_dispatch_success_records_status_and_debug() {
    let handler = get("/ok", |_ctx: &RequestContext, res: &mut ResponseDocument| {
        res.append("fine");
        res.set_debug(serde_json::json!({"step": 1}));
        Ok(201)
    });
    let ctx = RequestContext::new(Method::GET, "/ok");
    let mut record = RequestRecord::begin("", b"");

    let output = dispatch(&ctx, &handler, &mut record).await;

    assert!(output.starts_with("Status: 201\r\n"));
    assert!(output.ends_with("\r\n\r\nfine"));
    assert_eq!(record.status, 201);
    assert_eq!(record.debug, Some(serde_json::json!({"step": 1})));
    assert!(record.error.is_none());
}

#[tokio::test]
async fn test_dispatch_replaces_output_on_error() {
    let handler = get("/fail", |_ctx: &RequestContext, res: &mut ResponseDocument| {
        res.append("partial secret output");
        res.set_header("X-Partial", "yes");
        Err(Error::InvalidRequest("bad input".to_string()))
    });
    let ctx = RequestContext::new(Method::GET, "/fail");
    let mut record = RequestRecord::begin("", b"");

    let output = dispatch(&ctx, &handler, &mut record).await;

    assert!(output.starts_with("Status: 400 Bad Request\r\n"));
    assert!(output.contains("Content-Type: text/html"));
    assert!(!output.contains("partial secret output"));
    assert!(!output.contains("X-Partial"));
    let diagnostic = record.error.unwrap();
    assert_eq!(diagnostic.code, "invalid_request");
    assert_eq!(diagnostic.message, "bad input");
    assert_eq!(diagnostic.context, "GET /fail");
}

#[tokio::test]
async fn test_dispatch_catches_panics() {
    let handler = get("/divide", |ctx: &RequestContext, res: &mut ResponseDocument| {
        res.append("before the fault");
        let divisor: i32 = ctx.query_var("by").and_then(|v| v.parse().ok()).unwrap_or(0);
        res.append(format!("{}", 10 / divisor));
        Ok(200)
    });
    let ctx = RequestContext::new(Method::GET, "/divide");
    let mut record = RequestRecord::begin("", b"");

    let output = dispatch(&ctx, &handler, &mut record).await;

    assert!(output.starts_with("Status: 500 Internal Server Error\r\n"));
    assert!(!output.contains("before the fault"));
    assert_eq!(record.status, 500);
    let diagnostic = record.error.unwrap();
    assert_eq!(diagnostic.code, "handler_panic");
    assert!(diagnostic.message.contains("divide by zero"));
}

#[tokio::test]
async fn test_memory_audit_sink() {
    let sink = MemoryAuditSink::new();
    let mut record = RequestRecord::begin("# banner\nA=1", b"body");
    record.status = 200;
    sink.record(&record).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].input, b"body");
}

#[tokio::test]
async fn test_file_audit_sink_writes_json_lines() {
    let path = std::env::temp_dir().join(format!("pgbridge_audit_{}.jsonl", uuid::Uuid::new_v4()));
    let sink = FileAuditSink::new(&path);

    let mut first = RequestRecord::begin("# banner", b"\x00\x01binary");
    let ctx = RequestContext::new(Method::POST, "/upload?x=1");
    first.apply_context(&ctx);
    first.finish(std::time::Duration::from_millis(5), "Status: 200 OK\r\n\r\nok");
    sink.record(&first).await.unwrap();
    sink.record(&RequestRecord::begin("", b"")).await.unwrap();

    let mut content = String::new();
    std::fs::File::open(&path).unwrap().read_to_string(&mut content).unwrap();
    let _ = std::fs::remove_file(&path);

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["method"], "POST");
    assert_eq!(value["url"], "/upload?x=1");
    assert_eq!(value["input"], base64::encode(b"\x00\x01binary"));
    assert_eq!(value["size"], "Status: 200 OK\r\n\r\nok".len());
    assert_eq!(value["duration_ms"], 5.0);
}

#[test]
fn test_redact_value_for_log() {
    assert_eq!(redact_value_for_log("CONTENT_TYPE", "application/json"), "application/json");
    assert_eq!(redact_value_for_log("Host", "example.com"), "example.com");

    assert_eq!(redact_value_for_log("Authorization", "Bearer token123"), "***redacted***");
    assert_eq!(redact_value_for_log("Cookie", "session=abc123"), "***redacted***");
    assert_eq!(redact_value_for_log("X-Api-Key", "secret-key"), "***redacted***");

    assert_eq!(
        redact_value_for_log("QUERY_STRING", "name=john&token=secret123"),
        "name=john&token=***redacted***"
    );

    let long_value = "a".repeat(250);
    let result = redact_value_for_log("User-Agent", &long_value);
    assert!(result.ends_with("...[truncated]"));
    assert_eq!(result.len(), 200 + "...[truncated]".len());
}

#[test]
fn test_is_sensitive_key_like() {
    assert!(is_sensitive_key_like("authorization"));
    assert!(is_sensitive_key_like("cookie"));
    assert!(is_sensitive_key_like("access_token"));
    assert!(is_sensitive_key_like("password"));
    assert!(is_sensitive_key_like("x-api-key"));
    assert!(is_sensitive_key_like("session"));

    assert!(!is_sensitive_key_like("content_type"));
    assert!(!is_sensitive_key_like("host"));
    assert!(!is_sensitive_key_like("user-agent"));
    assert!(!is_sensitive_key_like("accept"));
}

#[test]
fn test_redact_query_string() {
    assert_eq!(redact_query_string(""), "");
    assert_eq!(redact_query_string("name=john&age=30"), "name=john&age=30");
    assert_eq!(
        redact_query_string("token=abc&password=123&name=john"),
        "token=***redacted***&password=***redacted***&name=john"
    );
    assert_eq!(redact_query_string("token&name=john"), "token=***redacted***&name=john");
}

#[test]
fn test_gather_request_context() {
    let mut ctx = RequestContext::new(Method::GET, "/people?token=abc&age=eq.1")
        .with_header("Authorization", "Bearer xyz")
        .with_header("Host", "example.com");
    ctx.environment.insert("REMOTE_ADDR".to_string(), "127.0.0.1".to_string());

    let context = gather_request_context(&ctx);

    assert!(context.contains("REQUEST_METHOD=GET"));
    assert!(context.contains("PATH=/people"));
    assert!(context.contains("QUERY_STRING=token=***redacted***&age=eq.1"));
    assert!(context.contains("REMOTE_ADDR=127.0.0.1"));
    assert!(context.contains("Authorization=***redacted***"));
    assert!(context.contains("Host=example.com"));
    assert!(!context.contains("Bearer xyz"));

    let bare = gather_request_context(&RequestContext::new(Method::GET, "/"));
    assert!(bare.contains("(none)"));
}

#[test]
fn test_log_error_to_file() {
    let path = std::env::temp_dir().join(format!("pgbridge_error_{}.log", uuid::Uuid::new_v4()));
    let diagnostic = Error::HandlerPanic("boom".to_string()).diagnostic("GET /x");

    log_error_to_file(&path, &format_failure(&diagnostic, None));

    let content = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert!(content.contains("PGBRIDGE CGI ERROR"));
    assert!(content.contains("Timestamp (UTC):"));
    assert!(content.contains("Process ID:"));
    assert!(content.contains("code: handler_panic"));
    assert!(content.contains("message: boom"));
    assert!(content.contains("context: GET /x"));
}
