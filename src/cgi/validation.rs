//! 出力ヘッダーの検証

/// ヘッダー名として使えるトークン文字か（RFC 7230 の tchar）
fn is_tchar(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// ヘッダー名が安全かどうか検証する（空でないトークン）
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_tchar)
}

/// ヘッダー値が安全かどうか検証する
/// 許可: HTAB(0x09), SP(0x20), 可視ASCII(0x21–0x7E)。CR/LFによるヘッダー注入を防ぐ。
pub fn is_valid_header_value(value: &str) -> bool {
    value
        .bytes()
        .all(|c| c == b'\t' || c == b' ' || (0x21..=0x7e).contains(&c))
}
