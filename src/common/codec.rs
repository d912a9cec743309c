//! URLエンコード・デコード

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet};

/// エスケープ対象の予約文字（`%` と空白を含む）
const RESERVED: &AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'!')
    .add(b'*')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b';')
    .add(b':')
    .add(b'@')
    .add(b'&')
    .add(b'=')
    .add(b'+')
    .add(b'$')
    .add(b',')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']');

/// URLデコード
///
/// `+` を空白に置き換えた後、`%XX` をバイトに戻してUTF-8として解釈する。
/// 不正なエスケープはそのまま残す。
pub fn decode(input: &str) -> String {
    let plus_replaced = input.replace('+', " ");
    percent_decode_str(&plus_replaced)
        .decode_utf8_lossy()
        .into_owned()
}

/// パスセグメントのデコード（`+` はそのまま残す）
pub fn decode_segment(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// URLエンコード
///
/// 予約文字を `%XX` に、空白を `+` に置き換える。非ASCII文字はUTF-8のバイト列としてエスケープされる。
pub fn encode(input: &str) -> String {
    utf8_percent_encode(input, RESERVED)
        .to_string()
        .replace("%20", "+")
}
