//! バイト列の区切り処理（multipart解析用）

use std::ops::Range;

use memchr::memmem;

/// バッファを区切り文字で分割し、各区間の範囲を返す
///
/// 区切り文字が見つからない場合は全体を1区間として返す。末尾の空区間も保持する。
/// 空の区切り文字では分割しない。
pub fn split(buffer: &[u8], delimiter: &[u8]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    if !delimiter.is_empty() {
        for pos in memmem::find_iter(buffer, delimiter) {
            ranges.push(start..pos);
            start = pos + delimiter.len();
        }
    }
    ranges.push(start..buffer.len());
    ranges
}

/// 1始まりの `index` 番目の区間を返す（範囲外ならNone）
pub fn part<'a>(buffer: &'a [u8], delimiter: &[u8], index: usize) -> Option<&'a [u8]> {
    if index == 0 {
        return None;
    }
    split(buffer, delimiter)
        .into_iter()
        .nth(index - 1)
        .map(|range| &buffer[range])
}

/// 最初の区切り文字で2分割する
pub fn split_once<'a>(buffer: &'a [u8], delimiter: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    if delimiter.is_empty() {
        return None;
    }
    memmem::find(buffer, delimiter).map(|pos| (&buffer[..pos], &buffer[pos + delimiter.len()..]))
}
