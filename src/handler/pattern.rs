use log::warn;
use regex::Regex;

use crate::error::Error;

/// パターンの前後に `^` と `$` を付ける
pub fn anchor_pattern(pattern: &str) -> String {
    if pattern.starts_with('^') && pattern.ends_with('$') && pattern.len() > 1 {
        return pattern.to_string();
    }
    let anchored = format!("^{}$", pattern.trim_start_matches('^').trim_end_matches('$'));
    if !pattern.is_empty() {
        warn!("Pattern '{}' lacks proper anchors, converted to '{}'", pattern, anchored);
    }
    anchored
}

/// パターンの安全性を確保（空パターンの拒否、アンカーの追加、コンパイル確認）
pub fn ensure_safe_pattern(pattern: &str) -> Result<String, Error> {
    if pattern.is_empty() {
        return Err(Error::ConfigurationError("Empty regex pattern is not allowed".to_string()));
    }
    let anchored = anchor_pattern(pattern);
    Regex::new(&anchored)
        .map_err(|e| Error::ConfigurationError(format!("Invalid route pattern '{}': {}", pattern, e)))?;
    Ok(anchored)
}
