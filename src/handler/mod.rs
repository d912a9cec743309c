//! 正規表現パスで振り分ける関数ハンドラー

pub mod builders;
pub mod core;
pub mod pattern;

pub use self::builders::{get, post, route, try_get, try_post, try_route};
pub use self::core::RouteHandler;
