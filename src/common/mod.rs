//! 共通の抽象化レイヤーとトレイト定義

pub mod codec;
pub mod context;
pub mod fields;
pub mod http;
pub mod split;
pub mod traits;

pub use context::{RequestContext, UploadedFile};
pub use fields::FieldMap;
pub use http::{reason_phrase, Method, ResponseDocument, StatusCode};
pub use traits::Handler;
