use crate::common::{Method, RequestContext, ResponseDocument};
use crate::error::Error;

use super::core::RouteHandler;

/// 任意のメソッドのハンドラーを作成
pub fn route<F>(method: Method, path: impl Into<String>, handler: F) -> RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    RouteHandler::new(method, path, handler)
}

/// 任意のメソッドのハンドラーを作成（パターンの検証付き）
pub fn try_route<F>(method: Method, path: impl Into<String>, handler: F) -> Result<RouteHandler<F>, Error>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    RouteHandler::try_new(method, path, handler)
}

/// GETハンドラーを作成
pub fn get<F>(path: impl Into<String>, handler: F) -> RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    route(Method::GET, path, handler)
}

/// GETハンドラーを作成（パターンの検証付き）
pub fn try_get<F>(path: impl Into<String>, handler: F) -> Result<RouteHandler<F>, Error>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    try_route(Method::GET, path, handler)
}

/// POSTハンドラーを作成
pub fn post<F>(path: impl Into<String>, handler: F) -> RouteHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    route(Method::POST, path, handler)
}

/// POSTハンドラーを作成（パターンの検証付き）
pub fn try_post<F>(path: impl Into<String>, handler: F) -> Result<RouteHandler<F>, Error>
where
    F: Fn(&RequestContext, &mut ResponseDocument) -> Result<u16, Error> + Send + Sync + 'static,
{
    try_route(Method::POST, path, handler)
}
