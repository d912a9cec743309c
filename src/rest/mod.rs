//! クエリ文字列からリレーションへの問い合わせを組み立てるRESTハンドラ
//!
//! - `GET /` ユーザー定義のリレーション一覧
//! - `GET /<relation>` 一覧（`select`, `group`, `order`, `limit`, `offset` と任意のフィルター句）
//! - `GET /<relation>/<key>` 主キーによる1行参照
//!
//! 検証エラーはJSONの400として返し、それ以外の失敗は `Error` としてディスパッチャに任せる。

pub mod catalog;
pub mod clause;
pub mod directive;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use crate::common::codec;
use crate::common::{Handler, Method, RequestContext, ResponseDocument};
use crate::config::Config;
use crate::error::Error;

pub use self::catalog::{Column, Database, RelationInfo, RelationName};
pub use self::clause::FilterClause;
pub use self::sql::{compile_lookup, CompiledQuery, Ident, QueryBuilder};

use self::directive::{
    is_reserved, order_field, parse_count, parse_group_token, parse_order_token, split_list, GroupKey,
};

const PATH_PATTERN: &str = "^/.*$";

/// RESTハンドラの応答（ステータスとJSON本文）
type Reply = (u16, Value);

fn bad_request(body: Value) -> Reply {
    (400, body)
}

/// クエリ文字列で指示された一覧の内容
struct ListingRequest<'q> {
    filters: Vec<FilterClause>,
    select: Vec<&'q str>,
    group: Vec<GroupKey>,
    order: Vec<&'q str>,
    limit: Option<u64>,
    offset: Option<u64>,
}

/// PostgreSQLのリレーションをREST APIとして公開するハンドラ
pub struct RestHandler {
    db: Arc<dyn Database>,
    default_schema: String,
    max_limit: Option<u64>,
    lookup_miss_not_found: bool,
}

impl RestHandler {
    pub fn new(db: Arc<dyn Database>, config: &Config) -> Self {
        Self {
            db,
            default_schema: config.default_schema.clone(),
            max_limit: config.max_limit,
            lookup_miss_not_found: config.lookup_miss_not_found,
        }
    }

    /// パスに応じて処理を振り分ける
    pub async fn respond(&self, ctx: &RequestContext, res: &mut ResponseDocument) -> Result<Reply, Error> {
        let segments = &ctx.segments;
        if segments.is_empty() {
            let relations = self.db.relations().await?;
            return Ok((200, serde_json::to_value(relations)?));
        }
        if segments.len() > 2 {
            return Ok(bad_request(json!({"error": "unknown relation", "relation": segments.join("/")})));
        }

        let segment = codec::decode_segment(&segments[0]);
        let name = RelationName::parse(&segment, &self.default_schema);
        let Some(info) = self.db.describe(&name).await? else {
            return Ok(bad_request(json!({"error": "unknown relation", "relation": segment})));
        };

        match segments.get(1) {
            Some(key) => self.lookup(&info, &codec::decode_segment(key), res).await,
            None => self.listing(&info, ctx, res).await,
        }
    }

    async fn lookup(&self, info: &RelationInfo, key: &str, res: &mut ResponseDocument) -> Result<Reply, Error> {
        let key_column = info.primary_key()?;
        let query = compile_lookup(info, key_column, key);
        res.set_debug(json!({ "query": &query }));
        debug!("lookup on {}: {}", info.name, query.sql);

        match self.db.fetch_json(&query).await? {
            Some(row) => Ok((200, row)),
            None if self.lookup_miss_not_found => Ok((
                404,
                json!({"error": "not found", "relation": info.name.to_string(), "key": key}),
            )),
            None => Ok((200, Value::Null)),
        }
    }

    /// クエリ変数を検証して一覧の指示に変換する
    ///
    /// 検証は「未知の列」「並べ替えの書式」「句の文法」「ページング」の順で行い、
    /// 最初に失敗したものだけを返す。
    fn validate<'q>(&self, info: &RelationInfo, ctx: &'q RequestContext) -> Result<Result<ListingRequest<'q>, Value>, Error> {
        let query = &ctx.query;
        let select = query.get("select").map(split_list).unwrap_or_default();
        let group: Vec<GroupKey> = query
            .get("group")
            .map(split_list)
            .unwrap_or_default()
            .into_iter()
            .map(parse_group_token)
            .collect();
        let order = query.get("order").map(split_list).unwrap_or_default();

        // 参照される列名（出現順、重複なし）
        let mut referenced: Vec<&str> = Vec::new();
        let filter_names = query.iter().map(|(name, _)| name).filter(|name| !is_reserved(name));
        let group_names = group.iter().filter_map(|key| match key {
            GroupKey::Column(name) => Some(name.as_str()),
            GroupKey::Position(_) => None,
        });
        let order_names = order.iter().copied().map(order_field);
        for name in filter_names
            .chain(select.iter().copied())
            .chain(group_names)
            .chain(order_names)
        {
            if !referenced.contains(&name) {
                referenced.push(name);
            }
        }
        let unknown: Vec<&str> = referenced
            .into_iter()
            .filter(|name| info.column(name).is_none())
            .collect();
        if !unknown.is_empty() {
            return Ok(Err(json!({"error": "unknown columns", "columns": unknown})));
        }

        let malformed_order: Vec<&str> = order
            .iter()
            .copied()
            .filter(|token| parse_order_token(token).is_none())
            .collect();
        if !malformed_order.is_empty() {
            return Ok(Err(json!({"error": "malformed order_sql", "order": malformed_order})));
        }

        let mut filters = Vec::new();
        let mut malformed_clauses = Vec::new();
        for (name, value) in query.iter().filter(|(name, _)| !is_reserved(name)) {
            match FilterClause::parse(name, value)? {
                Some(clause) => filters.push(clause),
                None => malformed_clauses.push(format!("{}={}", name, value)),
            }
        }
        if !malformed_clauses.is_empty() {
            return Ok(Err(json!({"error": "malformed clauses", "clauses": malformed_clauses})));
        }

        let mut malformed_pagination = Vec::new();
        let mut counts = [None, None];
        for (slot, name) in counts.iter_mut().zip(["limit", "offset"]) {
            if let Some(value) = query.get(name) {
                match parse_count(value) {
                    Some(count) => *slot = Some(count),
                    None => malformed_pagination.push(format!("{}={}", name, value)),
                }
            }
        }
        if !malformed_pagination.is_empty() {
            return Ok(Err(json!({"error": "malformed pagination", "pagination": malformed_pagination})));
        }
        let [limit, offset] = counts;
        let limit = match (limit, self.max_limit) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (None, Some(max)) => Some(max),
            (limit, None) => limit,
        };

        Ok(Ok(ListingRequest {
            filters,
            select,
            group,
            order,
            limit,
            offset,
        }))
    }

    async fn listing(&self, info: &RelationInfo, ctx: &RequestContext, res: &mut ResponseDocument) -> Result<Reply, Error> {
        let request = match self.validate(info, ctx)? {
            Ok(request) => request,
            Err(body) => return Ok(bad_request(body)),
        };

        let query = compile_listing(info, &request)?;
        res.set_debug(json!({ "query": &query }));
        debug!("listing on {}: {}", info.name, query.sql);

        let rows = self.db.fetch_json(&query).await?.unwrap_or_else(|| json!([]));
        Ok((200, rows))
    }
}

fn known_column<'i>(info: &'i RelationInfo, name: &str) -> Result<&'i Column, Error> {
    info.column(name)
        .ok_or_else(|| Error::InternalServerError(format!("column {} vanished after validation", name)))
}

/// 検証済みの指示から一覧クエリを組み立てる
fn compile_listing(info: &RelationInfo, request: &ListingRequest<'_>) -> Result<CompiledQuery, Error> {
    let mut builder = QueryBuilder::new(info);
    for name in request.select.iter().copied() {
        builder.select(known_column(info, name)?);
    }
    for clause in &request.filters {
        builder.filter(known_column(info, clause.column.as_str())?, clause);
    }
    for key in &request.group {
        match key {
            GroupKey::Column(name) => builder.group_by_column(known_column(info, name.as_str())?),
            GroupKey::Position(position) => builder.group_by_position(*position),
        };
    }
    for token in request.order.iter().copied() {
        if let Some(term) = parse_order_token(token) {
            builder.order_by(known_column(info, term.field.as_str())?, term.direction);
        }
    }
    if let Some(limit) = request.limit {
        builder.limit(limit);
    }
    if let Some(offset) = request.offset {
        builder.offset(offset);
    }
    Ok(builder.build())
}

#[async_trait]
impl Handler for RestHandler {
    fn matches(&self, _path: &str, method: &Method) -> bool {
        *method == Method::GET
    }

    fn path_pattern(&self) -> &str {
        PATH_PATTERN
    }

    async fn handle(&self, ctx: &RequestContext, res: &mut ResponseDocument) -> Result<u16, Error> {
        let (status, body) = self.respond(ctx, res).await?;
        res.set_header("Content-Type", "application/json");
        res.append_json(&body)?;
        Ok(status)
    }
}
