//! SQLの組み立て
//!
//! 識別子はカタログで確認済みの列・リレーションからのみ作られ、二重引用符で囲まれる。
//! リテラルは必ず `$n` プレースホルダとしてパラメータ列に分離され、SQL本文には入らない。

use std::fmt;

use serde::Serialize;

use super::catalog::{Column, RelationInfo};
use super::clause::{FilterClause, Predicate};
use super::directive::{Direction, GroupKey};

/// 並べ替え順を集約へ引き継ぐための順位列
const ROW_NUMBER: &str = "\"__pgbridge_rn\"";

/// 引用済みの識別子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    fn quote(name: &str) -> Self {
        Ident(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    pub fn column(column: &Column) -> Self {
        Self::quote(&column.name)
    }

    /// `"schema"."name"`
    pub fn relation(info: &RelationInfo) -> Self {
        let schema = Self::quote(&info.name.schema);
        let name = Self::quote(&info.name.name);
        Ident(format!("{}.{}", schema.0, name.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 実行可能なクエリ（SQL本文とテキストパラメータ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// パラメータ番号を振りながらリテラルを積む
#[derive(Debug, Default)]
struct Params(Vec<String>);

impl Params {
    fn push(&mut self, value: impl Into<String>) -> String {
        self.0.push(value.into());
        format!("${}", self.0.len())
    }

    /// 列の型に合わせてキャストしたプレースホルダ
    fn typed(&mut self, value: impl Into<String>, column: &Column) -> String {
        let placeholder = self.push(value);
        format!("CAST({}::text AS {})", placeholder, column.sql_type)
    }
}

/// 主キーによる1行参照
pub fn compile_lookup(info: &RelationInfo, key_column: &Column, key: &str) -> CompiledQuery {
    let mut params = Params::default();
    let value = params.typed(key, key_column);
    CompiledQuery {
        sql: format!(
            "SELECT row_to_json(t) FROM {} AS t WHERE t.{} = {}",
            Ident::relation(info),
            Ident::column(key_column),
            value
        ),
        params: params.0,
    }
}

/// 一覧クエリのビルダー
///
/// WHERE句は演算子の系統順（比較、パターン、is、in）に並べ、系統内は追加順を保つ。
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    info: &'a RelationInfo,
    projection: Vec<Ident>,
    filters: Vec<(&'a Column, &'a FilterClause)>,
    group: Vec<String>,
    order: Vec<(Ident, Option<Direction>)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(info: &'a RelationInfo) -> Self {
        Self {
            info,
            projection: Vec::new(),
            filters: Vec::new(),
            group: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// 出力列を追加する（同じ列は一度だけ）
    pub fn select(&mut self, column: &Column) -> &mut Self {
        let ident = Ident::column(column);
        if !self.projection.contains(&ident) {
            self.projection.push(ident);
        }
        self
    }

    pub fn filter(&mut self, column: &'a Column, clause: &'a FilterClause) -> &mut Self {
        self.filters.push((column, clause));
        self
    }

    pub fn group_by_column(&mut self, column: &Column) -> &mut Self {
        self.group.push(Ident::column(column).0);
        self
    }

    pub fn group_by_position(&mut self, position: u32) -> &mut Self {
        self.group.push(position.to_string());
        self
    }

    pub fn order_by(&mut self, column: &Column, direction: Option<Direction>) -> &mut Self {
        self.order.push((Ident::column(column), direction));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    fn condition(params: &mut Params, column: &Column, clause: &FilterClause) -> String {
        let ident = Ident::column(column);
        let term = match &clause.predicate {
            Predicate::Compare(op, value) => {
                format!("{} {} {}", ident, op.as_sql(), params.typed(value.as_str(), column))
            }
            Predicate::Match(pattern, value) => {
                format!("{}::text {} {}", ident, pattern.as_sql(), params.push(value.as_str()))
            }
            Predicate::Is(value) => format!("{} IS {}", ident, value.as_sql()),
            Predicate::In(items) => {
                let placeholders: Vec<String> = items
                    .iter()
                    .map(|item| params.typed(item.as_str(), column))
                    .collect();
                format!("{} IN ({})", ident, placeholders.join(", "))
            }
        };
        if clause.negated {
            format!("NOT ({})", term)
        } else {
            format!("({})", term)
        }
    }

    /// 並べ替えの項（`"col" DESC` など）
    fn order_terms(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|(ident, direction)| match direction {
                Some(direction) => format!("{} {}", ident, direction.as_sql()),
                None => ident.to_string(),
            })
            .collect()
    }

    /// 集約時に取り出す列（`select` がなければリレーションの全列）
    fn output_columns(&self) -> Vec<Ident> {
        if self.projection.is_empty() {
            self.info.columns.iter().map(Ident::column).collect()
        } else {
            self.projection.clone()
        }
    }

    /// 行を選択するSQL（集約前）
    ///
    /// 並べ替えがある場合は順位列を追加し、集約時の順序に使う。
    fn build_select(&self, params: &mut Params) -> String {
        let mut projection = if self.projection.is_empty() {
            "*".to_string()
        } else {
            self.projection.iter().map(Ident::as_str).collect::<Vec<_>>().join(", ")
        };
        let order_terms = self.order_terms();
        if !order_terms.is_empty() {
            projection.push_str(&format!(
                ", row_number() OVER (ORDER BY {}) AS {}",
                order_terms.join(", "),
                ROW_NUMBER
            ));
        }
        let mut sql = format!("SELECT {} FROM {}", projection, Ident::relation(self.info));

        let mut filters = self.filters.clone();
        filters.sort_by_key(|(_, clause)| clause.family());
        let conditions: Vec<String> = filters
            .iter()
            .map(|(column, clause)| Self::condition(params, column, clause))
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group.join(", "));
        }

        if !order_terms.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT CAST({}::text AS bigint)", params.push(limit.to_string())));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET CAST({}::text AS bigint)", params.push(offset.to_string())));
        }
        sql
    }

    /// 結果の行をJSON配列に集約するクエリ（0行なら `[]`）
    ///
    /// 並べ替えがある場合は順位列で `json_agg` の順序を指定し、順位列は出力から除く。
    pub fn build(&self) -> CompiledQuery {
        let mut params = Params::default();
        let inner = self.build_select(&mut params);
        let sql = if self.order.is_empty() {
            format!("SELECT coalesce(json_agg(row_to_json(q)), '[]'::json) FROM ({}) AS q", inner)
        } else {
            let columns: Vec<String> = self
                .output_columns()
                .iter()
                .map(|ident| format!("q.{}", ident))
                .collect();
            format!(
                "SELECT coalesce(json_agg(row_to_json(r) ORDER BY q.{}), '[]'::json) FROM ({}) AS q, \
                 LATERAL (SELECT {}) AS r",
                ROW_NUMBER,
                inner,
                columns.join(", ")
            )
        };
        CompiledQuery {
            sql,
            params: params.0,
        }
    }
}
