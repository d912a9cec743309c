//! カタログ（スキーマメタデータ）と実行のための抽象

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Error;
use super::sql::CompiledQuery;

/// スキーマ修飾付きのリレーション名
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelationName {
    pub schema: String,
    pub name: String,
}

impl RelationName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// パスセグメントを解釈する（`schema.name` 形式でなければ既定スキーマ）
    pub fn parse(segment: &str, default_schema: &str) -> Self {
        match segment.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => Self::new(schema, name),
            _ => Self::new(default_schema, segment),
        }
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// リレーションの列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// `format_type` による型名（例: `integer`, `character varying(20)`）
    pub sql_type: String,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// カタログから取得したリレーションの定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub name: RelationName,
    pub columns: Vec<Column>,
}

impl RelationInfo {
    pub fn new(name: RelationName, columns: Vec<Column>) -> Self {
        Self { name, columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// 単一列の主キーを取得する（複合主キー・主キーなしは未対応）
    pub fn primary_key(&self) -> Result<&Column, Error> {
        let mut keys = self.columns.iter().filter(|c| c.primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => Err(Error::Unsupported(format!("relation {} has no primary key", self.name))),
            (Some(_), Some(_)) => Err(Error::Unsupported(format!(
                "relation {} has a composite primary key",
                self.name
            ))),
        }
    }
}

/// カタログ参照とクエリ実行
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Database: Send + Sync {
    /// ユーザー定義のリレーション一覧
    async fn relations(&self) -> Result<Vec<RelationName>, Error>;

    /// リレーションの列定義（存在しなければ `None`）
    async fn describe(&self, relation: &RelationName) -> Result<Option<RelationInfo>, Error>;

    /// 1列1行のJSONを返すクエリを実行する（行がない・NULLなら `None`）
    async fn fetch_json(&self, query: &CompiledQuery) -> Result<Option<serde_json::Value>, Error>;
}
