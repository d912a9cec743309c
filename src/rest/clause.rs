//! フィルター句の文法
//!
//! `<列>=[not.]<演算子>.<オペランド>` 形式のクエリ変数を解釈する。
//! 演算子は比較（eq, neq, lt, gt, lte, gte）、パターン（like, ilike）、
//! `is`（true, false, null）、`in`（カンマ区切りのリスト）。

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;

static GRAMMAR: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn grammar() -> Result<&'static Regex, Error> {
    GRAMMAR
        .get_or_init(|| Regex::new(r"(?s)^(not\.)?(eq|neq|lte|gte|lt|gt|like|ilike|is|in)\.(.*)$"))
        .as_ref()
        .map_err(|e| Error::InternalServerError(format!("filter grammar failed to compile: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "<>",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Lte => "<=",
            Comparison::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Like,
    Ilike,
}

impl Pattern {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Pattern::Like => "LIKE",
            Pattern::Ilike => "ILIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsValue {
    True,
    False,
    Null,
}

impl IsValue {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsValue::True => "TRUE",
            IsValue::False => "FALSE",
            IsValue::Null => "NULL",
        }
    }
}

/// 句の述語部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare(Comparison, String),
    /// `*` を `%` に変換済みのパターン
    Match(Pattern, String),
    Is(IsValue),
    In(Vec<String>),
}

/// WHERE句でまとめて並べる演算子の系統
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Family {
    Comparison,
    Pattern,
    Is,
    In,
}

/// 1つのフィルター句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub column: String,
    pub negated: bool,
    pub predicate: Predicate,
}

impl FilterClause {
    /// クエリ変数を句として解釈する（文法に合わなければ `None`）
    pub fn parse(column: &str, value: &str) -> Result<Option<Self>, Error> {
        let Some(caps) = grammar()?.captures(value) else {
            return Ok(None);
        };
        let negated = caps.get(1).is_some();
        let operator = caps.get(2).map_or("", |m| m.as_str());
        let operand = caps.get(3).map_or("", |m| m.as_str());

        let predicate = match operator {
            "eq" => Predicate::Compare(Comparison::Eq, operand.to_string()),
            "neq" => Predicate::Compare(Comparison::Neq, operand.to_string()),
            "lt" => Predicate::Compare(Comparison::Lt, operand.to_string()),
            "gt" => Predicate::Compare(Comparison::Gt, operand.to_string()),
            "lte" => Predicate::Compare(Comparison::Lte, operand.to_string()),
            "gte" => Predicate::Compare(Comparison::Gte, operand.to_string()),
            "like" => Predicate::Match(Pattern::Like, operand.replace('*', "%")),
            "ilike" => Predicate::Match(Pattern::Ilike, operand.replace('*', "%")),
            "is" => match operand {
                "true" => Predicate::Is(IsValue::True),
                "false" => Predicate::Is(IsValue::False),
                "null" => Predicate::Is(IsValue::Null),
                _ => return Ok(None),
            },
            "in" => match parse_list(operand) {
                Some(items) => Predicate::In(items),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        Ok(Some(Self {
            column: column.to_string(),
            negated,
            predicate,
        }))
    }

    pub fn family(&self) -> Family {
        match self.predicate {
            Predicate::Compare(..) => Family::Comparison,
            Predicate::Match(..) => Family::Pattern,
            Predicate::Is(_) => Family::Is,
            Predicate::In(_) => Family::In,
        }
    }
}

/// `in` のオペランド（`a,b` または `(a,b)`）
fn parse_list(operand: &str) -> Option<Vec<String>> {
    let inner = operand
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(operand);
    if inner.is_empty() {
        return None;
    }
    Some(inner.split(',').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> Option<FilterClause> {
        FilterClause::parse("col", value).unwrap()
    }

    #[test]
    fn test_comparisons() {
        let clause = parse("eq.5").unwrap();
        assert!(!clause.negated);
        assert_eq!(clause.predicate, Predicate::Compare(Comparison::Eq, "5".to_string()));

        let clause = parse("not.gte.2020-01-01").unwrap();
        assert!(clause.negated);
        assert_eq!(clause.predicate, Predicate::Compare(Comparison::Gte, "2020-01-01".to_string()));

        // 値に含まれる `.` はそのまま
        assert_eq!(
            parse("lt.3.5").unwrap().predicate,
            Predicate::Compare(Comparison::Lt, "3.5".to_string())
        );
    }

    #[test]
    fn test_like_translates_glob() {
        let clause = parse("ilike.*smith*").unwrap();
        assert_eq!(clause.predicate, Predicate::Match(Pattern::Ilike, "%smith%".to_string()));
        assert_eq!(clause.family(), Family::Pattern);
    }

    #[test]
    fn test_is_values() {
        assert_eq!(parse("is.null").unwrap().predicate, Predicate::Is(IsValue::Null));
        assert!(parse("not.is.true").unwrap().negated);
        assert!(parse("is.maybe").is_none());
    }

    #[test]
    fn test_in_list() {
        assert_eq!(
            parse("in.1,2,3").unwrap().predicate,
            Predicate::In(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
        assert_eq!(
            parse("not.in.(a,b)").unwrap().predicate,
            Predicate::In(vec!["a".to_string(), "b".to_string()])
        );
        assert!(parse("in.").is_none());
    }

    #[test]
    fn test_malformed() {
        assert!(parse("notexist.5").is_none());
        assert!(parse("5").is_none());
        assert!(parse("not.5").is_none());
        assert!(parse("EQ.5").is_none());
        assert!(parse("").is_none());
    }
}
