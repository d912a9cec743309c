//! 予約されたクエリ変数（select, group, order, limit, offset）の解釈

/// フィルターとして扱わない予約名
pub const RESERVED: [&str; 5] = ["select", "group", "order", "limit", "offset"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// カンマ区切りのリスト（前後の空白を除き、空要素は捨てる）
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// `field` または `field.asc` / `field.desc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Option<Direction>,
}

/// 並べ替えトークンの列名部分（最初の `.` より前）
pub fn order_field(token: &str) -> &str {
    token.split_once('.').map_or(token, |(field, _)| field)
}

/// 並べ替えトークンを解釈する（不正なら `None`）
pub fn parse_order_token(token: &str) -> Option<OrderTerm> {
    let (field, direction) = match token.split_once('.') {
        None => (token, None),
        Some((field, "asc")) => (field, Some(Direction::Asc)),
        Some((field, "desc")) => (field, Some(Direction::Desc)),
        Some(_) => return None,
    };
    if field.is_empty() {
        return None;
    }
    Some(OrderTerm {
        field: field.to_string(),
        direction,
    })
}

/// GROUP BY の要素（数値は出力列の位置）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Column(String),
    Position(u32),
}

pub fn parse_group_token(token: &str) -> GroupKey {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(position) = token.parse() {
            return GroupKey::Position(position);
        }
    }
    GroupKey::Column(token.to_string())
}

/// limit / offset の値（非負整数のみ）
pub fn parse_count(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
