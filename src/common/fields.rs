//! 挿入順を保持する名前付き値の集合

use std::borrow::Cow;
use std::collections::HashMap;

/// 名前が一意な (名前, 値) の列
///
/// クエリ変数やヘッダーのように、出現順を保ったまま名前で引きたい集合に使う。
/// 名前の検索は索引で行う。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
    /// 正規化した名前から `entries` の位置
    index: HashMap<String, usize>,
    ignore_case: bool,
}

impl FieldMap {
    /// 名前の大文字小文字を区別するFieldMapを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 名前の大文字小文字を区別しないFieldMapを作成（HTTPヘッダー用）
    pub fn headers() -> Self {
        Self {
            ignore_case: true,
            ..Self::default()
        }
    }

    fn key<'n>(&self, name: &'n str) -> Cow<'n, str> {
        if self.ignore_case {
            Cow::Owned(name.to_ascii_lowercase())
        } else {
            Cow::Borrowed(name)
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(self.key(name).as_ref()).copied()
    }

    fn push(&mut self, name: String, value: String) {
        let key = self.key(&name).into_owned();
        self.index.insert(key, self.entries.len());
        self.entries.push((name, value));
    }

    /// 値を設定する（既存の値は上書き、位置は維持）
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.push(name, value),
        }
    }

    /// 未登録の場合のみ値を設定する（最初の出現を優先）
    /// 追加した場合はtrueを返す
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.position(&name).is_some() {
            return false;
        }
        self.push(name, value.into());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let i = self.position(name)?;
        let key = self.key(name).into_owned();
        self.index.remove(&key);
        for pos in self.index.values_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    /// 重複した名前は最初の出現が残る
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert_if_absent(k, v);
        }
        map
    }
}
