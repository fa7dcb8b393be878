use anyhow::{anyhow, Result};
use indexmap::IndexMap;

use crate::query::{FromParam, SqlParam, ToParam};

/// One result row with columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: IndexMap<String, SqlParam>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlParam) {
        self.values.insert(column.into(), value);
    }

    pub fn with(mut self, column: impl Into<String>, value: impl ToParam) -> Self {
        self.push(column, value.to_param());
        self
    }

    /// Exact name first, then an ASCII case-insensitive match.
    pub fn get_param(&self, column: &str) -> Option<&SqlParam> {
        self.values.get(column).or_else(|| {
            self.values
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
        })
    }

    pub fn get<V: FromParam>(&self, column: &str) -> Result<V> {
        let value = self
            .get_param(column)
            .ok_or_else(|| anyhow!("column `{}` not present in row", column))?;
        V::from_param(value.clone()).map_err(|e| anyhow!("column `{}`: {}", column, e))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get_param(column).is_some()
    }

    pub fn first(&self) -> Option<&SqlParam> {
        self.values.get_index(0).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get_mut(&mut self, column: &str) -> Option<&mut SqlParam> {
        let idx = self.values.get_index_of(column).or_else(|| {
            self.values
                .keys()
                .position(|name| name.eq_ignore_ascii_case(column))
        })?;
        self.values.get_index_mut(idx).map(|(_, v)| v)
    }

    /// Re-tags a naive timestamp in `column` as UTC. Other values are left alone.
    pub fn normalize_utc(&mut self, column: &str) {
        if let Some(value) = self.get_mut(column) {
            if let SqlParam::DateTime(naive) = *value {
                *value = SqlParam::DateTimeUtc(naive.and_utc());
            }
        }
    }
}

impl<S: Into<String>> FromIterator<(S, SqlParam)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, SqlParam)>>(iter: I) -> Self {
        Row {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_back_to_case_insensitive() {
        let row = Row::new().with("FirstName", "Ada").with("id", 3);
        assert_eq!(row.get::<String>("firstname").unwrap(), "Ada");
        assert_eq!(row.get::<i64>("ID").unwrap(), 3);
        assert!(row.get::<i32>("missing").is_err());
        assert_eq!(row.first(), Some(&SqlParam::Text("Ada".into())));
    }

    #[test]
    fn normalize_utc_only_touches_naive_timestamps() {
        let naive = chrono::NaiveDate::from_ymd_opt(2021, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let mut row = Row::new().with("At", naive).with("Name", "x");
        row.normalize_utc("at");
        row.normalize_utc("Name");
        assert_eq!(row.get_param("At"), Some(&SqlParam::DateTimeUtc(naive.and_utc())));
        assert_eq!(row.get_param("Name"), Some(&SqlParam::Text("x".into())));
    }
}
