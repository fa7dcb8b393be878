use crate::query::PlaceholderStyle;

/// Pieces of a SELECT statement, already escaped and parameterized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectParts {
    pub projection: String,
    pub from: String,
    pub where_clause: Option<String>,
    pub order_by: Vec<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// Dialect rules of one database engine.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn placeholder_style(&self) -> PlaceholderStyle;

    fn escape_identifier(&self, name: &str) -> String;

    /// Qualified names (`schema.table`) are left exactly as given.
    fn escape_table_name(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            self.escape_identifier(name)
        }
    }

    fn placeholder(&self, idx: usize) -> String {
        self.placeholder_style().placeholder(idx)
    }

    /// `LIMIT` / `OFFSET` paging unless the engine needs otherwise.
    fn build_select(&self, parts: &SelectParts) -> String {
        let mut sql = format!("SELECT {} FROM {}", parts.projection, parts.from);
        push_where_and_order(&mut sql, parts);
        if let Some(take) = parts.take {
            sql.push_str(&format!(" LIMIT {}", take));
        }
        if let Some(skip) = parts.skip {
            sql.push_str(&format!(" OFFSET {}", skip));
        }
        sql
    }

    /// Clause placed between the column list and `VALUES` to return the key.
    fn insert_output_clause(&self, _primary_key: &str) -> Option<String> {
        None
    }

    /// Clause appended after `VALUES (...)` to return the key.
    fn insert_returning_clause(&self, _primary_key: &str) -> Option<String> {
        None
    }

    /// Expression producing the next value of a sequence.
    fn sequence_value(&self, _sequence: &str) -> Option<String> {
        None
    }
}

fn push_where_and_order(sql: &mut String, parts: &SelectParts) {
    if let Some(w) = &parts.where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(w);
    }
    if !parts.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.order_by.join(", "));
    }
}

/// SQL Server through tiberius.
#[derive(Debug, Default, Clone, Copy)]
pub struct MssqlProvider;

impl Provider for MssqlProvider {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn build_select(&self, parts: &SelectParts) -> String {
        match (parts.skip, parts.take) {
            (None, Some(take)) => {
                let mut sql = format!(
                    "SELECT TOP({}) {} FROM {}",
                    take, parts.projection, parts.from
                );
                push_where_and_order(&mut sql, parts);
                sql
            }
            (None, None) => {
                let mut sql = format!("SELECT {} FROM {}", parts.projection, parts.from);
                push_where_and_order(&mut sql, parts);
                sql
            }
            (Some(skip), take) => {
                let mut sql = format!("SELECT {} FROM {}", parts.projection, parts.from);
                if parts.order_by.is_empty() {
                    if let Some(w) = &parts.where_clause {
                        sql.push_str(" WHERE ");
                        sql.push_str(w);
                    }
                    // OFFSET requires an ORDER BY
                    sql.push_str(" ORDER BY (SELECT NULL)");
                } else {
                    push_where_and_order(&mut sql, parts);
                }
                sql.push_str(&format!(" OFFSET {} ROWS", skip));
                if let Some(take) = take {
                    sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", take));
                }
                sql
            }
        }
    }

    fn insert_output_clause(&self, primary_key: &str) -> Option<String> {
        Some(format!("OUTPUT INSERTED.{}", self.escape_identifier(primary_key)))
    }

    fn sequence_value(&self, sequence: &str) -> Option<String> {
        Some(format!("NEXT VALUE FOR {}", sequence))
    }
}

/// PostgreSQL through tokio-postgres.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresProvider;

impl Provider for PostgresProvider {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn insert_returning_clause(&self, primary_key: &str) -> Option<String> {
        Some(format!("RETURNING {}", self.escape_identifier(primary_key)))
    }

    fn sequence_value(&self, sequence: &str) -> Option<String> {
        Some(format!("nextval('{}')", sequence.replace('\'', "''")))
    }
}
