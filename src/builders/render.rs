use crate::database::Database;
use crate::error::MappingError;
use crate::member_path;
use crate::query::{CompareOp, Expr, SqlParam, SubqueryExpr};

/// Turns predicate trees into SQL text while collecting positional parameters.
pub(crate) struct SqlRender<'a> {
    db: &'a Database,
    params: Vec<SqlParam>,
}

impl<'a> SqlRender<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            params: Vec::new(),
        }
    }

    pub(crate) fn bind(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        self.db.provider().placeholder(self.params.len())
    }

    pub(crate) fn into_params(self) -> Vec<SqlParam> {
        self.params
    }

    /// Escaped column for a member-path leaf.
    pub(crate) fn column(&self, path: &Expr, qualified: bool) -> Result<String, MappingError> {
        let member = member_path::resolve(path)?;
        self.db.column_ref(member, qualified)
    }

    fn operand(&mut self, expr: &Expr) -> Result<String, MappingError> {
        match expr {
            Expr::Value(v) => Ok(self.bind(v.clone())),
            other => self.column(other, true),
        }
    }

    /// Several filters joined with `AND`.
    pub(crate) fn where_clause(
        &mut self,
        filters: &[Expr],
    ) -> Result<Option<String>, MappingError> {
        if filters.is_empty() {
            return Ok(None);
        }
        let parts = filters
            .iter()
            .map(|f| self.predicate(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(parts.join(" AND ")))
    }

    pub(crate) fn predicate(&mut self, expr: &Expr) -> Result<String, MappingError> {
        match expr {
            Expr::Compare { left, op, right } => {
                let column = self.operand(left)?;
                match (op, right.as_ref()) {
                    (CompareOp::Eq, Expr::Value(SqlParam::Null)) => {
                        Ok(format!("{} IS NULL", column))
                    }
                    (CompareOp::Ne, Expr::Value(SqlParam::Null)) => {
                        Ok(format!("{} IS NOT NULL", column))
                    }
                    _ => {
                        let rhs = self.operand(right)?;
                        Ok(format!("({} {} {})", column, op.to_sql(), rhs))
                    }
                }
            }
            Expr::IsNull { operand, negated } => {
                let column = self.column(operand, true)?;
                let not = if *negated { " NOT" } else { "" };
                Ok(format!("{} IS{} NULL", column, not))
            }
            Expr::InList { left, list } => {
                let column = self.column(left, true)?;
                if list.is_empty() {
                    return Ok("1=0".to_string());
                }
                let placeholders: Vec<String> = list.iter().map(|v| self.bind(v.clone())).collect();
                Ok(format!("{} IN ({})", column, placeholders.join(", ")))
            }
            Expr::InQuery { left, query } => {
                let column = self.column(left, true)?;
                let sub = self.subquery(query)?;
                Ok(format!("{} IN ({})", column, sub))
            }
            Expr::Match { left, kind, needle } => {
                let column = self.column(left, true)?;
                let ph = self.bind(SqlParam::Text(kind.pattern(needle)));
                Ok(format!("({} LIKE {})", column, ph))
            }
            Expr::And(l, r) => {
                let l = self.predicate(l)?;
                let r = self.predicate(r)?;
                Ok(format!("{} AND {}", l, r))
            }
            Expr::Or(l, r) => {
                let l = self.predicate(l)?;
                let r = self.predicate(r)?;
                Ok(format!("({} OR {})", l, r))
            }
            Expr::Not(inner) => Ok(format!("NOT ({})", self.predicate(inner)?)),
            Expr::Lambda(_)
            | Expr::Convert(_)
            | Expr::Member(_)
            | Expr::Nested { .. }
            | Expr::Value(_) => Err(MappingError::UnsupportedExpression(format!(
                "{} is not a predicate",
                expr.kind()
            ))),
        }
    }

    fn subquery(&mut self, query: &SubqueryExpr) -> Result<String, MappingError> {
        let projection = self.column(&query.projection, true)?;
        let table = self.db.table_name_of_type(query.record)?;
        let mut sql = format!("SELECT {} FROM {}", projection, table);
        if let Some(w) = self.where_clause(&query.filters)? {
            sql.push_str(" WHERE ");
            sql.push_str(&w);
        }
        Ok(sql)
    }
}
