//! Escaped table and column names, looked up by string, by type, by
//! instance or by member path.

use crate::database::Database;
use crate::error::MappingError;
use crate::mapping::{MemberRef, Record, RecordType};
use crate::member_path;
use crate::query::MemberPath;

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

impl Database {
    /// `*` and qualified names pass through; anything else is escaped.
    pub fn column_name(&self, name: &str) -> Result<String, MappingError> {
        if is_blank(name) {
            return Err(MappingError::blank("column name"));
        }
        if name == "*" || name.contains('.') {
            return Ok(name.to_string());
        }
        Ok(self.provider().escape_identifier(name))
    }

    pub fn column_name_of<T: Record>(&self, name: &str) -> Result<String, MappingError> {
        self.column_name_of_type(RecordType::of::<T>(), name)
    }

    /// Resolves `name` as a column name of `ty`, then as a member name.
    pub fn column_name_of_type(&self, ty: RecordType, name: &str) -> Result<String, MappingError> {
        if is_blank(name) {
            return Err(MappingError::blank("column name"));
        }
        if name.contains('.') {
            return Ok(name.to_string());
        }
        let column = self.mapped_column(ty, name)?;
        self.column_name(&column)
    }

    pub fn column_name_for<T: Record>(
        &self,
        _entity: &T,
        name: &str,
    ) -> Result<String, MappingError> {
        self.column_name_of::<T>(name)
    }

    pub fn column_name_by(&self, path: impl MemberPath) -> Result<String, MappingError> {
        let member = member_path::resolve(&path.to_expr())?;
        self.column_name_of_type(member.declaring, member.name)
    }

    pub fn table_name(&self, name: &str) -> Result<String, MappingError> {
        if is_blank(name) {
            return Err(MappingError::blank("table name"));
        }
        Ok(self.provider().escape_table_name(name))
    }

    pub fn table_name_of<T: Record>(&self) -> Result<String, MappingError> {
        self.table_name_of_type(RecordType::of::<T>())
    }

    pub fn table_name_of_type(&self, ty: RecordType) -> Result<String, MappingError> {
        let data = self.poco_data_of(ty);
        self.table_name(&data.table_info.table_name)
    }

    pub fn table_name_for<T: Record>(&self, _entity: &T) -> Result<String, MappingError> {
        self.table_name_of::<T>()
    }

    /// Table of the type declaring the selected member.
    pub fn table_name_by(&self, path: impl MemberPath) -> Result<String, MappingError> {
        let member = member_path::resolve(&path.to_expr())?;
        self.table_name_of_type(member.declaring)
    }

    /// `table.column`; a qualified `column` is returned untouched.
    pub fn table_and_column_name(&self, table: &str, column: &str) -> Result<String, MappingError> {
        if is_blank(table) {
            return Err(MappingError::blank("table name"));
        }
        if is_blank(column) {
            return Err(MappingError::blank("column name"));
        }
        if column.contains('.') {
            return Ok(column.to_string());
        }
        Ok(format!("{}.{}", self.table_name(table)?, self.column_name(column)?))
    }

    /// `table.*` for `T`.
    pub fn table_and_column_name_of<T: Record>(&self) -> Result<String, MappingError> {
        let data = self.poco_data::<T>();
        self.table_and_column_name(&data.table_info.table_name, "*")
    }

    pub fn table_and_column_name_of_type(
        &self,
        ty: RecordType,
        column: &str,
    ) -> Result<String, MappingError> {
        if is_blank(column) {
            return Err(MappingError::blank("column name"));
        }
        if column.contains('.') {
            return Ok(column.to_string());
        }
        let resolved = self.mapped_column(ty, column)?;
        let data = self.poco_data_of(ty);
        self.table_and_column_name(&data.table_info.table_name, &resolved)
    }

    pub fn table_and_column_name_for<T: Record>(
        &self,
        _entity: &T,
        column: &str,
    ) -> Result<String, MappingError> {
        self.table_and_column_name_of_type(RecordType::of::<T>(), column)
    }

    pub fn table_and_column_name_by(&self, path: impl MemberPath) -> Result<String, MappingError> {
        let member = member_path::resolve(&path.to_expr())?;
        self.table_and_column_name_of_type(member.declaring, member.name)
    }

    /// Escaped column for a resolved member, optionally table-qualified.
    pub(crate) fn column_ref(
        &self,
        member: MemberRef,
        qualified: bool,
    ) -> Result<String, MappingError> {
        let data = self.poco_data_of(member.declaring);
        let column = data
            .column_for_member(member.name)
            .ok_or_else(|| MappingError::UnresolvedColumn {
                record: member.declaring.name(),
                column: member.name.to_string(),
            })?;
        if qualified {
            self.table_and_column_name(&data.table_info.table_name, &column.column_name)
        } else {
            self.column_name(&column.column_name)
        }
    }

    fn mapped_column(&self, ty: RecordType, name: &str) -> Result<String, MappingError> {
        let data = self.poco_data_of(ty);
        data.find_column(name)
            .map(|c| c.column_name.clone())
            .ok_or_else(|| MappingError::UnresolvedColumn {
                record: ty.name(),
                column: name.to_string(),
            })
    }
}
