use super::RecordType;

/// Table-level metadata for a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table_name: String,
    pub primary_key: Option<String>,
    pub auto_increment: bool,
    pub sequence_name: Option<String>,
}

impl TableInfo {
    /// Annotation-derived defaults: the table is named after the type unless
    /// `#[table(name = ...)]` says otherwise, and there is no primary key
    /// without `#[primary_key(...)]`.
    pub fn from_record(ty: RecordType) -> TableInfo {
        let decl = ty.declaration();
        let table_name = decl.table_name.unwrap_or(decl.type_name).to_string();
        match decl.primary_key {
            Some(pk) => TableInfo {
                table_name,
                primary_key: Some(pk.name.to_string()),
                auto_increment: pk.auto_increment,
                sequence_name: pk.sequence_name.map(str::to_string),
            },
            None => TableInfo {
                table_name,
                primary_key: None,
                auto_increment: false,
                sequence_name: None,
            },
        }
    }
}
