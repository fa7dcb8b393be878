use super::{MemberDecl, MemberRef, RecordType};

/// Resolved metadata for one mapped member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub column_name: String,
    /// Computed by the database: read, but never inserted or updated.
    pub result_column: bool,
    /// Naive timestamps read from this column are tagged as UTC.
    pub force_to_utc: bool,
    pub member: MemberRef,
}

impl ColumnInfo {
    /// Derives the descriptor for `member` from its annotations.
    ///
    /// With `#[explicit_columns]` on the type only members carrying a column
    /// annotation are mapped, whatever else they carry. Otherwise every member
    /// is mapped unless it is marked `#[ignore_column]`.
    pub fn from_member(ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo> {
        if ty.declaration().explicit_columns {
            member.column.as_ref()?;
        } else if member.ignore {
            return None;
        }

        let info = match &member.column {
            Some(attr) => ColumnInfo {
                column_name: attr.name.unwrap_or(member.name).to_string(),
                result_column: attr.result,
                force_to_utc: attr.force_to_utc,
                member: MemberRef::new(member.name, ty),
            },
            None => ColumnInfo {
                column_name: member.name.to_string(),
                result_column: false,
                force_to_utc: false,
                member: MemberRef::new(member.name, ty),
            },
        };
        Some(info)
    }

    pub fn is_writable(&self) -> bool {
        !self.result_column
    }
}
