//! Single-member resolution for selector trees.
//!
//! Only `x => x.Member` and `x => convert(x.Member)` are accepted. Column,
//! table and predicate-leaf lookups all bottom out here.

use crate::error::MappingError;
use crate::mapping::MemberRef;
use crate::query::Expr;

pub fn resolve(tree: &Expr) -> Result<MemberRef, MappingError> {
    let body = match tree {
        Expr::Lambda(body) => body.as_ref(),
        other => other,
    };
    let body = match body {
        Expr::Convert(inner) => inner.as_ref(),
        other => other,
    };
    match body {
        Expr::Member(member) => Ok(*member),
        Expr::Lambda(_)
        | Expr::Convert(_)
        | Expr::Nested { .. }
        | Expr::Value(_)
        | Expr::Compare { .. }
        | Expr::IsNull { .. }
        | Expr::InList { .. }
        | Expr::InQuery { .. }
        | Expr::Match { .. }
        | Expr::And(..)
        | Expr::Or(..)
        | Expr::Not(_) => Err(MappingError::UnsupportedExpression(format!(
            "expected a single member access, found {} in `{}`",
            body.kind(),
            tree
        ))),
    }
}

pub fn resolve_name(tree: &Expr) -> Result<&'static str, MappingError> {
    resolve(tree).map(|m| m.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MemberDecl, PocoData, Record, RecordType, TypeDecl};
    use crate::query::{SqlParam, ToParam};
    use crate::row::Row;

    struct Sample;

    static PROBE: TypeDecl = TypeDecl {
        type_name: "Sample",
        module_path: "rpoco::member_path::tests",
        table_name: None,
        primary_key: None,
        explicit_columns: false,
        members: &[MemberDecl::plain("Name")],
    };

    impl Record for Sample {
        fn declaration() -> &'static TypeDecl {
            &PROBE
        }
        fn from_row(_: &Row, _: &PocoData) -> anyhow::Result<Self> {
            Ok(Sample)
        }
        fn member_value(&self, _: &str) -> Option<SqlParam> {
            None
        }
        fn set_member(&mut self, _: &str, _: SqlParam) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn name() -> Expr {
        Expr::Member(MemberRef::new("Name", RecordType::of::<Sample>()))
    }

    #[test]
    fn unwraps_lambda_and_one_conversion() {
        assert_eq!(resolve_name(&Expr::lambda(name())).unwrap(), "Name");
        assert_eq!(
            resolve_name(&Expr::lambda(Expr::convert(name()))).unwrap(),
            "Name"
        );
        assert_eq!(resolve(&name()).unwrap().declaring, RecordType::of::<Sample>());
    }

    #[test]
    fn rejects_other_shapes() {
        let nested = Expr::lambda(Expr::Nested {
            parent: Box::new(name()),
            member: "Length",
        });
        let double = Expr::lambda(Expr::convert(Expr::convert(name())));
        let constant = Expr::lambda(Expr::Value(5i32.to_param()));
        for tree in [nested, double, constant] {
            assert!(matches!(
                resolve(&tree),
                Err(MappingError::UnsupportedExpression(_))
            ));
        }
    }
}
