use std::fmt;
use std::marker::PhantomData;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::mapping::{MemberRef, Record, RecordType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStyle {
    AtP,
    Dollar,
}

impl PlaceholderStyle {
    /// Placeholder text for the 1-based parameter position `idx`.
    pub fn placeholder(self, idx: usize) -> String {
        match self {
            PlaceholderStyle::AtP => format!("@P{}", idx),
            PlaceholderStyle::Dollar => format!("${}", idx),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
    Text(String),
    Uuid(uuid::Uuid),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Bytes(Vec<u8>),
    Null,
}

impl SqlParam {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlParam::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            SqlParam::I32(_) => "i32",
            SqlParam::I64(_) => "i64",
            SqlParam::F64(_) => "f64",
            SqlParam::Bool(_) => "bool",
            SqlParam::Text(_) => "text",
            SqlParam::Uuid(_) => "uuid",
            SqlParam::Decimal(_) => "decimal",
            SqlParam::DateTime(_) => "datetime",
            SqlParam::DateTimeUtc(_) => "datetime (utc)",
            SqlParam::Bytes(_) => "bytes",
            SqlParam::Null => "null",
        }
    }
}

pub trait ToParam {
    fn to_param(self) -> SqlParam;
}

impl ToParam for i32 {
    fn to_param(self) -> SqlParam {
        SqlParam::I32(self)
    }
}
impl ToParam for i64 {
    fn to_param(self) -> SqlParam {
        SqlParam::I64(self)
    }
}
impl ToParam for f64 {
    fn to_param(self) -> SqlParam {
        SqlParam::F64(self)
    }
}
impl ToParam for bool {
    fn to_param(self) -> SqlParam {
        SqlParam::Bool(self)
    }
}
impl ToParam for String {
    fn to_param(self) -> SqlParam {
        SqlParam::Text(self)
    }
}
impl<'a> ToParam for &'a str {
    fn to_param(self) -> SqlParam {
        SqlParam::Text(self.to_string())
    }
}
impl ToParam for uuid::Uuid {
    fn to_param(self) -> SqlParam {
        SqlParam::Uuid(self)
    }
}
impl ToParam for Decimal {
    fn to_param(self) -> SqlParam {
        SqlParam::Decimal(self)
    }
}
impl ToParam for NaiveDateTime {
    fn to_param(self) -> SqlParam {
        SqlParam::DateTime(self)
    }
}
impl ToParam for DateTime<Utc> {
    fn to_param(self) -> SqlParam {
        SqlParam::DateTimeUtc(self)
    }
}
impl ToParam for Vec<u8> {
    fn to_param(self) -> SqlParam {
        SqlParam::Bytes(self)
    }
}
impl ToParam for SqlParam {
    fn to_param(self) -> SqlParam {
        self
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(self) -> SqlParam {
        match self {
            Some(v) => v.to_param(),
            None => SqlParam::Null,
        }
    }
}

/// Conversion from a database value back into a record field.
pub trait FromParam: Sized {
    fn from_param(value: SqlParam) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &SqlParam) -> Result<T> {
    bail!("cannot read a {} value as {}", value.kind(), expected)
}

impl FromParam for i32 {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::I32(v) => Ok(v),
            SqlParam::I64(v) => Ok(i32::try_from(v)?),
            other => mismatch("i32", &other),
        }
    }
}

impl FromParam for i64 {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::I32(v) => Ok(v.into()),
            SqlParam::I64(v) => Ok(v),
            SqlParam::Decimal(d) => d
                .to_i64()
                .ok_or_else(|| anyhow!("decimal {} does not fit in i64", d)),
            other => mismatch("i64", &other),
        }
    }
}

impl FromParam for f64 {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::F64(v) => Ok(v),
            SqlParam::I32(v) => Ok(v.into()),
            SqlParam::Decimal(d) => d
                .to_f64()
                .ok_or_else(|| anyhow!("decimal {} does not fit in f64", d)),
            other => mismatch("f64", &other),
        }
    }
}

impl FromParam for bool {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Bool(v) => Ok(v),
            SqlParam::I32(v) => Ok(v != 0),
            other => mismatch("bool", &other),
        }
    }
}

impl FromParam for String {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Text(v) => Ok(v),
            other => mismatch("String", &other),
        }
    }
}

impl FromParam for uuid::Uuid {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Uuid(v) => Ok(v),
            SqlParam::Text(s) => Ok(uuid::Uuid::parse_str(&s)?),
            other => mismatch("Uuid", &other),
        }
    }
}

impl FromParam for Decimal {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Decimal(v) => Ok(v),
            SqlParam::I32(v) => Ok(v.into()),
            SqlParam::I64(v) => Ok(v.into()),
            SqlParam::F64(v) => Ok(Decimal::try_from(v)?),
            other => mismatch("Decimal", &other),
        }
    }
}

impl FromParam for NaiveDateTime {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::DateTime(v) => Ok(v),
            SqlParam::DateTimeUtc(v) => Ok(v.naive_utc()),
            other => mismatch("NaiveDateTime", &other),
        }
    }
}

// Naive timestamps are only accepted once the column has been time-normalized.
impl FromParam for DateTime<Utc> {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::DateTimeUtc(v) => Ok(v),
            SqlParam::DateTime(_) => {
                bail!("naive timestamp read into DateTime<Utc>; mark the column `force_utc`")
            }
            other => mismatch("DateTime<Utc>", &other),
        }
    }
}

impl FromParam for Vec<u8> {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Bytes(v) => Ok(v),
            other => mismatch("bytes", &other),
        }
    }
}

impl FromParam for SqlParam {
    fn from_param(value: SqlParam) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(value: SqlParam) -> Result<Self> {
        match value {
            SqlParam::Null => Ok(None),
            other => T::from_param(other).map(Some),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchKind {
    /// Wraps `needle` in the `%` wildcards for this kind of match.
    pub fn pattern(self, needle: &str) -> String {
        match self {
            MatchKind::Contains => format!("%{}%", needle),
            MatchKind::StartsWith => format!("{}%", needle),
            MatchKind::EndsWith => format!("%{}", needle),
        }
    }
}

/// Closed expression tree used for selectors and predicates.
///
/// `Lambda`, `Convert`, `Member` and `Nested` form member-path trees; the
/// remaining variants are predicate nodes whose leaves are member paths or
/// bound values.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lambda(Box<Expr>),
    Convert(Box<Expr>),
    Member(MemberRef),
    Nested {
        parent: Box<Expr>,
        member: &'static str,
    },
    Value(SqlParam),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
    InList {
        left: Box<Expr>,
        list: Vec<SqlParam>,
    },
    InQuery {
        left: Box<Expr>,
        query: Box<SubqueryExpr>,
    },
    Match {
        left: Box<Expr>,
        kind: MatchKind,
        needle: String,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn member(member: MemberRef) -> Expr {
        Expr::Member(member)
    }

    pub fn value(value: impl ToParam) -> Expr {
        Expr::Value(value.to_param())
    }

    pub fn lambda(body: Expr) -> Expr {
        Expr::Lambda(Box::new(body))
    }

    pub fn convert(inner: Expr) -> Expr {
        Expr::Convert(Box::new(inner))
    }

    /// Short node name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Lambda(_) => "lambda",
            Expr::Convert(_) => "conversion",
            Expr::Member(_) => "member access",
            Expr::Nested { .. } => "nested member access",
            Expr::Value(_) => "constant",
            Expr::Compare { .. } => "comparison",
            Expr::IsNull { .. } => "null test",
            Expr::InList { .. } => "membership",
            Expr::InQuery { .. } => "subquery membership",
            Expr::Match { .. } => "string match",
            Expr::And(..) => "conjunction",
            Expr::Or(..) => "disjunction",
            Expr::Not(_) => "negation",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lambda(body) => write!(f, "x => {}", body),
            Expr::Convert(inner) => write!(f, "convert({})", inner),
            Expr::Member(m) => write!(f, "x.{}", m.name),
            Expr::Nested { parent, member } => write!(f, "{}.{}", parent, member),
            Expr::Value(v) => write!(f, "{:?}", v),
            other => f.write_str(other.kind()),
        }
    }
}

/// Untyped `column IN (SELECT ...)` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct SubqueryExpr {
    pub record: RecordType,
    pub projection: Expr,
    pub filters: Vec<Expr>,
}

/// Anything that names a single member: a typed field, a selector or a raw tree.
pub trait MemberPath {
    fn to_expr(&self) -> Expr;
}

impl MemberPath for Expr {
    fn to_expr(&self) -> Expr {
        self.clone()
    }
}

impl<P: MemberPath + ?Sized> MemberPath for &P {
    fn to_expr(&self) -> Expr {
        (**self).to_expr()
    }
}

/// Typed handle to a member of record `T` holding a `V`.
///
/// The derive emits one per struct field as an associated constant.
pub struct Field<T, V> {
    name: &'static str,
    _marker: PhantomData<fn(&T) -> V>,
}

impl<T, V> Field<T, V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.name)
    }
}

impl<T: Record, V> Field<T, V> {
    pub fn member_ref(&self) -> MemberRef {
        MemberRef::new(self.name, RecordType::of::<T>())
    }

    fn leaf(&self) -> Box<Expr> {
        Box::new(Expr::Member(self.member_ref()))
    }

    fn compare(self, op: CompareOp, value: impl ToParam) -> Predicate<T> {
        Predicate::from_expr(Expr::Compare {
            left: self.leaf(),
            op,
            right: Box::new(Expr::value(value)),
        })
    }

    pub fn eq(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Eq, value)
    }
    pub fn ne(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Ne, value)
    }
    pub fn gt(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Gt, value)
    }
    pub fn ge(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Ge, value)
    }
    pub fn lt(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Lt, value)
    }
    pub fn le(self, value: impl ToParam) -> Predicate<T> {
        self.compare(CompareOp::Le, value)
    }

    /// Compares against another member, possibly of a different record.
    pub fn eq_member(self, other: impl MemberPath) -> Predicate<T> {
        Predicate::from_expr(Expr::Compare {
            left: self.leaf(),
            op: CompareOp::Eq,
            right: Box::new(other.to_expr()),
        })
    }

    pub fn is_null(self) -> Predicate<T> {
        Predicate::from_expr(Expr::IsNull {
            operand: self.leaf(),
            negated: false,
        })
    }

    pub fn is_not_null(self) -> Predicate<T> {
        Predicate::from_expr(Expr::IsNull {
            operand: self.leaf(),
            negated: true,
        })
    }

    pub fn in_list<I, P>(self, values: I) -> Predicate<T>
    where
        I: IntoIterator<Item = P>,
        P: ToParam,
    {
        Predicate::from_expr(Expr::InList {
            left: self.leaf(),
            list: values.into_iter().map(ToParam::to_param).collect(),
        })
    }

    pub fn in_query<U: Record>(self, query: Subquery<U>) -> Predicate<T> {
        Predicate::from_expr(Expr::InQuery {
            left: self.leaf(),
            query: Box::new(query.inner),
        })
    }

    fn matching(self, kind: MatchKind, needle: &str) -> Predicate<T> {
        Predicate::from_expr(Expr::Match {
            left: self.leaf(),
            kind,
            needle: needle.to_string(),
        })
    }

    pub fn contains(self, needle: &str) -> Predicate<T> {
        self.matching(MatchKind::Contains, needle)
    }
    pub fn starts_with(self, needle: &str) -> Predicate<T> {
        self.matching(MatchKind::StartsWith, needle)
    }
    pub fn ends_with(self, needle: &str) -> Predicate<T> {
        self.matching(MatchKind::EndsWith, needle)
    }

    /// `x => (object) x.Field`: the member wrapped in a single conversion.
    pub fn cast(self) -> Selector<T> {
        Selector::from_expr(Expr::lambda(Expr::Convert(self.leaf())))
    }

    /// `x => x.Field.member`: a nested access, which is never a column.
    pub fn path(self, member: &'static str) -> Selector<T> {
        Selector::from_expr(Expr::lambda(Expr::Nested {
            parent: self.leaf(),
            member,
        }))
    }
}

impl<T: Record, V> MemberPath for Field<T, V> {
    fn to_expr(&self) -> Expr {
        Expr::lambda(Expr::Member(self.member_ref()))
    }
}

/// A selector tree over record `T`, rooted at a lambda node.
pub struct Selector<T> {
    expr: Expr,
    _t: PhantomData<fn() -> T>,
}

impl<T> Selector<T> {
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _t: PhantomData,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.expr)
    }
}

impl<T> MemberPath for Selector<T> {
    fn to_expr(&self) -> Expr {
        self.expr.clone()
    }
}

impl<T: Record, V> From<Field<T, V>> for Selector<T> {
    fn from(field: Field<T, V>) -> Self {
        Selector::from_expr(field.to_expr())
    }
}

/// A boolean predicate over record `T`.
pub struct Predicate<T> {
    expr: Expr,
    _t: PhantomData<fn() -> T>,
}

impl<T> Predicate<T> {
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _t: PhantomData,
        }
    }

    pub fn and(self, rhs: Predicate<T>) -> Predicate<T> {
        Predicate::from_expr(Expr::And(Box::new(self.expr), Box::new(rhs.expr)))
    }

    pub fn or(self, rhs: Predicate<T>) -> Predicate<T> {
        Predicate::from_expr(Expr::Or(Box::new(self.expr), Box::new(rhs.expr)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate<T> {
        Predicate::from_expr(Expr::Not(Box::new(self.expr)))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({:?})", self.expr)
    }
}

/// `SELECT <member> FROM <U> WHERE ...`, usable as the right side of `in_query`.
pub struct Subquery<U> {
    inner: SubqueryExpr,
    _u: PhantomData<fn() -> U>,
}

impl<U: Record> Subquery<U> {
    pub fn select(member: impl MemberPath) -> Self {
        Self {
            inner: SubqueryExpr {
                record: RecordType::of::<U>(),
                projection: member.to_expr(),
                filters: Vec::new(),
            },
            _u: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate<U>) -> Self {
        self.inner.filters.push(predicate.into_expr());
        self
    }
}
