// SPDX-License-Identifier: PMPL-1.0-or-later
//! SQL AST node types.
//!
//! Nodes are produced fresh by each compilation pass and never share
//! structure with the plan they were compiled from.

use serde::{Deserialize, Serialize};

/// A literal value appearing in generated SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlLiteral {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Exact numeric kept in its textual form.
    Decimal(String),
    Double(f64),
    String(String),
}

/// Operators that can appear in a call node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Times,
    Divide,
    Negate,
    IsNull,
    IsNotNull,
    Like,
    /// Operands alternate `WHEN`/`THEN`; an odd trailing operand is the `ELSE`.
    Case,
    /// `CAST(x AS <type>)`.
    Cast(String),
    /// A plain scalar function call such as `ISNULL(x)`.
    Function(String),
    /// An aggregate function; no operands renders as `NAME(*)`.
    Aggregate { name: String, distinct: bool },
}

impl SqlOperator {
    /// Binding strength used to decide where parentheses are required.
    pub fn precedence(&self) -> u8 {
        match self {
            SqlOperator::Or => 1,
            SqlOperator::And => 2,
            SqlOperator::Not => 3,
            SqlOperator::Eq
            | SqlOperator::NotEq
            | SqlOperator::Lt
            | SqlOperator::LtEq
            | SqlOperator::Gt
            | SqlOperator::GtEq
            | SqlOperator::IsNull
            | SqlOperator::IsNotNull
            | SqlOperator::Like => 4,
            SqlOperator::Plus | SqlOperator::Minus => 5,
            SqlOperator::Times | SqlOperator::Divide => 6,
            SqlOperator::Negate => 7,
            SqlOperator::Case
            | SqlOperator::Cast(_)
            | SqlOperator::Function(_)
            | SqlOperator::Aggregate { .. } => u8::MAX,
        }
    }

    /// Infix symbol for binary operators.
    pub fn infix_symbol(&self) -> Option<&'static str> {
        Some(match self {
            SqlOperator::Eq => "=",
            SqlOperator::NotEq => "<>",
            SqlOperator::Lt => "<",
            SqlOperator::LtEq => "<=",
            SqlOperator::Gt => ">",
            SqlOperator::GtEq => ">=",
            SqlOperator::And => "AND",
            SqlOperator::Or => "OR",
            SqlOperator::Plus => "+",
            SqlOperator::Minus => "-",
            SqlOperator::Times => "*",
            SqlOperator::Divide => "/",
            SqlOperator::Like => "LIKE",
            _ => return None,
        })
    }
}

/// Set operators, including the `ALL` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::IntersectAll => "INTERSECT ALL",
            SetOperator::Except => "EXCEPT",
            SetOperator::ExceptAll => "EXCEPT ALL",
        }
    }
}

/// SQL join keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// Explicit `NULLS FIRST` / `NULLS LAST` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

/// One key of an `ORDER BY` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: SqlNode,
    pub descending: bool,
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn new(expr: SqlNode, descending: bool, nulls: Option<NullsOrder>) -> Self {
        Self {
            expr,
            descending,
            nulls,
        }
    }
}

/// A `SELECT` with every slot optional.
///
/// `projection: None` means `SELECT *`. `group_by: Some(vec![])` is an
/// explicit empty grouping and renders as `GROUP BY ()`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Select {
    pub projection: Option<Vec<SqlNode>>,
    pub from: Option<SqlNode>,
    pub selection: Option<SqlNode>,
    pub group_by: Option<Vec<SqlNode>>,
    pub having: Option<SqlNode>,
    pub order_by: Option<Vec<OrderByItem>>,
}

impl Select {
    /// `SELECT * FROM <from>`.
    pub fn star_from(from: SqlNode) -> Self {
        Self {
            from: Some(from),
            ..Self::default()
        }
    }

    /// A `SELECT` with a select list and no `FROM`.
    pub fn values(projection: Vec<SqlNode>) -> Self {
        Self {
            projection: Some(projection),
            ..Self::default()
        }
    }
}

/// A join between two `FROM` items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub left: SqlNode,
    pub kind: JoinKind,
    pub right: SqlNode,
    pub condition: Option<SqlNode>,
}

/// A SQL AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlNode {
    /// Possibly qualified name, e.g. `["emp", "deptno"]`.
    Identifier(Vec<String>),
    Literal(SqlLiteral),
    Call {
        operator: SqlOperator,
        operands: Vec<SqlNode>,
    },
    /// `<expr> AS <alias>`, used in select lists and for derived tables.
    Alias { expr: Box<SqlNode>, alias: String },
    Select(Box<Select>),
    /// N-ary set operation over `SELECT` inputs.
    SetOp {
        operator: SetOperator,
        inputs: Vec<SqlNode>,
    },
    Join(Box<Join>),
}

impl SqlNode {
    pub fn identifier<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SqlNode::Identifier(parts.into_iter().map(Into::into).collect())
    }

    pub fn call(operator: SqlOperator, operands: Vec<SqlNode>) -> Self {
        SqlNode::Call { operator, operands }
    }

    pub fn alias(expr: SqlNode, alias: impl Into<String>) -> Self {
        SqlNode::Alias {
            expr: Box::new(expr),
            alias: alias.into(),
        }
    }

    pub fn select(select: Select) -> Self {
        SqlNode::Select(Box::new(select))
    }

    /// Left-deep conjunction; `None` for an empty input.
    pub fn and_all(conjuncts: impl IntoIterator<Item = SqlNode>) -> Option<SqlNode> {
        conjuncts.into_iter().reduce(|acc, next| {
            SqlNode::call(SqlOperator::And, vec![acc, next])
        })
    }

    /// The name this node would be known by in a select list, if any.
    ///
    /// An identifier is known by its last part and an aliased node by its
    /// alias. Anything else has no implicit name.
    pub fn derived_name(&self) -> Option<&str> {
        match self {
            SqlNode::Identifier(parts) => parts.last().map(String::as_str),
            SqlNode::Alias { alias, .. } => Some(alias),
            _ => None,
        }
    }

    /// Drops a top-level `AS` alias.
    pub fn strip_alias(self) -> SqlNode {
        match self {
            SqlNode::Alias { expr, .. } => *expr,
            other => other,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, SqlNode::Select(_) | SqlNode::SetOp { .. })
    }
}
