// SPDX-License-Identifier: PMPL-1.0-or-later
//! Dialect policy table.
//!
//! Target-database quirks are data, looked up by [`DatabaseProduct`]. Adding
//! a dialect means adding a row to [`POLICIES`]; the compiler only ever asks
//! a [`Dialect`] questions and never branches on the product itself.

use serde::{Deserialize, Serialize};

use crate::ast::{NullsOrder, OrderByItem, SqlLiteral, SqlNode, SqlOperator};

/// Identifies the remote database product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProduct {
    Ansi,
    Calcite,
    Postgres,
    MySql,
    MariaDb,
    Oracle,
    SqlServer,
    H2,
    Hsqldb,
    Sqlite,
    Db2,
    Unknown,
}

/// How a target expresses `NULLS FIRST` / `NULLS LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrdering {
    /// The annotation is accepted as written.
    Native,
    /// Emulated with a leading `ISNULL(x)` sort key.
    EmulateWithIsNull,
    /// Emulated with a leading `CASE WHEN x IS NULL THEN 1 ELSE 0 END` key.
    EmulateWithCase,
}

/// Identifier quoting style used when rendering text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierQuote {
    None,
    DoubleQuote,
    Backtick,
    Bracket,
}

impl IdentifierQuote {
    /// Quote one identifier part, escaping the closing character.
    pub fn quote(self, part: &str) -> String {
        match self {
            IdentifierQuote::None => part.to_string(),
            IdentifierQuote::DoubleQuote => format!("\"{}\"", part.replace('"', "\"\"")),
            IdentifierQuote::Backtick => format!("`{}`", part.replace('`', "``")),
            IdentifierQuote::Bracket => format!("[{}]", part.replace(']', "]]")),
        }
    }
}

/// One row of the quirks table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectPolicy {
    pub null_ordering: NullOrdering,
    pub identifier_quote: IdentifierQuote,
}

impl DialectPolicy {
    const STANDARD: DialectPolicy = DialectPolicy {
        null_ordering: NullOrdering::Native,
        identifier_quote: IdentifierQuote::DoubleQuote,
    };

    /// Table lookup; products without a row get the standard policy.
    pub fn for_product(product: DatabaseProduct) -> DialectPolicy {
        POLICIES
            .iter()
            .find(|(p, _)| *p == product)
            .map(|(_, policy)| *policy)
            .unwrap_or(Self::STANDARD)
    }
}

/// Per-product overrides of [`DialectPolicy::STANDARD`].
pub const POLICIES: &[(DatabaseProduct, DialectPolicy)] = &[
    (
        DatabaseProduct::MySql,
        DialectPolicy {
            null_ordering: NullOrdering::EmulateWithIsNull,
            identifier_quote: IdentifierQuote::Backtick,
        },
    ),
    (
        DatabaseProduct::MariaDb,
        DialectPolicy {
            null_ordering: NullOrdering::EmulateWithIsNull,
            identifier_quote: IdentifierQuote::Backtick,
        },
    ),
    (
        DatabaseProduct::SqlServer,
        DialectPolicy {
            null_ordering: NullOrdering::EmulateWithCase,
            identifier_quote: IdentifierQuote::Bracket,
        },
    ),
];

/// Descriptor for the target database of one convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    product: DatabaseProduct,
    policy: DialectPolicy,
}

impl Dialect {
    pub fn of(product: DatabaseProduct) -> Self {
        Self {
            product,
            policy: DialectPolicy::for_product(product),
        }
    }

    pub fn with_null_ordering(mut self, null_ordering: NullOrdering) -> Self {
        self.policy.null_ordering = null_ordering;
        self
    }

    pub fn with_identifier_quote(mut self, quote: IdentifierQuote) -> Self {
        self.policy.identifier_quote = quote;
        self
    }

    pub fn product(&self) -> DatabaseProduct {
        self.product
    }

    pub fn policy(&self) -> DialectPolicy {
        self.policy
    }

    pub fn supports_null_ordering(&self) -> bool {
        self.policy.null_ordering == NullOrdering::Native
    }

    /// Synthetic sort key that is 1 for null values of `expr` and 0 otherwise.
    ///
    /// `None` when the dialect accepts explicit null ordering.
    pub fn null_flag(&self, expr: SqlNode) -> Option<SqlNode> {
        match self.policy.null_ordering {
            NullOrdering::Native => None,
            NullOrdering::EmulateWithIsNull => Some(SqlNode::call(
                SqlOperator::Function("ISNULL".to_string()),
                vec![expr],
            )),
            NullOrdering::EmulateWithCase => Some(SqlNode::call(
                SqlOperator::Case,
                vec![
                    SqlNode::call(SqlOperator::IsNull, vec![expr]),
                    SqlNode::Literal(SqlLiteral::Integer(1)),
                    SqlNode::Literal(SqlLiteral::Integer(0)),
                ],
            )),
        }
    }

    /// `ORDER BY` keys for one sort field.
    ///
    /// With no null annotation, or on a dialect that supports it natively,
    /// this is a single key. Otherwise a null flag key comes first (ascending
    /// for `NULLS LAST`, descending for `NULLS FIRST`) and the field key
    /// follows without an annotation.
    pub fn order_by_items(
        &self,
        expr: SqlNode,
        descending: bool,
        nulls: Option<NullsOrder>,
    ) -> Vec<OrderByItem> {
        let Some(nulls) = nulls else {
            return vec![OrderByItem::new(expr, descending, None)];
        };
        match self.null_flag(expr.clone()) {
            None => vec![OrderByItem::new(expr, descending, Some(nulls))],
            Some(flag) => vec![
                OrderByItem::new(flag, nulls == NullsOrder::First, None),
                OrderByItem::new(expr, descending, None),
            ],
        }
    }

    pub fn quote_identifier(&self, part: &str) -> String {
        self.policy.identifier_quote.quote(part)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::of(DatabaseProduct::Ansi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_products() {
        for product in [
            DatabaseProduct::Ansi,
            DatabaseProduct::Postgres,
            DatabaseProduct::Oracle,
            DatabaseProduct::H2,
            DatabaseProduct::Unknown,
        ] {
            let dialect = Dialect::of(product);
            assert!(dialect.supports_null_ordering(), "{product:?}");
            assert!(dialect.null_flag(SqlNode::identifier(["x"])).is_none());
        }
    }

    #[test]
    fn test_mysql_uses_isnull() {
        let dialect = Dialect::of(DatabaseProduct::MySql);
        assert!(!dialect.supports_null_ordering());
        let flag = dialect.null_flag(SqlNode::identifier(["x"])).unwrap();
        assert_eq!(
            flag,
            SqlNode::call(
                SqlOperator::Function("ISNULL".into()),
                vec![SqlNode::identifier(["x"])]
            )
        );
    }

    #[test]
    fn test_sqlserver_uses_case() {
        let dialect = Dialect::of(DatabaseProduct::SqlServer);
        let flag = dialect.null_flag(SqlNode::identifier(["x"])).unwrap();
        match flag {
            SqlNode::Call {
                operator: SqlOperator::Case,
                operands,
            } => assert_eq!(operands.len(), 3),
            other => panic!("expected CASE, got {other:?}"),
        }
    }

    #[test]
    fn test_order_by_items_native_keeps_annotation() {
        let dialect = Dialect::of(DatabaseProduct::Postgres);
        let items = dialect.order_by_items(SqlNode::identifier(["x"]), true, Some(NullsOrder::Last));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].nulls, Some(NullsOrder::Last));
        assert!(items[0].descending);
    }

    #[test]
    fn test_order_by_items_emulated() {
        let dialect = Dialect::of(DatabaseProduct::MySql);
        let last = dialect.order_by_items(SqlNode::identifier(["x"]), true, Some(NullsOrder::Last));
        assert_eq!(last.len(), 2);
        assert!(!last[0].descending);
        assert_eq!(last[1].nulls, None);
        assert!(last[1].descending);

        let first = dialect.order_by_items(SqlNode::identifier(["x"]), false, Some(NullsOrder::First));
        assert!(first[0].descending);
        assert!(!first[1].descending);
    }

    #[test]
    fn test_unannotated_key_is_untouched() {
        let dialect = Dialect::of(DatabaseProduct::MySql);
        let items = dialect.order_by_items(SqlNode::identifier(["x"]), false, None);
        assert_eq!(items, vec![OrderByItem::new(SqlNode::identifier(["x"]), false, None)]);
    }

    #[test]
    fn test_policy_override() {
        let dialect = Dialect::of(DatabaseProduct::Postgres)
            .with_null_ordering(NullOrdering::EmulateWithCase);
        assert_eq!(dialect.product(), DatabaseProduct::Postgres);
        assert!(!dialect.supports_null_ordering());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(IdentifierQuote::DoubleQuote.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(IdentifierQuote::Backtick.quote("emp"), "`emp`");
        assert_eq!(IdentifierQuote::Bracket.quote("x]y"), "[x]]y]");
        assert_eq!(IdentifierQuote::None.quote("emp"), "emp");
    }

    #[test]
    fn test_product_serde_names() {
        let json = serde_json::to_string(&DatabaseProduct::SqlServer).unwrap();
        assert_eq!(json, "\"sqlserver\"");
        let parsed: NullOrdering = serde_json::from_str("\"emulate_with_is_null\"").unwrap();
        assert_eq!(parsed, NullOrdering::EmulateWithIsNull);
    }
}
