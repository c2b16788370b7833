// SPDX-License-Identifier: PMPL-1.0-or-later
//! Text rendering of SQL AST nodes.
//!
//! A diagnostic renderer, not a general SQL printer: it emits one line of
//! text, adds parentheses by operator precedence, and applies a single
//! identifier quoting style.

use std::fmt::{self, Write};

use crate::ast::{Join, NullsOrder, OrderByItem, Select, SqlLiteral, SqlNode, SqlOperator};
use crate::dialect::IdentifierQuote;

/// Precedence of a node that never needs parentheses.
const ATOM: u8 = u8::MAX;

/// Whether `node` renders with a leading `-` when left unparenthesized.
fn starts_with_minus(node: &SqlNode) -> bool {
    match node {
        SqlNode::Literal(SqlLiteral::Integer(v)) => *v < 0,
        SqlNode::Literal(SqlLiteral::Double(v)) => v.is_sign_negative(),
        SqlNode::Literal(SqlLiteral::Decimal(v)) => v.starts_with('-'),
        SqlNode::Call {
            operator: SqlOperator::Negate,
            ..
        } => true,
        _ => false,
    }
}

pub(crate) struct Renderer<'w, W: Write> {
    out: &'w mut W,
    quote: IdentifierQuote,
}

impl<'w, W: Write> Renderer<'w, W> {
    pub(crate) fn new(out: &'w mut W, quote: IdentifierQuote) -> Self {
        Self { out, quote }
    }

    /// Render a statement root.
    pub(crate) fn statement(&mut self, node: &SqlNode) -> fmt::Result {
        match node {
            SqlNode::Select(select) => self.select(select),
            SqlNode::SetOp { operator, inputs } => self.set_op(operator.keyword(), inputs),
            other => self.expr(other, 0),
        }
    }

    fn identifier(&mut self, parts: &[String]) -> fmt::Result {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.out.write_char('.')?;
            }
            self.out.write_str(&self.quote.quote(part))?;
        }
        Ok(())
    }

    fn literal(&mut self, literal: &SqlLiteral) -> fmt::Result {
        match literal {
            SqlLiteral::Null => self.out.write_str("NULL"),
            SqlLiteral::Boolean(true) => self.out.write_str("TRUE"),
            SqlLiteral::Boolean(false) => self.out.write_str("FALSE"),
            SqlLiteral::Integer(v) => write!(self.out, "{v}"),
            SqlLiteral::Decimal(v) => self.out.write_str(v),
            SqlLiteral::Double(v) => write!(self.out, "{v:?}"),
            SqlLiteral::String(v) => write!(self.out, "'{}'", v.replace('\'', "''")),
        }
    }

    fn list(&mut self, items: &[SqlNode]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.expr(item, 0)?;
        }
        Ok(())
    }

    /// Render an expression, parenthesizing when it binds looser than `min`.
    fn expr(&mut self, node: &SqlNode, min: u8) -> fmt::Result {
        match node {
            SqlNode::Identifier(parts) => self.identifier(parts),
            SqlNode::Literal(literal) => self.literal(literal),
            SqlNode::Alias { expr, alias } => {
                self.expr(expr, 0)?;
                self.out.write_str(" AS ")?;
                self.out.write_str(&self.quote.quote(alias))
            }
            SqlNode::Select(_) | SqlNode::SetOp { .. } => {
                self.out.write_char('(')?;
                self.statement(node)?;
                self.out.write_char(')')
            }
            SqlNode::Join(join) => self.join(join),
            SqlNode::Call { operator, operands } => {
                let precedence = operator.precedence();
                let wrap = precedence < min;
                if wrap {
                    self.out.write_char('(')?;
                }
                self.call(operator, operands)?;
                if wrap {
                    self.out.write_char(')')?;
                }
                Ok(())
            }
        }
    }

    fn call(&mut self, operator: &SqlOperator, operands: &[SqlNode]) -> fmt::Result {
        let precedence = operator.precedence();
        if let (Some(symbol), [left, right]) = (operator.infix_symbol(), operands) {
            self.expr(left, precedence)?;
            write!(self.out, " {symbol} ")?;
            // Right operands of equal precedence keep their grouping.
            return self.expr(right, precedence.saturating_add(1));
        }
        match operator {
            // Conjunctions and disjunctions may carry any number of operands.
            SqlOperator::And | SqlOperator::Or => {
                let Some((first, rest)) = operands.split_first() else {
                    let empty = if *operator == SqlOperator::And {
                        "TRUE"
                    } else {
                        "FALSE"
                    };
                    return self.out.write_str(empty);
                };
                self.expr(first, precedence)?;
                for operand in rest {
                    write!(self.out, " {} ", operator.infix_symbol().unwrap_or("AND"))?;
                    self.expr(operand, precedence.saturating_add(1))?;
                }
                Ok(())
            }
            SqlOperator::Not => {
                self.out.write_str("NOT ")?;
                self.expr_operand(operands, 0, precedence)
            }
            SqlOperator::Negate => {
                self.out.write_char('-')?;
                // `--` would open a line comment.
                if operands.first().is_some_and(starts_with_minus) {
                    self.out.write_char('(')?;
                    self.expr_operand(operands, 0, 0)?;
                    self.out.write_char(')')
                } else {
                    self.expr_operand(operands, 0, precedence)
                }
            }
            SqlOperator::IsNull => {
                self.expr_operand(operands, 0, precedence + 1)?;
                self.out.write_str(" IS NULL")
            }
            SqlOperator::IsNotNull => {
                self.expr_operand(operands, 0, precedence + 1)?;
                self.out.write_str(" IS NOT NULL")
            }
            SqlOperator::Case => {
                self.out.write_str("CASE")?;
                let mut pairs = operands.chunks_exact(2);
                for pair in pairs.by_ref() {
                    self.out.write_str(" WHEN ")?;
                    self.expr(&pair[0], 0)?;
                    self.out.write_str(" THEN ")?;
                    self.expr(&pair[1], 0)?;
                }
                if let [otherwise] = pairs.remainder() {
                    self.out.write_str(" ELSE ")?;
                    self.expr(otherwise, 0)?;
                }
                self.out.write_str(" END")
            }
            SqlOperator::Cast(ty) => {
                self.out.write_str("CAST(")?;
                self.expr_operand(operands, 0, 0)?;
                write!(self.out, " AS {ty})")
            }
            SqlOperator::Function(name) => {
                write!(self.out, "{name}(")?;
                self.list(operands)?;
                self.out.write_char(')')
            }
            SqlOperator::Aggregate { name, distinct } => {
                write!(self.out, "{name}(")?;
                if operands.is_empty() {
                    self.out.write_char('*')?;
                } else {
                    if *distinct {
                        self.out.write_str("DISTINCT ")?;
                    }
                    self.list(operands)?;
                }
                self.out.write_char(')')
            }
            // Infix operators with the wrong arity fall back to call syntax.
            other => {
                write!(self.out, "{}(", other.infix_symbol().unwrap_or("?"))?;
                self.list(operands)?;
                self.out.write_char(')')
            }
        }
    }

    fn expr_operand(&mut self, operands: &[SqlNode], index: usize, min: u8) -> fmt::Result {
        match operands.get(index) {
            Some(operand) => self.expr(operand, min),
            None => Err(fmt::Error),
        }
    }

    fn select(&mut self, select: &Select) -> fmt::Result {
        self.out.write_str("SELECT ")?;
        match &select.projection {
            Some(items) if !items.is_empty() => self.list(items)?,
            _ => self.out.write_char('*')?,
        }
        if let Some(from) = &select.from {
            self.out.write_str(" FROM ")?;
            self.from_item(from)?;
        }
        if let Some(selection) = &select.selection {
            self.out.write_str(" WHERE ")?;
            self.expr(selection, 0)?;
        }
        if let Some(group_by) = &select.group_by {
            self.out.write_str(" GROUP BY ")?;
            if group_by.is_empty() {
                self.out.write_str("()")?;
            } else {
                self.list(group_by)?;
            }
        }
        if let Some(having) = &select.having {
            self.out.write_str(" HAVING ")?;
            self.expr(having, 0)?;
        }
        if let Some(order_by) = &select.order_by {
            self.out.write_str(" ORDER BY ")?;
            for (i, item) in order_by.iter().enumerate() {
                if i > 0 {
                    self.out.write_str(", ")?;
                }
                self.order_item(item)?;
            }
        }
        Ok(())
    }

    fn order_item(&mut self, item: &OrderByItem) -> fmt::Result {
        self.expr(&item.expr, 0)?;
        if item.descending {
            self.out.write_str(" DESC")?;
        }
        match item.nulls {
            Some(NullsOrder::First) => self.out.write_str(" NULLS FIRST"),
            Some(NullsOrder::Last) => self.out.write_str(" NULLS LAST"),
            None => Ok(()),
        }
    }

    fn from_item(&mut self, node: &SqlNode) -> fmt::Result {
        match node {
            SqlNode::Alias { expr, alias } => {
                if expr.is_query() {
                    self.out.write_char('(')?;
                    self.statement(expr)?;
                    self.out.write_char(')')?;
                } else {
                    self.from_item(expr)?;
                }
                self.out.write_str(" AS ")?;
                self.out.write_str(&self.quote.quote(alias))
            }
            SqlNode::Join(join) => self.join(join),
            other => self.expr(other, 0),
        }
    }

    fn join(&mut self, join: &Join) -> fmt::Result {
        self.from_item(&join.left)?;
        write!(self.out, " {} ", join.kind.keyword())?;
        if matches!(join.right, SqlNode::Join(_)) {
            self.out.write_char('(')?;
            self.from_item(&join.right)?;
            self.out.write_char(')')?;
        } else {
            self.from_item(&join.right)?;
        }
        match &join.condition {
            Some(condition) => {
                self.out.write_str(" ON ")?;
                self.expr(condition, 0)
            }
            None => self.out.write_str(" ON TRUE"),
        }
    }

    fn set_op(&mut self, keyword: &str, inputs: &[SqlNode]) -> fmt::Result {
        for (i, input) in inputs.iter().enumerate() {
            if i > 0 {
                write!(self.out, " {keyword} ")?;
            }
            match input {
                SqlNode::Select(select) => self.select(select)?,
                other => self.expr(other, ATOM)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{JoinKind, SetOperator};

    fn render(node: &SqlNode) -> String {
        let mut out = String::new();
        Renderer::new(&mut out, IdentifierQuote::None)
            .statement(node)
            .unwrap();
        out
    }

    fn id(name: &str) -> SqlNode {
        SqlNode::identifier([name])
    }

    fn int(v: i64) -> SqlNode {
        SqlNode::Literal(SqlLiteral::Integer(v))
    }

    #[test]
    fn test_parentheses_follow_precedence() {
        let sum = SqlNode::call(SqlOperator::Plus, vec![id("a"), id("b")]);
        let product = SqlNode::call(SqlOperator::Times, vec![sum, id("c")]);
        assert_eq!(render(&product), "(a + b) * c");

        let or = SqlNode::call(SqlOperator::Or, vec![id("x"), id("y")]);
        let and = SqlNode::call(SqlOperator::And, vec![or, id("z")]);
        assert_eq!(render(&and), "(x OR y) AND z");
    }

    #[test]
    fn test_right_operand_grouping_kept() {
        let diff = SqlNode::call(SqlOperator::Minus, vec![id("b"), id("c")]);
        let node = SqlNode::call(SqlOperator::Minus, vec![id("a"), diff]);
        assert_eq!(render(&node), "a - (b - c)");
    }

    #[test]
    fn test_string_literal_escaping() {
        let node = SqlNode::Literal(SqlLiteral::String("it's".into()));
        assert_eq!(render(&node), "'it''s'");
    }

    #[test]
    fn test_aggregate_rendering() {
        let count = SqlNode::call(
            SqlOperator::Aggregate {
                name: "COUNT".into(),
                distinct: false,
            },
            vec![],
        );
        assert_eq!(render(&count), "COUNT(*)");
        let distinct = SqlNode::call(
            SqlOperator::Aggregate {
                name: "COUNT".into(),
                distinct: true,
            },
            vec![id("x")],
        );
        assert_eq!(render(&distinct), "COUNT(DISTINCT x)");
    }

    #[test]
    fn test_case_rendering() {
        let node = SqlNode::call(
            SqlOperator::Case,
            vec![
                SqlNode::call(SqlOperator::IsNull, vec![id("x")]),
                int(1),
                int(0),
            ],
        );
        assert_eq!(render(&node), "CASE WHEN x IS NULL THEN 1 ELSE 0 END");
    }

    #[test]
    fn test_derived_table_and_empty_group_by() {
        let inner = Select::star_from(id("emp"));
        let outer = Select {
            projection: Some(vec![id("a")]),
            from: Some(SqlNode::alias(SqlNode::select(inner), "t")),
            group_by: Some(vec![]),
            ..Select::default()
        };
        assert_eq!(
            render(&SqlNode::select(outer)),
            "SELECT a FROM (SELECT * FROM emp) AS t GROUP BY ()"
        );
    }

    #[test]
    fn test_join_rendering() {
        let join = Join {
            left: id("emp"),
            kind: JoinKind::Left,
            right: SqlNode::alias(id("dept"), "d"),
            condition: Some(SqlNode::call(
                SqlOperator::Eq,
                vec![
                    SqlNode::identifier(["emp", "deptno"]),
                    SqlNode::identifier(["d", "deptno"]),
                ],
            )),
        };
        let select = Select::star_from(SqlNode::Join(Box::new(join)));
        assert_eq!(
            render(&SqlNode::select(select)),
            "SELECT * FROM emp LEFT JOIN dept AS d ON emp.deptno = d.deptno"
        );
    }

    #[test]
    fn test_set_op_rendering() {
        let node = SqlNode::SetOp {
            operator: SetOperator::Except,
            inputs: vec![
                SqlNode::select(Select::star_from(id("a"))),
                SqlNode::select(Select::star_from(id("b"))),
            ],
        };
        assert_eq!(render(&node), "SELECT * FROM a EXCEPT SELECT * FROM b");
    }

    #[test]
    fn test_variadic_and_or() {
        let and = SqlNode::call(
            SqlOperator::And,
            vec![
                SqlNode::call(SqlOperator::Gt, vec![id("a"), int(1)]),
                SqlNode::call(SqlOperator::Lt, vec![id("a"), int(9)]),
                SqlNode::call(SqlOperator::IsNotNull, vec![id("b")]),
            ],
        );
        assert_eq!(render(&and), "a > 1 AND a < 9 AND b IS NOT NULL");

        let or = SqlNode::call(SqlOperator::Or, vec![id("x"), id("y"), id("z")]);
        let nested = SqlNode::call(SqlOperator::And, vec![or, id("w"), id("v")]);
        assert_eq!(render(&nested), "(x OR y OR z) AND w AND v");

        assert_eq!(render(&SqlNode::call(SqlOperator::And, vec![])), "TRUE");
        assert_eq!(render(&SqlNode::call(SqlOperator::Or, vec![id("x")])), "x");
    }

    #[test]
    fn test_double_negation_is_not_a_comment() {
        let negated = SqlNode::call(SqlOperator::Negate, vec![int(-5)]);
        assert_eq!(render(&negated), "-(-5)");
        let twice = SqlNode::call(
            SqlOperator::Negate,
            vec![SqlNode::call(SqlOperator::Negate, vec![id("x")])],
        );
        assert_eq!(render(&twice), "-(-x)");
        assert_eq!(
            render(&SqlNode::call(SqlOperator::Negate, vec![int(5)])),
            "-5"
        );
    }

    #[test]
    fn test_order_by_rendering() {
        let select = Select {
            from: Some(id("emp")),
            order_by: Some(vec![
                OrderByItem::new(id("a"), true, Some(NullsOrder::First)),
                OrderByItem::new(id("b"), false, None),
            ]),
            ..Select::default()
        };
        assert_eq!(
            render(&SqlNode::select(select)),
            "SELECT * FROM emp ORDER BY a DESC NULLS FIRST, b"
        );
    }
}
