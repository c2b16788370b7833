// SPDX-License-Identifier: PMPL-1.0-or-later
//! Scalar expression to SQL translation.

use sqlpush_ast::{Dialect, NullsOrder, OrderByItem, SqlLiteral, SqlNode, SqlOperator};

use crate::error::PushdownError;
use crate::implementor::Context;
use crate::logical::{AggregateCall, Direction, FieldCollation, NullDirection};
use crate::rex::{Literal, Operator, Rex, RexProgram};

pub fn literal_to_sql(literal: &Literal) -> SqlNode {
    SqlNode::Literal(match literal {
        Literal::Null => SqlLiteral::Null,
        Literal::Boolean(v) => SqlLiteral::Boolean(*v),
        Literal::Integer(v) => SqlLiteral::Integer(*v),
        Literal::Decimal(v) => SqlLiteral::Decimal(v.clone()),
        Literal::Double(v) => SqlLiteral::Double(*v),
        Literal::String(v) => SqlLiteral::String(v.clone()),
    })
}

fn operator_to_sql(op: &Operator) -> SqlOperator {
    let function = |name: &str| SqlOperator::Function(name.to_string());
    match op {
        Operator::Eq => SqlOperator::Eq,
        Operator::NotEq => SqlOperator::NotEq,
        Operator::Lt => SqlOperator::Lt,
        Operator::LtEq => SqlOperator::LtEq,
        Operator::Gt => SqlOperator::Gt,
        Operator::GtEq => SqlOperator::GtEq,
        Operator::And => SqlOperator::And,
        Operator::Or => SqlOperator::Or,
        Operator::Not => SqlOperator::Not,
        Operator::IsNull => SqlOperator::IsNull,
        Operator::IsNotNull => SqlOperator::IsNotNull,
        Operator::Plus => SqlOperator::Plus,
        Operator::Minus => SqlOperator::Minus,
        Operator::Times => SqlOperator::Times,
        Operator::Divide => SqlOperator::Divide,
        Operator::Negate => SqlOperator::Negate,
        Operator::Like => SqlOperator::Like,
        Operator::Case => SqlOperator::Case,
        Operator::Cast(ty) => SqlOperator::Cast(ty.clone()),
        Operator::Function(name) => SqlOperator::Function(name.clone()),
        Operator::Multiset => function("MULTISET"),
        Operator::MultisetUnion => function("MULTISET_UNION"),
        Operator::MultisetIntersect => function("MULTISET_INTERSECT"),
        Operator::MultisetExcept => function("MULTISET_EXCEPT"),
        Operator::Submultiset => function("SUBMULTISET_OF"),
        Operator::MemberOf => function("MEMBER_OF"),
        Operator::Cardinality => function("CARDINALITY"),
        Operator::Element => function("ELEMENT"),
    }
}

impl Context {
    /// Translate an expression over this context's input row.
    ///
    /// Local references are only meaningful inside a program; use
    /// [`Context::to_sql_in`] for those.
    pub fn to_sql(&self, rex: &Rex) -> Result<SqlNode, PushdownError> {
        match rex {
            Rex::Literal(literal) => Ok(literal_to_sql(literal)),
            Rex::InputRef(ordinal) => self.field(*ordinal),
            Rex::LocalRef(index) => Err(PushdownError::UnknownLocalRef(*index)),
            Rex::Call { op, operands } => {
                let operands = operands
                    .iter()
                    .map(|o| self.to_sql(o))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SqlNode::call(operator_to_sql(op), operands))
            }
        }
    }

    pub fn to_sql_in(&self, program: &RexProgram, rex: &Rex) -> Result<SqlNode, PushdownError> {
        self.to_sql(&program.expand(rex)?)
    }

    pub fn aggregate_to_sql(&self, call: &AggregateCall) -> Result<SqlNode, PushdownError> {
        let operands = call
            .args
            .iter()
            .map(|&arg| self.field(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlNode::call(
            SqlOperator::Aggregate {
                name: call.function.to_uppercase(),
                distinct: call.distinct,
            },
            operands,
        ))
    }

    /// `ORDER BY` keys for one collation entry under `dialect`'s null-ordering
    /// policy.
    pub fn collation_to_sql(
        &self,
        collation: &FieldCollation,
        dialect: &Dialect,
    ) -> Result<Vec<OrderByItem>, PushdownError> {
        let field = self.field(collation.field)?;
        let nulls = match collation.nulls {
            NullDirection::Unspecified => None,
            NullDirection::First => Some(NullsOrder::First),
            NullDirection::Last => Some(NullsOrder::Last),
        };
        Ok(dialect.order_by_items(
            field,
            collation.direction == Direction::Descending,
            nulls,
        ))
    }
}
