// SPDX-License-Identifier: PMPL-1.0-or-later
//! Scalar expressions.
//!
//! [`Rex`] is the expression tree carried by logical and physical nodes.
//! [`RexProgram`] is the shared-subexpression form used by calc nodes, and
//! [`JoinInfo`] splits a join condition into equi-join keys.

use serde::{Deserialize, Serialize};

use crate::error::PushdownError;
use crate::schema::RowType;

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(String),
    Double(f64),
    String(String),
}

/// Scalar operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    IsNull,
    IsNotNull,
    Plus,
    Minus,
    Times,
    Divide,
    Negate,
    Like,
    Case,
    Cast(String),
    Function(String),
    // Multiset operators. Remote databases have no equivalent.
    Multiset,
    MultisetUnion,
    MultisetIntersect,
    MultisetExcept,
    Submultiset,
    MemberOf,
    Cardinality,
    Element,
}

impl Operator {
    pub fn is_multiset(&self) -> bool {
        matches!(
            self,
            Operator::Multiset
                | Operator::MultisetUnion
                | Operator::MultisetIntersect
                | Operator::MultisetExcept
                | Operator::Submultiset
                | Operator::MemberOf
                | Operator::Cardinality
                | Operator::Element
        )
    }
}

/// A scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rex {
    Literal(Literal),
    /// Field of the input row.
    InputRef(usize),
    /// Entry in the enclosing [`RexProgram`]'s expression list.
    LocalRef(usize),
    Call {
        op: Operator,
        operands: Vec<Rex>,
    },
}

impl Rex {
    pub fn input(index: usize) -> Rex {
        Rex::InputRef(index)
    }

    pub fn int(value: i64) -> Rex {
        Rex::Literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Rex {
        Rex::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Rex {
        Rex::Literal(Literal::Boolean(value))
    }

    pub fn call(op: Operator, operands: Vec<Rex>) -> Rex {
        Rex::Call { op, operands }
    }

    pub fn eq(left: Rex, right: Rex) -> Rex {
        Rex::call(Operator::Eq, vec![left, right])
    }

    /// Conjunction of `conjuncts`; `TRUE` when empty, the sole item when one.
    pub fn and(conjuncts: Vec<Rex>) -> Rex {
        match conjuncts.len() {
            0 => Rex::boolean(true),
            1 => conjuncts.into_iter().next().unwrap_or(Rex::boolean(true)),
            _ => Rex::call(Operator::And, conjuncts),
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, Rex::Literal(Literal::Boolean(true)))
    }

    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            Rex::InputRef(i) => Some(*i),
            _ => None,
        }
    }

    /// Top-level conjuncts with nested `AND`s flattened.
    pub fn conjunctions(&self) -> Vec<&Rex> {
        let mut out = Vec::new();
        self.collect_conjunctions(&mut out);
        out
    }

    fn collect_conjunctions<'a>(&'a self, out: &mut Vec<&'a Rex>) {
        match self {
            Rex::Call {
                op: Operator::And,
                operands,
            } => operands.iter().for_each(|o| o.collect_conjunctions(out)),
            other => out.push(other),
        }
    }

    pub fn contains_multiset(&self) -> bool {
        match self {
            Rex::Call { op, operands } => {
                op.is_multiset() || operands.iter().any(Rex::contains_multiset)
            }
            _ => false,
        }
    }

    /// Number of expression nodes, counting this one.
    pub fn node_count(&self) -> usize {
        match self {
            Rex::Call { operands, .. } => 1 + operands.iter().map(Rex::node_count).sum::<usize>(),
            _ => 1,
        }
    }

    /// Largest input field referenced, if any.
    pub fn max_input_ref(&self) -> Option<usize> {
        match self {
            Rex::InputRef(i) => Some(*i),
            Rex::Call { operands, .. } => operands.iter().filter_map(Rex::max_input_ref).max(),
            _ => None,
        }
    }
}

/// Calc program: a shared expression list, a projection and an optional
/// condition, each pointing into the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexProgram {
    input: RowType,
    exprs: Vec<Rex>,
    projects: Vec<usize>,
    condition: Option<usize>,
    output: RowType,
}

impl RexProgram {
    /// Build a program, checking that every local reference resolves.
    pub fn new(
        input: RowType,
        exprs: Vec<Rex>,
        projects: Vec<usize>,
        condition: Option<usize>,
        output: RowType,
    ) -> Result<Self, PushdownError> {
        if projects.len() != output.len() {
            return Err(PushdownError::FieldOutOfRange {
                ordinal: projects.len(),
                count: output.len(),
            });
        }
        for &index in projects.iter().chain(condition.iter()) {
            if index >= exprs.len() {
                return Err(PushdownError::UnknownLocalRef(index));
            }
        }
        let program = Self {
            input,
            exprs,
            projects,
            condition,
            output,
        };
        for expr in &program.exprs {
            program.expand(expr)?;
        }
        Ok(program)
    }

    /// Program whose expression list is the input fields followed by the
    /// non-trivial projections and the condition.
    pub fn from_projects(
        input: RowType,
        projects: Vec<Rex>,
        condition: Option<Rex>,
        output: RowType,
    ) -> Result<Self, PushdownError> {
        let mut exprs: Vec<Rex> = (0..input.len()).map(Rex::InputRef).collect();
        let mut locals = Vec::with_capacity(projects.len());
        for project in projects {
            let index = match project {
                Rex::InputRef(i) if i < input.len() => i,
                other => {
                    exprs.push(other);
                    exprs.len() - 1
                }
            };
            locals.push(index);
        }
        let condition = condition.map(|c| {
            exprs.push(c);
            exprs.len() - 1
        });
        Self::new(input, exprs, locals, condition, output)
    }

    /// Identity projection with no condition.
    pub fn identity(input: RowType) -> Self {
        let n = input.len();
        Self {
            exprs: (0..n).map(Rex::InputRef).collect(),
            projects: (0..n).collect(),
            condition: None,
            output: input.clone(),
            input,
        }
    }

    pub fn input_row_type(&self) -> &RowType {
        &self.input
    }

    pub fn output_row_type(&self) -> &RowType {
        &self.output
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn contains_multiset(&self) -> bool {
        self.exprs.iter().any(Rex::contains_multiset)
    }

    /// Replace every local reference with the expression it names.
    pub fn expand(&self, rex: &Rex) -> Result<Rex, PushdownError> {
        self.expand_depth(rex, 0)
    }

    fn expand_depth(&self, rex: &Rex, depth: usize) -> Result<Rex, PushdownError> {
        match rex {
            Rex::LocalRef(i) => {
                // A chain longer than the list is a cycle.
                if depth > self.exprs.len() {
                    return Err(PushdownError::UnknownLocalRef(*i));
                }
                let target = self
                    .exprs
                    .get(*i)
                    .ok_or(PushdownError::UnknownLocalRef(*i))?;
                self.expand_depth(target, depth + 1)
            }
            Rex::Call { op, operands } => Ok(Rex::Call {
                op: op.clone(),
                operands: operands
                    .iter()
                    .map(|o| self.expand_depth(o, depth))
                    .collect::<Result<_, _>>()?,
            }),
            other => Ok(other.clone()),
        }
    }

    /// Projected expressions with local references resolved.
    pub fn project_exprs(&self) -> Result<Vec<Rex>, PushdownError> {
        self.projects
            .iter()
            .map(|&i| self.expand(&Rex::LocalRef(i)))
            .collect()
    }

    /// Condition with local references resolved.
    pub fn condition_expr(&self) -> Result<Option<Rex>, PushdownError> {
        self.condition
            .map(|i| self.expand(&Rex::LocalRef(i)))
            .transpose()
    }

    /// True when the projection returns the input row unchanged: same arity,
    /// same order, same names.
    pub fn is_star(&self) -> bool {
        if self.projects.len() != self.input.len() || self.output != self.input {
            return false;
        }
        match self.project_exprs() {
            Ok(exprs) => is_identity(&exprs, self.input.len()),
            Err(_) => false,
        }
    }
}

/// True when `exprs` is exactly `$0, $1, ..., $n-1` for an `n`-field input.
pub fn is_identity(exprs: &[Rex], input_len: usize) -> bool {
    exprs.len() == input_len
        && exprs
            .iter()
            .enumerate()
            .all(|(i, e)| e.as_input_ref() == Some(i))
}

/// Equi-join analysis of a join condition.
///
/// Right keys are relative to the right input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinInfo {
    pub left_keys: Vec<usize>,
    pub right_keys: Vec<usize>,
    pub non_equi: Vec<Rex>,
}

impl JoinInfo {
    pub fn of(left_count: usize, right_count: usize, condition: &Rex) -> Self {
        let mut info = JoinInfo::default();
        let total = left_count + right_count;
        for conjunct in condition.conjunctions() {
            if conjunct.is_always_true() {
                continue;
            }
            let pair = match conjunct {
                Rex::Call {
                    op: Operator::Eq,
                    operands,
                } => match operands.as_slice() {
                    [Rex::InputRef(a), Rex::InputRef(b)] => Some((*a, *b)),
                    _ => None,
                },
                _ => None,
            };
            match pair {
                Some((a, b)) if a < left_count && b >= left_count && b < total => {
                    info.left_keys.push(a);
                    info.right_keys.push(b - left_count);
                }
                Some((a, b)) if b < left_count && a >= left_count && a < total => {
                    info.left_keys.push(b);
                    info.right_keys.push(a - left_count);
                }
                _ => info.non_equi.push(conjunct.clone()),
            }
        }
        info
    }

    pub fn is_equi(&self) -> bool {
        self.non_equi.is_empty()
    }

    pub fn key_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.left_keys
            .iter()
            .copied()
            .zip(self.right_keys.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(names: &[&str]) -> RowType {
        RowType::new(names.iter().copied())
    }

    #[test]
    fn test_conjunctions_flatten_nested_and() {
        let cond = Rex::call(
            Operator::And,
            vec![
                Rex::eq(Rex::input(0), Rex::input(2)),
                Rex::call(
                    Operator::And,
                    vec![Rex::boolean(true), Rex::eq(Rex::input(1), Rex::input(3))],
                ),
            ],
        );
        assert_eq!(cond.conjunctions().len(), 3);
    }

    #[test]
    fn test_node_count() {
        assert_eq!(Rex::input(0).node_count(), 1);
        let range = Rex::and(vec![
            Rex::call(Operator::Gt, vec![Rex::input(0), Rex::int(1)]),
            Rex::call(Operator::IsNotNull, vec![Rex::input(1)]),
        ]);
        assert_eq!(range.node_count(), 6);
    }

    #[test]
    fn test_join_info_equi() {
        let cond = Rex::and(vec![
            Rex::eq(Rex::input(0), Rex::input(3)),
            Rex::eq(Rex::input(4), Rex::input(1)),
        ]);
        let info = JoinInfo::of(2, 3, &cond);
        assert!(info.is_equi());
        assert_eq!(info.left_keys, vec![0, 1]);
        assert_eq!(info.right_keys, vec![1, 2]);
    }

    #[test]
    fn test_join_info_non_equi() {
        let cond = Rex::and(vec![
            Rex::eq(Rex::input(0), Rex::input(2)),
            Rex::call(Operator::Lt, vec![Rex::input(1), Rex::input(3)]),
        ]);
        let info = JoinInfo::of(2, 2, &cond);
        assert!(!info.is_equi());
        assert_eq!(info.left_keys, vec![0]);

        // Both sides from the left input.
        let same_side = Rex::eq(Rex::input(0), Rex::input(1));
        assert!(!JoinInfo::of(2, 2, &same_side).is_equi());
    }

    #[test]
    fn test_join_info_true_condition_has_no_keys() {
        let info = JoinInfo::of(2, 2, &Rex::boolean(true));
        assert!(info.is_equi());
        assert!(info.left_keys.is_empty());
    }

    #[test]
    fn test_program_identity_is_star() {
        let program = RexProgram::identity(row(&["a", "b"]));
        assert!(program.is_star());
        assert_eq!(program.expr_count(), 2);
    }

    #[test]
    fn test_program_rename_is_not_star() {
        let program = RexProgram::from_projects(
            row(&["a", "b"]),
            vec![Rex::input(0), Rex::input(1)],
            None,
            row(&["a", "c"]),
        )
        .unwrap();
        assert!(!program.is_star());
    }

    #[test]
    fn test_program_permutation_is_not_star() {
        let program = RexProgram::from_projects(
            row(&["a", "b"]),
            vec![Rex::input(1), Rex::input(0)],
            None,
            row(&["a", "b"]),
        )
        .unwrap();
        assert!(!program.is_star());
    }

    #[test]
    fn test_program_expand_resolves_locals() {
        let program = RexProgram::new(
            row(&["a"]),
            vec![
                Rex::input(0),
                Rex::call(Operator::Plus, vec![Rex::LocalRef(0), Rex::int(1)]),
            ],
            vec![1],
            None,
            row(&["a1"]),
        )
        .unwrap();
        assert_eq!(
            program.project_exprs().unwrap(),
            vec![Rex::call(Operator::Plus, vec![Rex::input(0), Rex::int(1)])]
        );
    }

    #[test]
    fn test_program_rejects_dangling_local() {
        let result = RexProgram::new(
            row(&["a"]),
            vec![Rex::LocalRef(5)],
            vec![0],
            None,
            row(&["a"]),
        );
        assert!(matches!(result, Err(PushdownError::UnknownLocalRef(5))));
    }

    #[test]
    fn test_program_multiset_detection() {
        let program = RexProgram::from_projects(
            row(&["a"]),
            vec![Rex::call(Operator::Cardinality, vec![Rex::input(0)])],
            None,
            row(&["n"]),
        )
        .unwrap();
        assert!(program.contains_multiset());
        assert!(!RexProgram::identity(row(&["a"])).contains_multiset());
    }
}
