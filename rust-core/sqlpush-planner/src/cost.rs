// SPDX-License-Identifier: PMPL-1.0-or-later
//! Cost model and row-count estimation.
//!
//! Estimates are computed from node attributes and the children's estimates
//! only; nothing is executed. Selectivity guesses follow the usual
//! relational-optimizer defaults (`=` 0.15, range 0.5, `IS NOT NULL` 0.9,
//! anything else 0.25) multiplied across conjuncts.

use serde::{Deserialize, Serialize};

use crate::physical::{PhysicalNode, PhysicalOp};
use crate::rex::{Operator, Rex};
use crate::schema::Table;

/// Row count assumed for a table with no catalog statistics.
pub const DEFAULT_ROW_COUNT: f64 = 100.0;

/// Discount applied to remote unions so the search prefers pushing them.
pub const UNION_COST_FACTOR: f64 = 0.1;

/// Cost of a plan node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cost {
    pub rows: f64,
    pub cpu: f64,
    pub io: f64,
}

impl Cost {
    pub const ZERO: Cost = Cost {
        rows: 0.0,
        cpu: 0.0,
        io: 0.0,
    };

    pub fn new(rows: f64, cpu: f64, io: f64) -> Self {
        Self { rows, cpu, io }
    }

    pub fn plus(&self, other: &Cost) -> Cost {
        Cost::new(self.rows + other.rows, self.cpu + other.cpu, self.io + other.io)
    }

    pub fn multiply_by(&self, factor: f64) -> Cost {
        Cost::new(self.rows * factor, self.cpu * factor, self.io * factor)
    }

    /// Compares by row count, the dominant term.
    pub fn is_le(&self, other: &Cost) -> bool {
        self.rows <= other.rows
    }
}

/// Factory for [`Cost`] values, supplied by the plan search.
pub trait CostModel: Send + Sync {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost {
        Cost::new(rows, cpu, io)
    }
}

/// Row-count and selectivity source.
pub trait Statistics: Send + Sync {
    fn table_row_count(&self, table: &dyn Table) -> f64 {
        table.row_count().unwrap_or(DEFAULT_ROW_COUNT)
    }

    /// Fraction of rows expected to satisfy `predicate`.
    fn selectivity(&self, predicate: Option<&Rex>) -> f64 {
        guess_selectivity(predicate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatistics;

impl Statistics for DefaultStatistics {}

pub fn guess_selectivity(predicate: Option<&Rex>) -> f64 {
    let Some(predicate) = predicate else {
        return 1.0;
    };
    predicate
        .conjunctions()
        .into_iter()
        .filter(|c| !c.is_always_true())
        .map(|c| match c {
            Rex::Call { op, .. } => match op {
                Operator::IsNotNull => 0.9,
                Operator::Eq => 0.15,
                Operator::Lt | Operator::LtEq | Operator::Gt | Operator::GtEq => 0.5,
                _ => 0.25,
            },
            _ => 0.25,
        })
        .product()
}

impl PhysicalNode {
    /// Row estimate with the default statistics.
    pub fn estimated_row_count(&self) -> f64 {
        self.row_count_with(&DefaultStatistics)
    }

    pub fn row_count_with(&self, stats: &dyn Statistics) -> f64 {
        match self.op() {
            PhysicalOp::TableScan { table } => stats.table_row_count(table.as_ref()),
            PhysicalOp::Join {
                left,
                right,
                left_keys,
                right_keys,
                ..
            } => {
                let left_rows = left.row_count_with(stats);
                let right_rows = right.row_count_with(stats);
                match (left.is_unique_on(left_keys), right.is_unique_on(right_keys)) {
                    (true, true) => left_rows.min(right_rows),
                    (true, false) => right_rows,
                    (false, true) => left_rows,
                    (false, false) => left_rows * right_rows,
                }
            }
            PhysicalOp::Filter { input, condition } => {
                input.row_count_with(stats) * stats.selectivity(Some(condition))
            }
            PhysicalOp::Calc { input, program } => {
                let condition = program.condition_expr().ok().flatten();
                input.row_count_with(stats) * stats.selectivity(condition.as_ref())
            }
            PhysicalOp::Aggregate {
                input, group_set, ..
            } => {
                if group_set.is_empty() {
                    1.0
                } else {
                    let groups = i32::try_from(group_set.len()).unwrap_or(i32::MAX);
                    input.row_count_with(stats) * (1.0 - 0.5f64.powi(groups))
                }
            }
            PhysicalOp::Union { inputs, all } => {
                let rows: f64 = inputs.iter().map(|i| i.row_count_with(stats)).sum();
                if *all {
                    rows
                } else {
                    rows * 0.5
                }
            }
            PhysicalOp::Intersect { inputs, .. } => {
                inputs
                    .iter()
                    .map(|i| i.row_count_with(stats))
                    .reduce(f64::min)
                    .unwrap_or(0.0)
                    * 0.25
            }
            PhysicalOp::Minus { inputs, .. } => {
                let mut counts = inputs.iter().map(|i| i.row_count_with(stats));
                let first = counts.next().unwrap_or(0.0);
                counts.fold(first, |rows, other| rows - 0.5 * other).max(0.0)
            }
            PhysicalOp::Values { tuples } => tuples.len() as f64,
            PhysicalOp::Project { input, .. }
            | PhysicalOp::Sort { input, .. }
            | PhysicalOp::TableModify { input, .. } => input.row_count_with(stats),
        }
    }

    /// Cost of this node alone, excluding its inputs.
    pub fn self_cost(&self, model: &dyn CostModel) -> Cost {
        self.self_cost_with(model, &DefaultStatistics)
    }

    /// [`PhysicalNode::self_cost`] under `stats`.
    ///
    /// Filter and Calc charge one unit of CPU per expression node evaluated
    /// per input row.
    pub fn self_cost_with(&self, model: &dyn CostModel, stats: &dyn Statistics) -> Cost {
        let rows = self.row_count_with(stats);
        match self.op() {
            PhysicalOp::Filter { input, condition } => model.make_cost(
                rows,
                input.row_count_with(stats) * condition.node_count() as f64,
                0.0,
            ),
            PhysicalOp::Calc { input, program } => model.make_cost(
                rows,
                input.row_count_with(stats) * program.expr_count() as f64,
                0.0,
            ),
            PhysicalOp::Union { .. } => model
                .make_cost(rows, 0.0, 0.0)
                .multiply_by(UNION_COST_FACTOR),
            _ => model.make_cost(rows, 0.0, 0.0),
        }
    }

    /// Whether no two output rows agree on all of `columns`.
    ///
    /// Answers `false` when uniqueness cannot be shown.
    pub fn is_unique_on(&self, columns: &[usize]) -> bool {
        let covers_all = |n: usize| (0..n).all(|c| columns.contains(&c));
        match self.op() {
            PhysicalOp::TableScan { table } => table
                .unique_keys()
                .iter()
                .any(|key| key.iter().all(|c| columns.contains(c))),
            PhysicalOp::Filter { input, .. } | PhysicalOp::Sort { input, .. } => {
                input.is_unique_on(columns)
            }
            PhysicalOp::Project { input, projects } => {
                unique_through(input, columns, |c| projects.get(c).cloned())
            }
            PhysicalOp::Calc { input, program } => match program.project_exprs() {
                Ok(exprs) => unique_through(input, columns, |c| exprs.get(c).cloned()),
                Err(_) => false,
            },
            PhysicalOp::Aggregate { group_set, .. } => covers_all(group_set.len()),
            PhysicalOp::Values { tuples } => tuples.iter().enumerate().all(|(i, a)| {
                tuples[i + 1..]
                    .iter()
                    .all(|b| columns.iter().any(|&c| a.get(c) != b.get(c)))
            }),
            PhysicalOp::Union { all: false, .. }
            | PhysicalOp::Intersect { .. }
            | PhysicalOp::Minus { .. } => covers_all(self.row_type().len()),
            PhysicalOp::Union { all: true, .. }
            | PhysicalOp::Join { .. }
            | PhysicalOp::TableModify { .. } => false,
        }
    }
}

/// Uniqueness through a projection: map output columns that are plain input
/// references back to the input and ask it.
fn unique_through(
    input: &PhysicalNode,
    columns: &[usize],
    project: impl Fn(usize) -> Option<Rex>,
) -> bool {
    let mapped: Vec<usize> = columns
        .iter()
        .filter_map(|&c| project(c).and_then(|e| e.as_input_ref()))
        .collect();
    !mapped.is_empty() && input.is_unique_on(&mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_arithmetic() {
        let a = Cost::new(10.0, 2.0, 0.0);
        let b = Cost::new(5.0, 1.0, 1.0);
        assert_eq!(a.plus(&b), Cost::new(15.0, 3.0, 1.0));
        assert_eq!(a.multiply_by(0.1).rows, 1.0);
        assert!(b.is_le(&a));
        assert!(!a.is_le(&b));
        assert_eq!(Cost::ZERO.plus(&a), a);
    }

    #[test]
    fn test_guess_selectivity() {
        assert_eq!(guess_selectivity(None), 1.0);
        let eq = Rex::eq(Rex::input(0), Rex::int(1));
        assert!((guess_selectivity(Some(&eq)) - 0.15).abs() < f64::EPSILON);
        let both = Rex::and(vec![
            eq,
            Rex::call(Operator::Gt, vec![Rex::input(1), Rex::int(3)]),
        ]);
        assert!((guess_selectivity(Some(&both)) - 0.075).abs() < 1e-12);
        let not_null = Rex::call(Operator::IsNotNull, vec![Rex::input(0)]);
        assert!((guess_selectivity(Some(&not_null)) - 0.9).abs() < f64::EPSILON);
        assert_eq!(guess_selectivity(Some(&Rex::boolean(true))), 1.0);
    }

    #[test]
    fn test_default_cost_model_is_identity() {
        assert_eq!(
            DefaultCostModel.make_cost(1.0, 2.0, 3.0),
            Cost::new(1.0, 2.0, 3.0)
        );
    }
}
