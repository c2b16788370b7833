// SPDX-License-Identifier: PMPL-1.0-or-later
//! Logical plan nodes.
//!
//! The input to the conversion rules. Nodes are immutable and shared through
//! `Arc`; the constructors here derive each node's row type from its inputs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rex::{Literal, Rex, RexProgram};
use crate::schema::{uniquify, RowType, TableRef};

pub type LogicalRef = Arc<LogicalNode>;

/// Operator kind shared by logical and physical nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    TableScan,
    Join,
    Filter,
    Project,
    Calc,
    Aggregate,
    Sort,
    Union,
    Intersect,
    Minus,
    Values,
    TableModify,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::TableScan => "TableScan",
            NodeKind::Join => "Join",
            NodeKind::Filter => "Filter",
            NodeKind::Project => "Project",
            NodeKind::Calc => "Calc",
            NodeKind::Aggregate => "Aggregate",
            NodeKind::Sort => "Sort",
            NodeKind::Union => "Union",
            NodeKind::Intersect => "Intersect",
            NodeKind::Minus => "Minus",
            NodeKind::Values => "Values",
            NodeKind::TableModify => "TableModify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullDirection {
    #[default]
    Unspecified,
    First,
    Last,
}

/// One sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldCollation {
    pub field: usize,
    pub direction: Direction,
    pub nulls: NullDirection,
}

impl FieldCollation {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
            nulls: NullDirection::Unspecified,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Descending,
            nulls: NullDirection::Unspecified,
        }
    }

    pub fn with_nulls(mut self, nulls: NullDirection) -> Self {
        self.nulls = nulls;
        self
    }
}

/// An aggregate function applied to input fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateCall {
    pub function: String,
    pub distinct: bool,
    /// Input field ordinals; empty for `COUNT(*)`.
    pub args: Vec<usize>,
    /// Output field name.
    pub name: String,
}

impl AggregateCall {
    pub fn new(function: impl Into<String>, args: Vec<usize>, name: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            distinct: false,
            args,
            name: name.into(),
        }
    }

    pub fn count_star(name: impl Into<String>) -> Self {
        Self::new("COUNT", Vec::new(), name)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
    Merge,
}

/// Kind-specific attributes of a logical node.
#[derive(Debug, Clone)]
pub enum LogicalOp {
    TableScan {
        table: TableRef,
    },
    Join {
        left: LogicalRef,
        right: LogicalRef,
        condition: Rex,
        join_type: JoinType,
    },
    Filter {
        input: LogicalRef,
        condition: Rex,
    },
    Project {
        input: LogicalRef,
        projects: Vec<Rex>,
    },
    Calc {
        input: LogicalRef,
        program: RexProgram,
    },
    Aggregate {
        input: LogicalRef,
        group_set: Vec<usize>,
        grouping_sets: Vec<Vec<usize>>,
        agg_calls: Vec<AggregateCall>,
    },
    Sort {
        input: LogicalRef,
        collation: Vec<FieldCollation>,
        offset: Option<Rex>,
        fetch: Option<Rex>,
    },
    Union {
        inputs: Vec<LogicalRef>,
        all: bool,
    },
    Intersect {
        inputs: Vec<LogicalRef>,
        all: bool,
    },
    Minus {
        inputs: Vec<LogicalRef>,
        all: bool,
    },
    Values {
        tuples: Vec<Vec<Literal>>,
    },
    TableModify {
        table: TableRef,
        input: LogicalRef,
        operation: ModifyOperation,
        update_columns: Option<Vec<String>>,
        flattened: bool,
    },
}

/// A node of the logical plan.
#[derive(Debug, Clone)]
pub struct LogicalNode {
    row_type: RowType,
    op: LogicalOp,
}

impl LogicalNode {
    fn wrap(row_type: RowType, op: LogicalOp) -> LogicalRef {
        Arc::new(Self { row_type, op })
    }

    pub fn scan(table: TableRef) -> LogicalRef {
        Self::wrap(table.row_type().clone(), LogicalOp::TableScan { table })
    }

    pub fn join(left: LogicalRef, right: LogicalRef, condition: Rex, join_type: JoinType) -> LogicalRef {
        let row_type = left.row_type.join(&right.row_type);
        Self::wrap(
            row_type,
            LogicalOp::Join {
                left,
                right,
                condition,
                join_type,
            },
        )
    }

    pub fn filter(input: LogicalRef, condition: Rex) -> LogicalRef {
        Self::wrap(input.row_type.clone(), LogicalOp::Filter { input, condition })
    }

    pub fn project(input: LogicalRef, projects: Vec<Rex>, names: RowType) -> LogicalRef {
        Self::wrap(names, LogicalOp::Project { input, projects })
    }

    pub fn calc(input: LogicalRef, program: RexProgram) -> LogicalRef {
        Self::wrap(
            program.output_row_type().clone(),
            LogicalOp::Calc { input, program },
        )
    }

    /// Aggregate node. An empty `grouping_sets` means the single set
    /// `group_set`.
    pub fn aggregate(
        input: LogicalRef,
        group_set: Vec<usize>,
        grouping_sets: Vec<Vec<usize>>,
        agg_calls: Vec<AggregateCall>,
    ) -> LogicalRef {
        let row_type = aggregate_row_type(&input.row_type, &group_set, &agg_calls);
        let grouping_sets = if grouping_sets.is_empty() {
            vec![group_set.clone()]
        } else {
            grouping_sets
        };
        Self::wrap(
            row_type,
            LogicalOp::Aggregate {
                input,
                group_set,
                grouping_sets,
                agg_calls,
            },
        )
    }

    pub fn sort(
        input: LogicalRef,
        collation: Vec<FieldCollation>,
        offset: Option<Rex>,
        fetch: Option<Rex>,
    ) -> LogicalRef {
        Self::wrap(
            input.row_type.clone(),
            LogicalOp::Sort {
                input,
                collation,
                offset,
                fetch,
            },
        )
    }

    pub fn union(inputs: Vec<LogicalRef>, all: bool) -> LogicalRef {
        Self::wrap(set_op_row_type(&inputs), LogicalOp::Union { inputs, all })
    }

    pub fn intersect(inputs: Vec<LogicalRef>, all: bool) -> LogicalRef {
        Self::wrap(set_op_row_type(&inputs), LogicalOp::Intersect { inputs, all })
    }

    pub fn minus(inputs: Vec<LogicalRef>, all: bool) -> LogicalRef {
        Self::wrap(set_op_row_type(&inputs), LogicalOp::Minus { inputs, all })
    }

    pub fn values(fields: RowType, tuples: Vec<Vec<Literal>>) -> LogicalRef {
        Self::wrap(fields, LogicalOp::Values { tuples })
    }

    pub fn table_modify(
        table: TableRef,
        input: LogicalRef,
        operation: ModifyOperation,
        update_columns: Option<Vec<String>>,
        flattened: bool,
    ) -> LogicalRef {
        Self::wrap(
            RowType::row_count(),
            LogicalOp::TableModify {
                table,
                input,
                operation,
                update_columns,
                flattened,
            },
        )
    }

    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    pub fn op(&self) -> &LogicalOp {
        &self.op
    }

    pub fn kind(&self) -> NodeKind {
        match &self.op {
            LogicalOp::TableScan { .. } => NodeKind::TableScan,
            LogicalOp::Join { .. } => NodeKind::Join,
            LogicalOp::Filter { .. } => NodeKind::Filter,
            LogicalOp::Project { .. } => NodeKind::Project,
            LogicalOp::Calc { .. } => NodeKind::Calc,
            LogicalOp::Aggregate { .. } => NodeKind::Aggregate,
            LogicalOp::Sort { .. } => NodeKind::Sort,
            LogicalOp::Union { .. } => NodeKind::Union,
            LogicalOp::Intersect { .. } => NodeKind::Intersect,
            LogicalOp::Minus { .. } => NodeKind::Minus,
            LogicalOp::Values { .. } => NodeKind::Values,
            LogicalOp::TableModify { .. } => NodeKind::TableModify,
        }
    }

    pub fn inputs(&self) -> Vec<&LogicalRef> {
        match &self.op {
            LogicalOp::TableScan { .. } | LogicalOp::Values { .. } => Vec::new(),
            LogicalOp::Join { left, right, .. } => vec![left, right],
            LogicalOp::Filter { input, .. }
            | LogicalOp::Project { input, .. }
            | LogicalOp::Calc { input, .. }
            | LogicalOp::Aggregate { input, .. }
            | LogicalOp::Sort { input, .. }
            | LogicalOp::TableModify { input, .. } => vec![input],
            LogicalOp::Union { inputs, .. }
            | LogicalOp::Intersect { inputs, .. }
            | LogicalOp::Minus { inputs, .. } => inputs.iter().collect(),
        }
    }
}

fn aggregate_row_type(input: &RowType, group_set: &[usize], agg_calls: &[AggregateCall]) -> RowType {
    let group_names = group_set.iter().map(|&g| {
        input
            .field(g)
            .map(str::to_string)
            .unwrap_or_else(|| format!("$f{g}"))
    });
    uniquify(group_names.chain(agg_calls.iter().map(|c| c.name.clone())))
}

fn set_op_row_type(inputs: &[LogicalRef]) -> RowType {
    inputs
        .first()
        .map(|i| i.row_type.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RemoteTable;

    fn emp() -> LogicalRef {
        LogicalNode::scan(
            RemoteTable::new(["emp"], RowType::new(["empno", "deptno", "sal"])).into_ref(),
        )
    }

    fn dept() -> LogicalRef {
        LogicalNode::scan(RemoteTable::new(["dept"], RowType::new(["deptno", "dname"])).into_ref())
    }

    #[test]
    fn test_join_row_type() {
        let join = LogicalNode::join(
            emp(),
            dept(),
            Rex::eq(Rex::input(1), Rex::input(3)),
            JoinType::Inner,
        );
        assert_eq!(
            join.row_type().fields(),
            &["empno", "deptno", "sal", "deptno0", "dname"]
        );
        assert_eq!(join.kind(), NodeKind::Join);
        assert_eq!(join.inputs().len(), 2);
    }

    #[test]
    fn test_aggregate_row_type_and_default_grouping_sets() {
        let agg = LogicalNode::aggregate(
            emp(),
            vec![1],
            vec![],
            vec![AggregateCall::new("SUM", vec![2], "total")],
        );
        assert_eq!(agg.row_type().fields(), &["deptno", "total"]);
        match agg.op() {
            LogicalOp::Aggregate { grouping_sets, .. } => {
                assert_eq!(grouping_sets, &vec![vec![1]]);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_table_modify_row_type() {
        let table = RemoteTable::new(["emp"], RowType::new(["empno"])).into_ref();
        let modify = LogicalNode::table_modify(
            table,
            emp(),
            ModifyOperation::Insert,
            None,
            false,
        );
        assert_eq!(modify.row_type(), &RowType::row_count());
    }

    #[test]
    fn test_set_op_takes_first_input_row_type() {
        let union = LogicalNode::union(vec![emp(), emp()], true);
        assert_eq!(union.row_type(), emp().row_type());
        assert_eq!(LogicalNode::minus(vec![], false).row_type().len(), 0);
    }
}
