// SPDX-License-Identifier: PMPL-1.0-or-later
//! Pushdown (physical) operators.
//!
//! One closed enum covers every operator kind. Every node is bound to a
//! [`Convention`]; construction rejects children bound to a different one,
//! so a mixed-convention tree cannot be built. Nodes are immutable and are
//! only created by the conversion rules or by [`PhysicalNode::copy_with_inputs`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use sqlpush_ast::Dialect;

use crate::error::PushdownError;
use crate::logical::{AggregateCall, FieldCollation, JoinType, ModifyOperation, NodeKind};
use crate::rex::{JoinInfo, Literal, Rex, RexProgram};
use crate::schema::{ModifiableHandle, QueryableHandle, RowType, TableRef};

pub type PhysicalRef = Arc<PhysicalNode>;

/// Execution target: one remote database reached through one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convention {
    name: String,
    dialect: Dialect,
}

impl Convention {
    /// Convention `name` generating SQL in `dialect`.
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            dialect,
        })
    }

    /// Convention name; tables hosted by it match on this.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dialect of the remote database.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name, self.dialect.product())
    }
}

/// Kind-specific attributes of a physical node.
#[derive(Debug, Clone)]
pub enum PhysicalOp {
    TableScan {
        table: TableRef,
    },
    Join {
        left: PhysicalRef,
        right: PhysicalRef,
        condition: Rex,
        join_type: JoinType,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },
    Filter {
        input: PhysicalRef,
        condition: Rex,
    },
    Project {
        input: PhysicalRef,
        projects: Vec<Rex>,
    },
    Calc {
        input: PhysicalRef,
        program: RexProgram,
    },
    Aggregate {
        input: PhysicalRef,
        group_set: Vec<usize>,
        grouping_sets: Vec<Vec<usize>>,
        agg_calls: Vec<AggregateCall>,
    },
    Sort {
        input: PhysicalRef,
        collation: Vec<FieldCollation>,
    },
    Union {
        inputs: Vec<PhysicalRef>,
        all: bool,
    },
    Intersect {
        inputs: Vec<PhysicalRef>,
        all: bool,
    },
    Minus {
        inputs: Vec<PhysicalRef>,
        all: bool,
    },
    Values {
        tuples: Vec<Vec<Literal>>,
    },
    TableModify {
        table: TableRef,
        input: PhysicalRef,
        operation: ModifyOperation,
        update_columns: Option<Vec<String>>,
        flattened: bool,
        modifiable: ModifiableHandle,
        queryable: QueryableHandle,
    },
}

/// A node known to be expressible as part of one remote SQL statement.
#[derive(Debug, Clone)]
pub struct PhysicalNode {
    convention: Arc<Convention>,
    row_type: RowType,
    op: PhysicalOp,
}

impl PhysicalNode {
    fn new(
        convention: &Arc<Convention>,
        row_type: RowType,
        op: PhysicalOp,
    ) -> Result<Self, PushdownError> {
        let node = Self {
            convention: Arc::clone(convention),
            row_type,
            op,
        };
        node.validate()?;
        Ok(node)
    }

    pub(crate) fn table_scan(
        convention: &Arc<Convention>,
        table: TableRef,
    ) -> Result<Self, PushdownError> {
        let row_type = table.row_type().clone();
        Self::new(convention, row_type, PhysicalOp::TableScan { table })
    }

    /// Equi-join; keys are derived from the condition.
    pub(crate) fn join(
        convention: &Arc<Convention>,
        row_type: RowType,
        left: PhysicalRef,
        right: PhysicalRef,
        condition: Rex,
        join_type: JoinType,
    ) -> Result<Self, PushdownError> {
        let info = JoinInfo::of(left.row_type.len(), right.row_type.len(), &condition);
        if !info.is_equi() {
            return Err(PushdownError::NonEquiJoin);
        }
        Self::new(
            convention,
            row_type,
            PhysicalOp::Join {
                left,
                right,
                condition,
                join_type,
                left_keys: info.left_keys,
                right_keys: info.right_keys,
            },
        )
    }

    pub(crate) fn filter(
        convention: &Arc<Convention>,
        input: PhysicalRef,
        condition: Rex,
    ) -> Result<Self, PushdownError> {
        let row_type = input.row_type.clone();
        Self::new(convention, row_type, PhysicalOp::Filter { input, condition })
    }

    pub(crate) fn project(
        convention: &Arc<Convention>,
        row_type: RowType,
        input: PhysicalRef,
        projects: Vec<Rex>,
    ) -> Result<Self, PushdownError> {
        Self::new(convention, row_type, PhysicalOp::Project { input, projects })
    }

    pub(crate) fn calc(
        convention: &Arc<Convention>,
        input: PhysicalRef,
        program: RexProgram,
    ) -> Result<Self, PushdownError> {
        let row_type = program.output_row_type().clone();
        Self::new(convention, row_type, PhysicalOp::Calc { input, program })
    }

    pub(crate) fn aggregate(
        convention: &Arc<Convention>,
        row_type: RowType,
        input: PhysicalRef,
        group_set: Vec<usize>,
        grouping_sets: Vec<Vec<usize>>,
        agg_calls: Vec<AggregateCall>,
    ) -> Result<Self, PushdownError> {
        Self::new(
            convention,
            row_type,
            PhysicalOp::Aggregate {
                input,
                group_set,
                grouping_sets,
                agg_calls,
            },
        )
    }

    pub(crate) fn sort(
        convention: &Arc<Convention>,
        input: PhysicalRef,
        collation: Vec<FieldCollation>,
    ) -> Result<Self, PushdownError> {
        let row_type = input.row_type.clone();
        Self::new(convention, row_type, PhysicalOp::Sort { input, collation })
    }

    /// Union, intersect or minus, selected by `kind`.
    pub(crate) fn set_op(
        convention: &Arc<Convention>,
        kind: NodeKind,
        row_type: RowType,
        inputs: Vec<PhysicalRef>,
        all: bool,
    ) -> Result<Self, PushdownError> {
        let op = match kind {
            NodeKind::Union => PhysicalOp::Union { inputs, all },
            NodeKind::Intersect => PhysicalOp::Intersect { inputs, all },
            NodeKind::Minus => PhysicalOp::Minus { inputs, all },
            other => {
                return Err(PushdownError::InputArity {
                    operator: other.name(),
                    expected: 0,
                    actual: inputs.len(),
                })
            }
        };
        Self::new(convention, row_type, op)
    }

    pub(crate) fn values(
        convention: &Arc<Convention>,
        row_type: RowType,
        tuples: Vec<Vec<Literal>>,
    ) -> Result<Self, PushdownError> {
        Self::new(convention, row_type, PhysicalOp::Values { tuples })
    }

    /// Table modification; the table must be modifiable and queryable.
    pub(crate) fn table_modify(
        convention: &Arc<Convention>,
        table: TableRef,
        input: PhysicalRef,
        operation: ModifyOperation,
        update_columns: Option<Vec<String>>,
        flattened: bool,
    ) -> Result<Self, PushdownError> {
        let modifiable = table
            .as_modifiable()
            .ok_or_else(|| PushdownError::MissingCapability {
                table: table.display_name(),
                capability: "modifiable",
            })?;
        let queryable = table
            .as_queryable()
            .ok_or_else(|| PushdownError::MissingCapability {
                table: table.display_name(),
                capability: "queryable",
            })?;
        Self::new(
            convention,
            RowType::row_count(),
            PhysicalOp::TableModify {
                table,
                input,
                operation,
                update_columns,
                flattened,
                modifiable,
                queryable,
            },
        )
    }

    fn validate(&self) -> Result<(), PushdownError> {
        for input in self.inputs() {
            if input.convention != self.convention {
                return Err(PushdownError::MixedConvention {
                    expected: self.convention.to_string(),
                    found: input.convention.to_string(),
                });
            }
        }
        match &self.op {
            PhysicalOp::Join {
                left,
                right,
                condition,
                left_keys,
                right_keys,
                ..
            } => {
                let info = JoinInfo::of(left.row_type.len(), right.row_type.len(), condition);
                if !info.is_equi() || &info.left_keys != left_keys || &info.right_keys != right_keys
                {
                    return Err(PushdownError::NonEquiJoin);
                }
            }
            PhysicalOp::Filter { input, condition } => {
                check_refs(condition, input.row_type.len())?;
            }
            PhysicalOp::Project { input, projects } => {
                if projects.len() != self.row_type.len() {
                    return Err(PushdownError::FieldOutOfRange {
                        ordinal: projects.len(),
                        count: self.row_type.len(),
                    });
                }
                for project in projects {
                    check_refs(project, input.row_type.len())?;
                }
            }
            PhysicalOp::Aggregate {
                input,
                group_set,
                grouping_sets,
                agg_calls,
            } => validate_aggregate(input.row_type.len(), group_set, grouping_sets, agg_calls)?,
            PhysicalOp::Sort { input, collation } => {
                if let Some(bad) = collation.iter().find(|c| c.field >= input.row_type.len()) {
                    return Err(PushdownError::FieldOutOfRange {
                        ordinal: bad.field,
                        count: input.row_type.len(),
                    });
                }
            }
            PhysicalOp::Union { inputs, .. } if inputs.is_empty() => {
                return Err(PushdownError::InputArity {
                    operator: "Union",
                    expected: 1,
                    actual: 0,
                });
            }
            PhysicalOp::Intersect { all: true, .. } => {
                return Err(PushdownError::SetOperatorAll("INTERSECT"));
            }
            PhysicalOp::Minus { all: true, .. } => {
                return Err(PushdownError::SetOperatorAll("EXCEPT"));
            }
            PhysicalOp::Values { tuples } => {
                if let Some(bad) = tuples.iter().find(|t| t.len() != self.row_type.len()) {
                    return Err(PushdownError::FieldOutOfRange {
                        ordinal: bad.len(),
                        count: self.row_type.len(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Convention this node is bound to.
    pub fn convention(&self) -> &Arc<Convention> {
        &self.convention
    }

    /// Output row type.
    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    /// Operator and its operator-specific state.
    pub fn op(&self) -> &PhysicalOp {
        &self.op
    }

    /// Operator kind, without its state.
    pub fn kind(&self) -> NodeKind {
        match &self.op {
            PhysicalOp::TableScan { .. } => NodeKind::TableScan,
            PhysicalOp::Join { .. } => NodeKind::Join,
            PhysicalOp::Filter { .. } => NodeKind::Filter,
            PhysicalOp::Project { .. } => NodeKind::Project,
            PhysicalOp::Calc { .. } => NodeKind::Calc,
            PhysicalOp::Aggregate { .. } => NodeKind::Aggregate,
            PhysicalOp::Sort { .. } => NodeKind::Sort,
            PhysicalOp::Union { .. } => NodeKind::Union,
            PhysicalOp::Intersect { .. } => NodeKind::Intersect,
            PhysicalOp::Minus { .. } => NodeKind::Minus,
            PhysicalOp::Values { .. } => NodeKind::Values,
            PhysicalOp::TableModify { .. } => NodeKind::TableModify,
        }
    }

    /// Child nodes, left to right.
    pub fn inputs(&self) -> Vec<&PhysicalRef> {
        match &self.op {
            PhysicalOp::TableScan { .. } | PhysicalOp::Values { .. } => Vec::new(),
            PhysicalOp::Join { left, right, .. } => vec![left, right],
            PhysicalOp::Filter { input, .. }
            | PhysicalOp::Project { input, .. }
            | PhysicalOp::Calc { input, .. }
            | PhysicalOp::Aggregate { input, .. }
            | PhysicalOp::Sort { input, .. }
            | PhysicalOp::TableModify { input, .. } => vec![input],
            PhysicalOp::Union { inputs, .. }
            | PhysicalOp::Intersect { inputs, .. }
            | PhysicalOp::Minus { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Rebuild this node over new inputs, keeping convention, kind and
    /// attributes.
    ///
    /// Every construction check runs again; a failure here means the caller
    /// restructured the tree into an impossible shape and is returned as an
    /// internal error rather than a declined match.
    pub fn copy_with_inputs(&self, inputs: Vec<PhysicalRef>) -> Result<PhysicalNode, PushdownError> {
        let kind = self.kind();
        let expected = match kind {
            NodeKind::TableScan | NodeKind::Values => 0,
            NodeKind::Join => 2,
            NodeKind::Union | NodeKind::Intersect | NodeKind::Minus => inputs.len().max(1),
            _ => 1,
        };
        if inputs.len() != expected {
            return Err(PushdownError::InputArity {
                operator: kind.name(),
                expected,
                actual: inputs.len(),
            });
        }
        let mut inputs = inputs.into_iter();
        let mut next = move || inputs.next();
        let conv = &self.convention;
        let row_type = self.row_type.clone();
        match &self.op {
            PhysicalOp::TableScan { table } => Self::table_scan(conv, Arc::clone(table)),
            PhysicalOp::Values { tuples } => Self::values(conv, row_type, tuples.clone()),
            PhysicalOp::Join {
                condition,
                join_type,
                ..
            } => match (next(), next()) {
                (Some(left), Some(right)) => {
                    Self::join(conv, row_type, left, right, condition.clone(), *join_type)
                }
                _ => Err(arity(kind, 2)),
            },
            PhysicalOp::Union { all, .. }
            | PhysicalOp::Intersect { all, .. }
            | PhysicalOp::Minus { all, .. } => {
                Self::set_op(conv, kind, row_type, std::iter::from_fn(next).collect(), *all)
            }
            op => {
                let input = next().ok_or_else(|| arity(kind, 1))?;
                match op {
                    PhysicalOp::Filter { condition, .. } => {
                        Self::filter(conv, input, condition.clone())
                    }
                    PhysicalOp::Project { projects, .. } => {
                        Self::project(conv, row_type, input, projects.clone())
                    }
                    PhysicalOp::Calc { program, .. } => Self::calc(conv, input, program.clone()),
                    PhysicalOp::Aggregate {
                        group_set,
                        grouping_sets,
                        agg_calls,
                        ..
                    } => Self::aggregate(
                        conv,
                        row_type,
                        input,
                        group_set.clone(),
                        grouping_sets.clone(),
                        agg_calls.clone(),
                    ),
                    PhysicalOp::Sort { collation, .. } => {
                        Self::sort(conv, input, collation.clone())
                    }
                    PhysicalOp::TableModify {
                        table,
                        operation,
                        update_columns,
                        flattened,
                        ..
                    } => Self::table_modify(
                        conv,
                        Arc::clone(table),
                        input,
                        *operation,
                        update_columns.clone(),
                        *flattened,
                    ),
                    _ => Err(arity(kind, 1)),
                }
            }
        }
    }
}

fn arity(kind: NodeKind, expected: usize) -> PushdownError {
    PushdownError::InputArity {
        operator: kind.name(),
        expected,
        actual: 0,
    }
}

fn check_refs(rex: &Rex, count: usize) -> Result<(), PushdownError> {
    match rex.max_input_ref() {
        Some(ordinal) if ordinal >= count => Err(PushdownError::FieldOutOfRange { ordinal, count }),
        _ => Ok(()),
    }
}

fn validate_aggregate(
    input_len: usize,
    group_set: &[usize],
    grouping_sets: &[Vec<usize>],
    agg_calls: &[AggregateCall],
) -> Result<(), PushdownError> {
    let mut groups = HashSet::with_capacity(group_set.len());
    for &g in group_set {
        if g >= input_len {
            return Err(PushdownError::InvalidAggregate(format!(
                "group column {g} out of range"
            )));
        }
        if !groups.insert(g) {
            return Err(PushdownError::InvalidAggregate(format!(
                "duplicate group column {g}"
            )));
        }
    }
    let mut seen_sets = HashSet::with_capacity(grouping_sets.len());
    for set in grouping_sets {
        if set.iter().any(|g| !groups.contains(g)) {
            return Err(PushdownError::InvalidAggregate(format!(
                "grouping set {set:?} is not contained in the group set"
            )));
        }
        let mut sorted = set.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != set.len() {
            return Err(PushdownError::InvalidAggregate(format!(
                "grouping set {set:?} repeats a column"
            )));
        }
        if !seen_sets.insert(sorted) {
            return Err(PushdownError::InvalidAggregate(format!(
                "duplicate grouping set {set:?}"
            )));
        }
    }
    let simple = match grouping_sets {
        [only] => only.len() == group_set.len(),
        _ => false,
    };
    if !simple {
        return Err(PushdownError::InvalidAggregate(
            "only a single grouping set equal to the group set can be pushed down".to_string(),
        ));
    }
    for call in agg_calls {
        if let Some(arg) = call.args.iter().find(|&&a| a >= input_len) {
            return Err(PushdownError::InvalidAggregate(format!(
                "argument {arg} of {} out of range",
                call.name
            )));
        }
    }
    Ok(())
}
