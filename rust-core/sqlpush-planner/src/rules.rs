// SPDX-License-Identifier: PMPL-1.0-or-later
//! Conversion rules.
//!
//! One rule per logical operator kind. A rule converts its own inputs
//! through an [`InputConverter`], applies its feasibility check, and either
//! builds the pushdown node or declines with `Ok(None)`. Declining is a
//! normal outcome of plan search and is only logged at debug level.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::PushdownError;
use crate::logical::{LogicalNode, LogicalOp, LogicalRef, NodeKind};
use crate::physical::{Convention, PhysicalNode, PhysicalRef};
use crate::rex::JoinInfo;

/// Converts a rule's inputs into the rule's convention.
pub trait InputConverter {
    fn convert_input(&self, input: &LogicalRef) -> Result<Option<PhysicalRef>, PushdownError>;
}

/// A rewrite from one logical operator kind to its pushdown counterpart.
///
/// Rules hold no mutable state and may run concurrently on independent
/// subtrees.
pub trait ConversionRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// The logical operator kind this rule matches.
    fn operand(&self) -> NodeKind;

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError>;
}

fn declined(rule: &dyn ConversionRule, reason: &str) -> Result<Option<PhysicalNode>, PushdownError> {
    debug!(rule = rule.name(), reason, "conversion declined");
    Ok(None)
}

/// Convert every input, or `None` if any input does not convert.
fn convert_all(
    inputs: &dyn InputConverter,
    nodes: &[LogicalRef],
) -> Result<Option<Vec<PhysicalRef>>, PushdownError> {
    let mut converted = Vec::with_capacity(nodes.len());
    for node in nodes {
        match inputs.convert_input(node)? {
            Some(physical) => converted.push(physical),
            None => return Ok(None),
        }
    }
    Ok(Some(converted))
}

macro_rules! sole_input {
    ($rule:expr, $inputs:expr, $input:expr) => {
        match $inputs.convert_input($input)? {
            Some(physical) => physical,
            None => return declined($rule, "input did not convert"),
        }
    };
}

#[derive(Debug)]
pub struct TableScanRule {
    convention: Arc<Convention>,
}

impl ConversionRule for TableScanRule {
    fn name(&self) -> &'static str {
        "PushdownTableScanRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::TableScan
    }

    fn convert(
        &self,
        node: &LogicalNode,
        _inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::TableScan { table } = node.op() else {
            return Ok(None);
        };
        if table.convention_name() != Some(self.convention.name()) {
            return declined(self, "table is not hosted by this convention");
        }
        PhysicalNode::table_scan(&self.convention, Arc::clone(table)).map(Some)
    }
}

#[derive(Debug)]
pub struct JoinRule {
    convention: Arc<Convention>,
}

impl ConversionRule for JoinRule {
    fn name(&self) -> &'static str {
        "PushdownJoinRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Join
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Join {
            left,
            right,
            condition,
            join_type,
        } = node.op()
        else {
            return Ok(None);
        };
        let left = sole_input!(self, inputs, left);
        let right = sole_input!(self, inputs, right);
        let info = JoinInfo::of(left.row_type().len(), right.row_type().len(), condition);
        if !info.is_equi() {
            return declined(self, "condition is not an equi-join");
        }
        if info.left_keys.is_empty() {
            return declined(self, "condition has no equi-join keys");
        }
        match PhysicalNode::join(
            &self.convention,
            node.row_type().clone(),
            left,
            right,
            condition.clone(),
            *join_type,
        ) {
            Ok(join) => Ok(Some(join)),
            Err(err) => {
                debug!(rule = self.name(), error = %err, "invalid join, declining");
                Ok(None)
            }
        }
    }
}

#[derive(Debug)]
pub struct CalcRule {
    convention: Arc<Convention>,
}

impl ConversionRule for CalcRule {
    fn name(&self) -> &'static str {
        "PushdownCalcRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Calc
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Calc { input, program } = node.op() else {
            return Ok(None);
        };
        if program.contains_multiset() {
            return declined(self, "program uses multiset expressions");
        }
        let input = sole_input!(self, inputs, input);
        PhysicalNode::calc(&self.convention, input, program.clone()).map(Some)
    }
}

#[derive(Debug)]
pub struct ProjectRule {
    convention: Arc<Convention>,
}

impl ConversionRule for ProjectRule {
    fn name(&self) -> &'static str {
        "PushdownProjectRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Project
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Project { input, projects } = node.op() else {
            return Ok(None);
        };
        let input = sole_input!(self, inputs, input);
        PhysicalNode::project(
            &self.convention,
            node.row_type().clone(),
            input,
            projects.clone(),
        )
        .map(Some)
    }
}

#[derive(Debug)]
pub struct FilterRule {
    convention: Arc<Convention>,
}

impl ConversionRule for FilterRule {
    fn name(&self) -> &'static str {
        "PushdownFilterRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Filter { input, condition } = node.op() else {
            return Ok(None);
        };
        let input = sole_input!(self, inputs, input);
        PhysicalNode::filter(&self.convention, input, condition.clone()).map(Some)
    }
}

#[derive(Debug)]
pub struct AggregateRule {
    convention: Arc<Convention>,
}

impl ConversionRule for AggregateRule {
    fn name(&self) -> &'static str {
        "PushdownAggregateRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Aggregate
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Aggregate {
            input,
            group_set,
            grouping_sets,
            agg_calls,
        } = node.op()
        else {
            return Ok(None);
        };
        let input = sole_input!(self, inputs, input);
        match PhysicalNode::aggregate(
            &self.convention,
            node.row_type().clone(),
            input,
            group_set.clone(),
            grouping_sets.clone(),
            agg_calls.clone(),
        ) {
            Ok(aggregate) => Ok(Some(aggregate)),
            Err(err) => {
                debug!(rule = self.name(), error = %err, "invalid aggregate, declining");
                Ok(None)
            }
        }
    }
}

#[derive(Debug)]
pub struct SortRule {
    convention: Arc<Convention>,
}

impl ConversionRule for SortRule {
    fn name(&self) -> &'static str {
        "PushdownSortRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Sort
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Sort {
            input,
            collation,
            offset,
            fetch,
        } = node.op()
        else {
            return Ok(None);
        };
        if offset.is_some() || fetch.is_some() {
            return declined(self, "OFFSET/FETCH cannot be pushed down");
        }
        let input = sole_input!(self, inputs, input);
        PhysicalNode::sort(&self.convention, input, collation.clone()).map(Some)
    }
}

/// Union, intersect and minus share one rule shape.
#[derive(Debug)]
pub struct SetOpRule {
    convention: Arc<Convention>,
    kind: NodeKind,
}

impl ConversionRule for SetOpRule {
    fn name(&self) -> &'static str {
        match self.kind {
            NodeKind::Union => "PushdownUnionRule",
            NodeKind::Intersect => "PushdownIntersectRule",
            _ => "PushdownMinusRule",
        }
    }

    fn operand(&self) -> NodeKind {
        self.kind
    }

    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let (children, all) = match node.op() {
            LogicalOp::Union { inputs, all } if self.kind == NodeKind::Union => (inputs, *all),
            LogicalOp::Intersect { inputs, all } if self.kind == NodeKind::Intersect => {
                (inputs, *all)
            }
            LogicalOp::Minus { inputs, all } if self.kind == NodeKind::Minus => (inputs, *all),
            _ => return Ok(None),
        };
        if all && self.kind != NodeKind::Union {
            return declined(self, "ALL variant cannot be pushed down");
        }
        let Some(converted) = convert_all(inputs, children)? else {
            return declined(self, "an input did not convert");
        };
        PhysicalNode::set_op(
            &self.convention,
            self.kind,
            node.row_type().clone(),
            converted,
            all,
        )
        .map(Some)
    }
}

#[derive(Debug)]
pub struct TableModifyRule {
    convention: Arc<Convention>,
}

impl ConversionRule for TableModifyRule {
    fn name(&self) -> &'static str {
        "PushdownTableModifyRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::TableModify
    }

    /// Declines a table that is not modifiable. A table that passes that
    /// check but cannot be constructed (no queryable expression) is an error.
    fn convert(
        &self,
        node: &LogicalNode,
        inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::TableModify {
            table,
            input,
            operation,
            update_columns,
            flattened,
        } = node.op()
        else {
            return Ok(None);
        };
        if table.as_modifiable().is_none() {
            return declined(self, "table is not modifiable");
        }
        let input = sole_input!(self, inputs, input);
        PhysicalNode::table_modify(
            &self.convention,
            Arc::clone(table),
            input,
            *operation,
            update_columns.clone(),
            *flattened,
        )
        .map(Some)
    }
}

#[derive(Debug)]
pub struct ValuesRule {
    convention: Arc<Convention>,
}

impl ConversionRule for ValuesRule {
    fn name(&self) -> &'static str {
        "PushdownValuesRule"
    }

    fn operand(&self) -> NodeKind {
        NodeKind::Values
    }

    fn convert(
        &self,
        node: &LogicalNode,
        _inputs: &dyn InputConverter,
    ) -> Result<Option<PhysicalNode>, PushdownError> {
        let LogicalOp::Values { tuples } = node.op() else {
            return Ok(None);
        };
        PhysicalNode::values(&self.convention, node.row_type().clone(), tuples.clone()).map(Some)
    }
}

/// All pushdown rules for `convention`, in registration order.
pub fn rules(convention: &Arc<Convention>) -> Vec<Arc<dyn ConversionRule>> {
    let c = || Arc::clone(convention);
    vec![
        Arc::new(TableScanRule { convention: c() }),
        Arc::new(JoinRule { convention: c() }),
        Arc::new(CalcRule { convention: c() }),
        Arc::new(ProjectRule { convention: c() }),
        Arc::new(FilterRule { convention: c() }),
        Arc::new(AggregateRule { convention: c() }),
        Arc::new(SortRule { convention: c() }),
        Arc::new(SetOpRule {
            convention: c(),
            kind: NodeKind::Union,
        }),
        Arc::new(SetOpRule {
            convention: c(),
            kind: NodeKind::Intersect,
        }),
        Arc::new(SetOpRule {
            convention: c(),
            kind: NodeKind::Minus,
        }),
        Arc::new(TableModifyRule { convention: c() }),
        Arc::new(ValuesRule { convention: c() }),
    ]
}

/// A registered rule list that converts whole subtrees.
#[derive(Debug, Clone)]
pub struct RuleSet {
    convention: Arc<Convention>,
    rules: Vec<Arc<dyn ConversionRule>>,
}

impl RuleSet {
    pub fn new(convention: Arc<Convention>) -> Self {
        let rules = rules(&convention);
        Self { convention, rules }
    }

    pub fn with_rules(convention: Arc<Convention>, rules: Vec<Arc<dyn ConversionRule>>) -> Self {
        Self { convention, rules }
    }

    pub fn convention(&self) -> &Arc<Convention> {
        &self.convention
    }

    pub fn rules(&self) -> &[Arc<dyn ConversionRule>] {
        &self.rules
    }

    /// Convert `node` with the first matching rule that accepts it.
    pub fn convert(&self, node: &LogicalNode) -> Result<Option<PhysicalNode>, PushdownError> {
        for rule in self.rules.iter().filter(|r| r.operand() == node.kind()) {
            if let Some(physical) = rule.convert(node, self)? {
                return Ok(Some(physical));
            }
        }
        Ok(None)
    }
}

impl InputConverter for RuleSet {
    fn convert_input(&self, input: &LogicalRef) -> Result<Option<PhysicalRef>, PushdownError> {
        Ok(self.convert(input)?.map(Arc::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpush_ast::{DatabaseProduct, Dialect};

    use crate::logical::{AggregateCall, FieldCollation, JoinType};
    use crate::rex::{Operator, Rex, RexProgram};
    use crate::schema::{RemoteTable, RowType};

    fn rule_set() -> RuleSet {
        RuleSet::new(Convention::new("jdbc", Dialect::of(DatabaseProduct::Postgres)))
    }

    fn scan(name: &str, fields: &[&str]) -> LogicalRef {
        LogicalNode::scan(
            RemoteTable::new([name], RowType::new(fields.iter().copied()))
                .hosted_by("jdbc")
                .into_ref(),
        )
    }

    #[test]
    fn test_registration_order() {
        let names: Vec<_> = rule_set().rules().iter().map(|r| r.operand()).collect();
        assert_eq!(
            names,
            vec![
                NodeKind::TableScan,
                NodeKind::Join,
                NodeKind::Calc,
                NodeKind::Project,
                NodeKind::Filter,
                NodeKind::Aggregate,
                NodeKind::Sort,
                NodeKind::Union,
                NodeKind::Intersect,
                NodeKind::Minus,
                NodeKind::TableModify,
                NodeKind::Values,
            ]
        );
    }

    #[test]
    fn test_foreign_table_declined() {
        let local = LogicalNode::scan(RemoteTable::new(["t"], RowType::new(["a"])).into_ref());
        assert!(rule_set().convert(&local).unwrap().is_none());
        let filter = LogicalNode::filter(local, Rex::boolean(true));
        assert!(rule_set().convert(&filter).unwrap().is_none());
    }

    #[test]
    fn test_cross_join_declined() {
        let join = LogicalNode::join(
            scan("a", &["x"]),
            scan("b", &["y"]),
            Rex::boolean(true),
            JoinType::Inner,
        );
        assert!(rule_set().convert(&join).unwrap().is_none());
    }

    #[test]
    fn test_calc_with_multiset_declined() {
        let input = scan("a", &["x"]);
        let program = RexProgram::from_projects(
            input.row_type().clone(),
            vec![Rex::call(Operator::Cardinality, vec![Rex::input(0)])],
            None,
            RowType::new(["n"]),
        )
        .unwrap();
        let calc = LogicalNode::calc(input, program);
        assert!(rule_set().convert(&calc).unwrap().is_none());
    }

    #[test]
    fn test_sort_with_fetch_declined() {
        let sort = LogicalNode::sort(
            scan("a", &["x"]),
            vec![FieldCollation::asc(0)],
            None,
            Some(Rex::int(10)),
        );
        assert!(rule_set().convert(&sort).unwrap().is_none());
        let plain = LogicalNode::sort(scan("a", &["x"]), vec![FieldCollation::asc(0)], None, None);
        assert!(rule_set().convert(&plain).unwrap().is_some());
    }

    #[test]
    fn test_invalid_aggregate_declined_not_raised() {
        let agg = LogicalNode::aggregate(
            scan("a", &["x", "y"]),
            vec![0, 1],
            vec![vec![0, 1], vec![0], vec![]],
            vec![AggregateCall::count_star("c")],
        );
        assert!(rule_set().convert(&agg).unwrap().is_none());
    }

    #[test]
    fn test_union_requires_every_input() {
        let foreign = LogicalNode::scan(RemoteTable::new(["t"], RowType::new(["x"])).into_ref());
        let union = LogicalNode::union(vec![scan("a", &["x"]), foreign], true);
        assert!(rule_set().convert(&union).unwrap().is_none());
    }

    #[test]
    fn test_disabled_rule_set_converts_nothing() {
        let convention = Convention::new("jdbc", Dialect::default());
        let empty = RuleSet::with_rules(convention, Vec::new());
        assert!(empty.convert(&scan("a", &["x"])).unwrap().is_none());
    }
}
