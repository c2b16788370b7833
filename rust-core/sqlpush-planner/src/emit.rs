// SPDX-License-Identifier: PMPL-1.0-or-later
//! Per-operator SQL emission.

use sqlpush_ast::{Join, JoinKind, Select, SetOperator, SqlNode, SqlOperator};
use tracing::trace;

use crate::error::PushdownError;
use crate::implementor::{add_select, AliasSource, Clause, ClauseSet, Context, Emission, SqlImplementor};
use crate::logical::JoinType;
use crate::physical::{PhysicalNode, PhysicalOp, PhysicalRef};
use crate::rex::is_identity;
use crate::translate::literal_to_sql;

fn join_kind(join_type: JoinType) -> JoinKind {
    match join_type {
        JoinType::Inner => JoinKind::Inner,
        JoinType::Left => JoinKind::Left,
        JoinType::Right => JoinKind::Right,
        JoinType::Full => JoinKind::Full,
    }
}

impl SqlImplementor {
    /// Emit `node` and its inputs, bottom-up.
    pub fn visit(&mut self, node: &PhysicalNode) -> Result<Emission, PushdownError> {
        trace!(operator = node.kind().name(), "emitting");
        let fields = node.row_type();
        match node.op() {
            PhysicalOp::TableScan { table } => {
                let name = table.qualified_name();
                let alias = self
                    .aliases
                    .reserve(name.last().map(String::as_str).unwrap_or("t"));
                Ok(Emission::new(
                    SqlNode::Identifier(name.to_vec()),
                    ClauseSet::of(&[Clause::From]),
                    vec![AliasSource::new(alias.clone(), fields)],
                    fields.clone(),
                )
                .with_alias(alias))
            }

            PhysicalOp::Join {
                left,
                right,
                join_type,
                left_keys,
                right_keys,
                ..
            } => {
                let left = self.visit(left)?;
                let right = self.visit(right)?;
                let (left_from, left_sources) = left.into_from(&mut self.aliases);
                let (right_from, right_sources) = right.into_from(&mut self.aliases);
                let left_context = Context::aliased(left_sources.clone(), true);
                let right_context = Context::aliased(right_sources.clone(), true);
                let equalities = left_keys
                    .iter()
                    .zip(right_keys)
                    .map(|(&l, &r)| -> Result<SqlNode, PushdownError> {
                        Ok(SqlNode::call(
                            SqlOperator::Eq,
                            vec![left_context.field(l)?, right_context.field(r)?],
                        ))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let join = Join {
                    left: left_from,
                    kind: join_kind(*join_type),
                    right: right_from,
                    condition: SqlNode::and_all(equalities),
                };
                let mut sources = left_sources;
                sources.extend(right_sources);
                Ok(Emission::new(
                    SqlNode::Join(Box::new(join)),
                    ClauseSet::of(&[Clause::From]),
                    sources,
                    fields.clone(),
                ))
            }

            PhysicalOp::Filter { input, condition } => {
                let child = self.visit(input)?;
                let mut builder = child.builder(&[Clause::Where], &mut self.aliases);
                let condition = builder.context().to_sql(condition)?;
                builder.set_where(condition);
                Ok(builder.finish(fields))
            }

            PhysicalOp::Project { input, projects } => {
                let child = self.visit(input)?;
                if is_identity(projects, input.row_type().len()) && fields == input.row_type() {
                    return Ok(child);
                }
                let mut builder = child.builder(&[Clause::Select], &mut self.aliases);
                let mut items = Vec::with_capacity(projects.len());
                for project in projects {
                    let expr = builder.context().to_sql(project)?;
                    add_select(&mut items, expr, fields);
                }
                builder.set_select(items);
                Ok(builder.finish(fields))
            }

            PhysicalOp::Calc { input, program } => {
                let child = self.visit(input)?;
                let star = program.is_star();
                if star && !program.has_condition() {
                    return Ok(child);
                }
                let requested: &[Clause] = if program.has_condition() {
                    &[Clause::From, Clause::Where]
                } else {
                    &[Clause::From]
                };
                let mut builder = child.builder(requested, &mut self.aliases);
                if !star {
                    let mut items = Vec::with_capacity(fields.len());
                    for project in program.project_exprs()? {
                        let expr = builder.context().to_sql(&project)?;
                        add_select(&mut items, expr, fields);
                    }
                    builder.set_select(items);
                }
                if let Some(condition) = program.condition_expr()? {
                    let condition = builder.context().to_sql(&condition)?;
                    builder.set_where(condition);
                }
                Ok(builder.finish(fields))
            }

            PhysicalOp::Aggregate {
                input,
                group_set,
                agg_calls,
                ..
            } => {
                // SELECT a, b, SUM(x) FROM (...) GROUP BY a, b
                let child = self.visit(input)?;
                let mut builder =
                    child.builder_for_keys(&[Clause::GroupBy], group_set, &mut self.aliases);
                let mut items = Vec::with_capacity(fields.len());
                let mut group_by = Vec::with_capacity(group_set.len());
                for &group in group_set {
                    let field = builder.context().field(group)?;
                    add_select(&mut items, field.clone(), fields);
                    group_by.push(field);
                }
                for call in agg_calls {
                    let expr = builder.context().aggregate_to_sql(call)?;
                    add_select(&mut items, expr, fields);
                }
                builder.set_select(items);
                // An empty GROUP BY is dropped when an aggregate call already
                // makes this an aggregate query.
                if !group_by.is_empty() || agg_calls.is_empty() {
                    builder.set_group_by(group_by);
                }
                Ok(builder.finish(fields))
            }

            PhysicalOp::Sort { input, collation } => {
                let child = self.visit(input)?;
                let keys: Vec<usize> = collation.iter().map(|key| key.field).collect();
                let mut builder =
                    child.builder_for_keys(&[Clause::OrderBy], &keys, &mut self.aliases);
                let mut items = Vec::with_capacity(collation.len());
                for key in collation {
                    items.extend(builder.context().collation_to_sql(key, &self.dialect)?);
                }
                builder.set_order_by(items);
                Ok(builder.finish(fields))
            }

            PhysicalOp::Union { inputs, all } => {
                let operator = if *all {
                    SetOperator::UnionAll
                } else {
                    SetOperator::Union
                };
                self.set_op(operator, inputs, node)
            }
            PhysicalOp::Intersect { inputs, all } => {
                let operator = if *all {
                    SetOperator::IntersectAll
                } else {
                    SetOperator::Intersect
                };
                self.set_op(operator, inputs, node)
            }
            PhysicalOp::Minus { inputs, all } => {
                let operator = if *all {
                    SetOperator::ExceptAll
                } else {
                    SetOperator::Except
                };
                self.set_op(operator, inputs, node)
            }

            PhysicalOp::Values { tuples } => {
                let mut selects = tuples
                    .iter()
                    .map(|tuple| {
                        let items = tuple
                            .iter()
                            .zip(fields.fields())
                            .map(|(literal, name)| SqlNode::alias(literal_to_sql(literal), name.as_str()))
                            .collect();
                        SqlNode::select(Select::values(items))
                    })
                    .collect::<Vec<_>>();
                match selects.len() {
                    0 => Err(PushdownError::EmptyValues),
                    1 => Ok(Emission::new(
                        selects.remove(0),
                        ClauseSet::of(&[Clause::Select]),
                        Vec::new(),
                        fields.clone(),
                    )),
                    _ => Ok(Emission::new(
                        SqlNode::SetOp {
                            operator: SetOperator::UnionAll,
                            inputs: selects,
                        },
                        ClauseSet::of(&[Clause::SetOp]),
                        Vec::new(),
                        fields.clone(),
                    )),
                }
            }

            PhysicalOp::TableModify { .. } => Err(PushdownError::UnsupportedEmission("TableModify")),
        }
    }

    fn set_op(
        &mut self,
        operator: SetOperator,
        inputs: &[PhysicalRef],
        node: &PhysicalNode,
    ) -> Result<Emission, PushdownError> {
        let mut queries = Vec::with_capacity(inputs.len());
        for input in inputs {
            let emission = self.visit(input)?;
            queries.push(emission.into_query(&mut self.aliases));
        }
        Ok(Emission::new(
            SqlNode::SetOp {
                operator,
                inputs: queries,
            },
            ClauseSet::of(&[Clause::SetOp]),
            Vec::new(),
            node.row_type().clone(),
        ))
    }
}
