// SPDX-License-Identifier: PMPL-1.0-or-later
//! sqlpush planner
//!
//! Decides which fragments of a logical plan can run as one remote SQL
//! statement and compiles them. Conversion rules rewrite logical nodes into
//! convention-bound pushdown nodes; each pushdown node reports a row
//! estimate and self-cost for the external plan search; `compile_to_sql`
//! folds a pushdown tree bottom-up into a single SQL AST.
//!
//! Everything here is synchronous and free of shared mutable state. Rules
//! may be invoked concurrently on independent subtrees; one compilation
//! pass is sequential.

pub mod config;
pub mod cost;
mod emit;
pub mod error;
pub mod implementor;
pub mod logical;
pub mod physical;
pub mod rex;
pub mod rules;
pub mod schema;
pub mod translate;

pub use config::PushdownConfig;
pub use cost::{Cost, CostModel, DefaultCostModel, DefaultStatistics, Statistics};
pub use error::PushdownError;
pub use implementor::{Clause, ClauseSet, Emission, SqlImplementor};
pub use logical::{
    AggregateCall, Direction, FieldCollation, JoinType, LogicalNode, LogicalOp, LogicalRef,
    ModifyOperation, NodeKind, NullDirection,
};
pub use physical::{Convention, PhysicalNode, PhysicalOp, PhysicalRef};
pub use rex::{JoinInfo, Literal, Operator, Rex, RexProgram};
pub use rules::{rules, ConversionRule, InputConverter, RuleSet};
pub use schema::{ModifiableHandle, QueryableHandle, RemoteTable, RowType, Table, TableRef};
pub use sqlpush_ast::{DatabaseProduct, Dialect, SqlStatement};
