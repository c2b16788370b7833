// SPDX-License-Identifier: PMPL-1.0-or-later
//! SQL builder and clause merger.
//!
//! Compilation folds the physical tree bottom-up. Each operator receives its
//! children's [`Emission`]s by value and either extends the child's
//! in-progress `SELECT` or wraps it as a derived table in a new one. The
//! choice depends only on the clauses the child has already consumed:
//!
//! ```text
//! SELECT < FROM < WHERE < GROUP BY < HAVING < ORDER BY      (SET_OP apart)
//! ```
//!
//! A parent that needs clause `k` extends the child when `k` is unconsumed
//! and nothing after `k` has been consumed; otherwise it wraps.

use std::collections::{BTreeSet, HashSet};

use sqlpush_ast::{Dialect, OrderByItem, Select, SqlNode, SqlStatement};
use tracing::{debug, trace};

use crate::error::PushdownError;
use crate::physical::PhysicalNode;
use crate::schema::RowType;

/// SQL clause categories in clause order; `SetOp` sits outside the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    SetOp,
}

/// Clauses already consumed by an emission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClauseSet(BTreeSet<Clause>);

impl ClauseSet {
    /// Set holding exactly `clauses`.
    pub fn of(clauses: &[Clause]) -> Self {
        Self(clauses.iter().copied().collect())
    }

    /// Whether `clause` has been consumed.
    pub fn contains(&self, clause: Clause) -> bool {
        self.0.contains(&clause)
    }

    /// Mark `clause` as consumed.
    pub fn insert(&mut self, clause: Clause) {
        self.0.insert(clause);
    }

    /// Consumed clauses in clause order.
    pub fn iter(&self) -> impl Iterator<Item = Clause> + '_ {
        self.0.iter().copied()
    }

    /// Whether writing `clause` requires a new `SELECT`.
    pub fn conflicts_with(&self, clause: Clause) -> bool {
        self.contains(Clause::SetOp)
            || self.0.iter().any(|&c| c != Clause::SetOp && c >= clause)
    }

    /// Whether any of `requested` conflicts.
    pub fn needs_wrap(&self, requested: &[Clause]) -> bool {
        requested.iter().any(|&c| self.conflicts_with(c))
    }
}

/// Table alias allocator for one compilation pass.
#[derive(Debug, Clone, Default)]
pub struct AliasGenerator {
    used: HashSet<String>,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next derived-table alias: `t`, `t0`, `t1`, ...
    pub fn next_alias(&mut self) -> String {
        self.reserve("t")
    }

    /// Claim `name`, or the first `name<n>` not yet taken.
    pub fn reserve(&mut self, name: &str) -> String {
        let alias = if self.used.contains(name) {
            (0usize..)
                .map(|n| format!("{name}{n}"))
                .find(|candidate| !self.used.contains(candidate))
                .unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        self.used.insert(alias.clone());
        alias
    }
}

/// A row source visible in a `FROM` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSource {
    pub alias: String,
    pub fields: Vec<String>,
}

impl AliasSource {
    /// Source `alias` exposing the names of `fields`.
    pub fn new(alias: impl Into<String>, fields: &RowType) -> Self {
        Self {
            alias: alias.into(),
            fields: fields.fields().to_vec(),
        }
    }
}

/// Maps an operator's input field ordinals to SQL expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// Fields resolve through the `FROM` sources, concatenated in order.
    Aliased {
        sources: Vec<AliasSource>,
        qualified: bool,
    },
    /// Fields resolve to the current select list.
    SelectList(Vec<SqlNode>),
}

impl Context {
    /// Resolve through `sources`, prefixing each name with its alias when
    /// `qualified`.
    pub fn aliased(sources: Vec<AliasSource>, qualified: bool) -> Self {
        Context::Aliased { sources, qualified }
    }

    /// Number of resolvable fields.
    pub fn field_count(&self) -> usize {
        match self {
            Context::Aliased { sources, .. } => sources.iter().map(|s| s.fields.len()).sum(),
            Context::SelectList(items) => items.len(),
        }
    }

    /// The SQL expression for input field `ordinal`.
    pub fn field(&self, ordinal: usize) -> Result<SqlNode, PushdownError> {
        let out_of_range = || PushdownError::FieldOutOfRange {
            ordinal,
            count: self.field_count(),
        };
        match self {
            Context::Aliased { sources, qualified } => {
                let mut offset = ordinal;
                for source in sources {
                    if let Some(name) = source.fields.get(offset) {
                        return Ok(if *qualified {
                            SqlNode::identifier([source.alias.as_str(), name.as_str()])
                        } else {
                            SqlNode::identifier([name.as_str()])
                        });
                    }
                    offset -= source.fields.len();
                }
                Err(out_of_range())
            }
            Context::SelectList(items) => items
                .get(ordinal)
                .cloned()
                .map(SqlNode::strip_alias)
                .ok_or_else(out_of_range),
        }
    }
}

/// Append `node` to a select list, aliasing it to the output field name when
/// its implicit name differs.
pub fn add_select(items: &mut Vec<SqlNode>, node: SqlNode, fields: &RowType) {
    let node = match fields.field(items.len()) {
        Some(name) if node.derived_name() != Some(name) => SqlNode::alias(node, name),
        _ => node,
    };
    items.push(node);
}

/// Give a star `SELECT` an explicit list when the names `*` would produce
/// differ from `fields` (duplicate names across joined sources).
fn expand_star(select: &mut Select, sources: &[AliasSource], fields: &RowType) {
    if select.projection.is_some() {
        return;
    }
    let implied: Vec<&String> = sources.iter().flat_map(|s| s.fields.iter()).collect();
    if implied.len() != fields.len() || implied.iter().zip(fields.fields()).all(|(a, b)| *a == b) {
        return;
    }
    let context = Context::aliased(sources.to_vec(), sources.len() > 1);
    let mut items = Vec::with_capacity(fields.len());
    for ordinal in 0..fields.len() {
        if let Ok(field) = context.field(ordinal) {
            add_select(&mut items, field, fields);
        }
    }
    select.projection = Some(items);
}

/// The result of emitting one physical node.
#[derive(Debug, Clone)]
pub struct Emission {
    node: SqlNode,
    clauses: ClauseSet,
    sources: Vec<AliasSource>,
    fields: RowType,
    alias: Option<String>,
}

impl Emission {
    /// Emission of `node`, which has consumed `clauses` and produces `fields`.
    pub fn new(node: SqlNode, clauses: ClauseSet, sources: Vec<AliasSource>, fields: RowType) -> Self {
        Self {
            node,
            clauses,
            sources,
            fields,
            alias: None,
        }
    }

    /// Preferred alias when this emission is used as a `FROM` item.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The emitted SQL node.
    pub fn node(&self) -> &SqlNode {
        &self.node
    }

    /// Clauses the emitted node has consumed.
    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    /// Output field names.
    pub fn fields(&self) -> &RowType {
        &self.fields
    }

    /// This emission as a `FROM` item plus the sources it exposes.
    pub fn into_from(self, aliases: &mut AliasGenerator) -> (SqlNode, Vec<AliasSource>) {
        match self.node {
            SqlNode::Identifier(parts) => {
                let alias = match self.alias {
                    Some(alias) => alias,
                    None => aliases.reserve(parts.last().map(String::as_str).unwrap_or("t")),
                };
                let source = AliasSource::new(alias.clone(), &self.fields);
                let node = if parts.last() == Some(&alias) {
                    SqlNode::Identifier(parts)
                } else {
                    SqlNode::alias(SqlNode::Identifier(parts), alias)
                };
                (node, vec![source])
            }
            SqlNode::Join(_) => (self.node, self.sources),
            SqlNode::Select(mut select) => {
                expand_star(&mut select, &self.sources, &self.fields);
                let alias = self.alias.unwrap_or_else(|| aliases.next_alias());
                let source = AliasSource::new(alias.clone(), &self.fields);
                (SqlNode::alias(SqlNode::Select(select), alias), vec![source])
            }
            other => {
                let alias = self.alias.unwrap_or_else(|| aliases.next_alias());
                let source = AliasSource::new(alias.clone(), &self.fields);
                (SqlNode::alias(other, alias), vec![source])
            }
        }
    }

    /// This emission as a `SELECT` that can be extended.
    pub fn into_select(self, aliases: &mut AliasGenerator) -> (Select, Vec<AliasSource>) {
        match self.node {
            SqlNode::Select(select) => (*select, self.sources),
            _ => {
                let (from, sources) = self.into_from(aliases);
                (Select::star_from(from), sources)
            }
        }
    }

    /// This emission as a complete query, with star lists expanded.
    pub fn into_query(self, aliases: &mut AliasGenerator) -> SqlNode {
        let fields = self.fields.clone();
        let (mut select, sources) = self.into_select(aliases);
        expand_star(&mut select, &sources, &fields);
        SqlNode::select(select)
    }

    /// This emission as a statement root.
    pub fn into_statement(self, aliases: &mut AliasGenerator) -> SqlNode {
        match self.node {
            SqlNode::SetOp { .. } => self.node,
            _ => self.into_query(aliases),
        }
    }

    /// Start writing `requested` clauses on top of this emission.
    pub fn builder(self, requested: &[Clause], aliases: &mut AliasGenerator) -> SelectBuilder {
        if self.clauses.needs_wrap(requested) {
            self.wrap(requested, aliases)
        } else {
            self.extend(requested, aliases)
        }
    }

    /// Like [`Emission::builder`], for a clause that repeats the fields at
    /// `keys` (`GROUP BY`, `ORDER BY`).
    ///
    /// A constant select item cannot be repeated there: `GROUP BY 1` and
    /// `ORDER BY 1` name a column position. Such keys force a new `SELECT`.
    pub fn builder_for_keys(
        self,
        requested: &[Clause],
        keys: &[usize],
        aliases: &mut AliasGenerator,
    ) -> SelectBuilder {
        if keys.iter().any(|&k| self.select_item_is_constant(k)) {
            self.wrap(requested, aliases)
        } else {
            self.builder(requested, aliases)
        }
    }

    fn select_item_is_constant(&self, ordinal: usize) -> bool {
        let SqlNode::Select(select) = &self.node else {
            return false;
        };
        match select.projection.as_ref().and_then(|items| items.get(ordinal)) {
            Some(SqlNode::Alias { expr, .. }) => matches!(**expr, SqlNode::Literal(_)),
            Some(SqlNode::Literal(_)) => true,
            _ => false,
        }
    }

    fn wrap(self, requested: &[Clause], aliases: &mut AliasGenerator) -> SelectBuilder {
        trace!(consumed = ?self.clauses, ?requested, "wrapping in new SELECT");
        let (from, sources) = self.into_from(aliases);
        let mut clauses = ClauseSet::of(&[Clause::From]);
        requested.iter().for_each(|&c| clauses.insert(c));
        let context = Context::aliased(sources.clone(), sources.len() > 1);
        SelectBuilder {
            select: Select::star_from(from),
            clauses,
            sources,
            context,
        }
    }

    fn extend(self, requested: &[Clause], aliases: &mut AliasGenerator) -> SelectBuilder {
        trace!(consumed = ?self.clauses, ?requested, "extending SELECT");
        let mut clauses = self.clauses.clone();
        requested.iter().for_each(|&c| clauses.insert(c));
        let (select, sources) = self.into_select(aliases);
        let context = match &select.projection {
            Some(items) => Context::SelectList(items.clone()),
            None => Context::aliased(sources.clone(), sources.len() > 1),
        };
        SelectBuilder {
            select,
            clauses,
            sources,
            context,
        }
    }
}

/// A `SELECT` under construction.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    select: Select,
    clauses: ClauseSet,
    sources: Vec<AliasSource>,
    context: Context,
}

impl SelectBuilder {
    /// Resolution of input fields for the clauses being written.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Clauses consumed once this builder finishes.
    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    /// Replace the select list.
    pub fn set_select(&mut self, items: Vec<SqlNode>) {
        self.select.projection = Some(items);
    }

    /// Set the `WHERE` condition.
    pub fn set_where(&mut self, condition: SqlNode) {
        self.select.selection = Some(condition);
    }

    /// Set the `GROUP BY` keys; an empty list renders `GROUP BY ()`.
    pub fn set_group_by(&mut self, keys: Vec<SqlNode>) {
        self.select.group_by = Some(keys);
    }

    /// Set the `ORDER BY` items.
    pub fn set_order_by(&mut self, items: Vec<OrderByItem>) {
        self.select.order_by = Some(items);
    }

    /// Seal the `SELECT` as an emission producing `fields`.
    pub fn finish(self, fields: &RowType) -> Emission {
        Emission::new(
            SqlNode::select(self.select),
            self.clauses,
            self.sources,
            fields.clone(),
        )
    }
}

/// Drives one compilation pass.
#[derive(Debug)]
pub struct SqlImplementor {
    pub(crate) dialect: Dialect,
    pub(crate) aliases: AliasGenerator,
}

impl SqlImplementor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            aliases: AliasGenerator::new(),
        }
    }

    /// Target dialect.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Compile `root` to a standalone statement.
    pub fn compile(&mut self, root: &PhysicalNode) -> Result<SqlStatement, PushdownError> {
        debug!(root = root.kind().name(), convention = %root.convention(), "compiling to SQL");
        let emission = self.visit(root)?;
        debug!(consumed = ?emission.clauses(), "compiled");
        Ok(SqlStatement::new(emission.into_statement(&mut self.aliases)))
    }
}

impl PhysicalNode {
    /// Compile this tree to a SQL statement in its convention's dialect.
    pub fn compile_to_sql(&self) -> Result<SqlStatement, PushdownError> {
        SqlImplementor::new(*self.convention().dialect()).compile(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpush_ast::SqlLiteral;

    #[test]
    fn test_conflicts_follow_clause_order() {
        let from = ClauseSet::of(&[Clause::From]);
        assert!(!from.conflicts_with(Clause::Where));
        assert!(!from.conflicts_with(Clause::OrderBy));
        assert!(from.conflicts_with(Clause::From));
        assert!(from.conflicts_with(Clause::Select));

        let grouped = ClauseSet::of(&[Clause::From, Clause::Where, Clause::GroupBy]);
        assert!(grouped.conflicts_with(Clause::Where));
        assert!(grouped.conflicts_with(Clause::GroupBy));
        assert!(!grouped.conflicts_with(Clause::OrderBy));
    }

    #[test]
    fn test_set_op_conflicts_with_everything() {
        let set_op = ClauseSet::of(&[Clause::SetOp]);
        for clause in [Clause::Where, Clause::GroupBy, Clause::OrderBy] {
            assert!(set_op.conflicts_with(clause));
        }
    }

    #[test]
    fn test_alias_generator() {
        let mut aliases = AliasGenerator::new();
        assert_eq!(aliases.next_alias(), "t");
        assert_eq!(aliases.next_alias(), "t0");
        assert_eq!(aliases.reserve("emp"), "emp");
        assert_eq!(aliases.reserve("emp"), "emp0");
        assert_eq!(aliases.next_alias(), "t1");
    }

    #[test]
    fn test_context_resolution() {
        let sources = vec![
            AliasSource::new("emp", &RowType::new(["empno", "deptno"])),
            AliasSource::new("dept", &RowType::new(["deptno"])),
        ];
        let qualified = Context::aliased(sources.clone(), true);
        assert_eq!(qualified.field(2).unwrap(), SqlNode::identifier(["dept", "deptno"]));
        assert!(matches!(
            qualified.field(3),
            Err(PushdownError::FieldOutOfRange { ordinal: 3, count: 3 })
        ));
        let bare = Context::aliased(sources, false);
        assert_eq!(bare.field(0).unwrap(), SqlNode::identifier(["empno"]));

        let list = Context::SelectList(vec![SqlNode::alias(SqlNode::identifier(["a"]), "b")]);
        assert_eq!(list.field(0).unwrap(), SqlNode::identifier(["a"]));
    }

    #[test]
    fn test_add_select_aliases_only_when_names_differ() {
        let fields = RowType::new(["a", "b"]);
        let mut items = Vec::new();
        add_select(&mut items, SqlNode::identifier(["t", "a"]), &fields);
        add_select(&mut items, SqlNode::identifier(["t", "x"]), &fields);
        assert_eq!(items[0], SqlNode::identifier(["t", "a"]));
        assert_eq!(items[1], SqlNode::alias(SqlNode::identifier(["t", "x"]), "b"));
    }

    #[test]
    fn test_builder_extends_then_wraps() {
        let mut aliases = AliasGenerator::new();
        let fields = RowType::new(["a"]);
        let scan = Emission::new(
            SqlNode::identifier(["emp"]),
            ClauseSet::of(&[Clause::From]),
            vec![AliasSource::new("emp", &fields)],
            fields.clone(),
        )
        .with_alias("emp");

        let mut filter = scan.builder(&[Clause::Where], &mut aliases);
        filter.set_where(SqlNode::identifier(["a"]));
        let filtered = filter.finish(&fields);
        assert!(filtered.clauses().contains(Clause::Where));

        // A second WHERE must wrap rather than overwrite the first.
        let again = filtered.builder(&[Clause::Where], &mut aliases);
        assert_eq!(again.clauses(), &ClauseSet::of(&[Clause::From, Clause::Where]));
        let done = again.finish(&fields);
        match done.node() {
            SqlNode::Select(select) => {
                assert!(select.selection.is_none());
                assert!(matches!(select.from, Some(SqlNode::Alias { .. })));
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_keys_force_a_new_select() {
        let mut aliases = AliasGenerator::new();
        let fields = RowType::new(["ename", "one"]);
        let mut select = Select::star_from(SqlNode::identifier(["emp"]));
        select.projection = Some(vec![
            SqlNode::identifier(["ename"]),
            SqlNode::alias(SqlNode::Literal(SqlLiteral::Integer(1)), "one"),
        ]);
        let project = Emission::new(
            SqlNode::select(select),
            ClauseSet::of(&[Clause::From, Clause::Select]),
            vec![AliasSource::new("emp", &fields)],
            fields,
        );

        let by_name = project.clone().builder_for_keys(&[Clause::OrderBy], &[0], &mut aliases);
        assert!(matches!(by_name.context(), Context::SelectList(_)));

        let by_constant = project.builder_for_keys(&[Clause::OrderBy], &[0, 1], &mut aliases);
        assert_eq!(by_constant.context().field(1).unwrap(), SqlNode::identifier(["one"]));
        assert_eq!(
            by_constant.clauses(),
            &ClauseSet::of(&[Clause::From, Clause::OrderBy])
        );
    }

    #[test]
    fn test_star_expansion_for_duplicate_names() {
        let mut aliases = AliasGenerator::new();
        let sources = vec![
            AliasSource::new("emp", &RowType::new(["deptno"])),
            AliasSource::new("dept", &RowType::new(["deptno"])),
        ];
        let fields = RowType::new(["deptno", "deptno0"]);
        let emission = Emission::new(
            SqlNode::select(Select::star_from(SqlNode::identifier(["x"]))),
            ClauseSet::of(&[Clause::From]),
            sources,
            fields,
        );
        match emission.into_query(&mut aliases) {
            SqlNode::Select(select) => {
                let items = select.projection.unwrap();
                assert_eq!(items[0], SqlNode::identifier(["emp", "deptno"]));
                assert_eq!(
                    items[1],
                    SqlNode::alias(SqlNode::identifier(["dept", "deptno"]), "deptno0")
                );
            }
            other => panic!("expected select, got {other:?}"),
        }
    }
}
