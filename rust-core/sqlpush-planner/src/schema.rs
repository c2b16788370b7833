// SPDX-License-Identifier: PMPL-1.0-or-later
//! Row schemas and the table capability seam.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Ordered field names of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowType {
    fields: Vec<String>,
}

impl RowType {
    /// Row type with `fields` in order.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Row type of a DML node: a single update count.
    pub fn row_count() -> Self {
        Self::new(["ROWCOUNT"])
    }

    /// Field names in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Name of field `index`, if present.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row type has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields of `self` followed by fields of `other`, renaming clashes.
    pub fn join(&self, other: &RowType) -> RowType {
        uniquify(self.fields.iter().chain(other.fields.iter()).cloned())
    }
}

/// Rename duplicates by appending the first free numeric suffix.
pub fn uniquify(names: impl IntoIterator<Item = String>) -> RowType {
    let names: Vec<String> = names.into_iter().collect();
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let unique = if used.contains(&name) {
            (0..)
                .map(|n| format!("{name}{n}"))
                .find(|candidate| !used.contains(candidate))
                .unwrap_or_else(|| name.clone())
        } else {
            name
        };
        used.insert(unique.clone());
        fields.push(unique);
    }
    RowType { fields }
}

/// Proof that a table accepts DML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiableHandle {
    pub target: Vec<String>,
}

/// The query expression that reads a table's current contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryableHandle {
    pub expression: String,
}

/// A table as seen by the pushdown rules.
pub trait Table: Send + Sync + fmt::Debug {
    /// Schema-qualified name, outermost first.
    fn qualified_name(&self) -> &[String];

    fn row_type(&self) -> &RowType;

    /// Known row count, if the catalog has one.
    fn row_count(&self) -> Option<f64> {
        None
    }

    /// Column sets on which rows are unique.
    fn unique_keys(&self) -> &[Vec<usize>] {
        &[]
    }

    /// Convention that hosts this table, if it lives in a remote database.
    fn convention_name(&self) -> Option<&str> {
        None
    }

    fn as_modifiable(&self) -> Option<ModifiableHandle> {
        None
    }

    fn as_queryable(&self) -> Option<QueryableHandle> {
        None
    }

    fn display_name(&self) -> String {
        self.qualified_name().join(".")
    }
}

pub type TableRef = Arc<dyn Table>;

/// A table in a remote database, described by its catalog metadata.
#[derive(Debug, Clone)]
pub struct RemoteTable {
    name: Vec<String>,
    row_type: RowType,
    row_count: Option<f64>,
    unique_keys: Vec<Vec<usize>>,
    convention: Option<String>,
    modifiable: bool,
    queryable: bool,
}

impl RemoteTable {
    /// Table with qualified `name` and `row_type`; read-only, queryable, unhosted.
    pub fn new<I, S>(name: I, row_type: RowType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into_iter().map(Into::into).collect(),
            row_type,
            row_count: None,
            unique_keys: Vec::new(),
            convention: None,
            modifiable: false,
            queryable: true,
        }
    }

    /// Catalog row count.
    pub fn with_row_count(mut self, rows: f64) -> Self {
        self.row_count = Some(rows);
        self
    }

    /// Declare `columns` unique together.
    pub fn with_unique_key(mut self, columns: Vec<usize>) -> Self {
        self.unique_keys.push(columns);
        self
    }

    /// Host the table in the named convention.
    pub fn hosted_by(mut self, convention: impl Into<String>) -> Self {
        self.convention = Some(convention.into());
        self
    }

    /// Whether DML may target the table.
    pub fn modifiable(mut self, modifiable: bool) -> Self {
        self.modifiable = modifiable;
        self
    }

    /// Whether the table exposes a queryable expression.
    pub fn queryable(mut self, queryable: bool) -> Self {
        self.queryable = queryable;
        self
    }

    /// Share the table as a catalog handle.
    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

impl Table for RemoteTable {
    fn qualified_name(&self) -> &[String] {
        &self.name
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }

    fn row_count(&self) -> Option<f64> {
        self.row_count
    }

    fn unique_keys(&self) -> &[Vec<usize>] {
        &self.unique_keys
    }

    fn convention_name(&self) -> Option<&str> {
        self.convention.as_deref()
    }

    fn as_modifiable(&self) -> Option<ModifiableHandle> {
        self.modifiable.then(|| ModifiableHandle {
            target: self.name.clone(),
        })
    }

    fn as_queryable(&self) -> Option<QueryableHandle> {
        self.queryable.then(|| QueryableHandle {
            expression: format!("SELECT * FROM {}", self.name.join(".")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_uniquifies_names() {
        let left = RowType::new(["empno", "deptno"]);
        let right = RowType::new(["deptno", "deptno0"]);
        assert_eq!(
            left.join(&right).fields(),
            &["empno", "deptno", "deptno0", "deptno00"]
        );
    }

    #[test]
    fn test_uniquify_keeps_distinct_names() {
        let row = uniquify(vec!["a".into(), "b".into()]);
        assert_eq!(row, RowType::new(["a", "b"]));
    }

    #[test]
    fn test_remote_table_capabilities() {
        let table = RemoteTable::new(["hr", "emp"], RowType::new(["empno"]))
            .hosted_by("jdbc")
            .modifiable(true);
        assert_eq!(table.display_name(), "hr.emp");
        assert_eq!(table.convention_name(), Some("jdbc"));
        assert_eq!(
            table.as_modifiable(),
            Some(ModifiableHandle {
                target: vec!["hr".into(), "emp".into()]
            })
        );
        assert!(table.as_queryable().is_some());

        let read_only = table.modifiable(false).queryable(false);
        assert!(read_only.as_modifiable().is_none());
        assert!(read_only.as_queryable().is_none());
    }

    #[test]
    fn test_row_type_serde_is_plain_list() {
        let row = RowType::new(["a", "b"]);
        assert_eq!(serde_json::to_string(&row).unwrap(), "[\"a\",\"b\"]");
    }
}
