// SPDX-License-Identifier: PMPL-1.0-or-later
//! sqlpush AST
//!
//! SQL abstract syntax tree produced by the pushdown compiler, the
//! per-dialect quirks table it consults, and a small text renderer for
//! diagnostics.

pub mod ast;
pub mod dialect;
mod render;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use ast::{
    Join, JoinKind, NullsOrder, OrderByItem, Select, SetOperator, SqlLiteral, SqlNode,
    SqlOperator,
};
pub use dialect::{DatabaseProduct, Dialect, DialectPolicy, IdentifierQuote, NullOrdering};

use render::Renderer;

/// A complete, standalone SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    root: SqlNode,
}

impl SqlStatement {
    pub fn new(root: SqlNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SqlNode {
        &self.root
    }

    pub fn into_root(self) -> SqlNode {
        self.root
    }

    /// Render with the dialect's identifier quoting.
    pub fn render(&self, dialect: &Dialect) -> String {
        self.render_quoted(dialect.policy().identifier_quote)
    }

    fn render_quoted(&self, quote: IdentifierQuote) -> String {
        let mut out = String::new();
        // Writing into a String only fails on malformed call arity.
        if Renderer::new(&mut out, quote)
            .statement(&self.root)
            .is_err()
        {
            out.push_str(" /* malformed */");
        }
        out
    }
}

/// Unquoted rendering; never fails.
impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_quoted(IdentifierQuote::None))
    }
}
