// SPDX-License-Identifier: PMPL-1.0-or-later
//! Pushdown configuration.
//!
//! Selects the target convention and dialect and lets deployments override
//! individual dialect policies or switch rules off.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlpush_ast::{DatabaseProduct, Dialect, IdentifierQuote, NullOrdering};

use crate::error::PushdownError;
use crate::physical::Convention;
use crate::rules::{rules, RuleSet};

/// Configuration for one pushdown target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushdownConfig {
    /// Convention name; tables hosted under this name are scanned remotely.
    pub convention: String,
    /// Remote database product.
    pub product: DatabaseProduct,
    /// Override of the product's null-ordering policy.
    pub null_ordering: Option<NullOrdering>,
    /// Override of the product's identifier quoting.
    pub identifier_quote: Option<IdentifierQuote>,
    /// Rule names left out of the rule set.
    pub disabled_rules: Vec<String>,
}

impl Default for PushdownConfig {
    fn default() -> Self {
        Self {
            convention: "jdbc".to_string(),
            product: DatabaseProduct::Ansi,
            null_ordering: None,
            identifier_quote: None,
            disabled_rules: Vec::new(),
        }
    }
}

impl PushdownConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, PushdownError> {
        let config: PushdownConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PushdownError> {
        if self.convention.trim().is_empty() {
            return Err(PushdownError::InvalidConfig(
                "convention name is empty".to_string(),
            ));
        }
        let convention = Convention::new(self.convention.clone(), self.dialect());
        let known: Vec<&'static str> = rules(&convention).iter().map(|r| r.name()).collect();
        if let Some(unknown) = self
            .disabled_rules
            .iter()
            .find(|name| !known.iter().any(|k| *k == name.as_str()))
        {
            return Err(PushdownError::InvalidConfig(format!(
                "unknown rule {unknown}"
            )));
        }
        Ok(())
    }

    /// The product's dialect with this configuration's overrides applied.
    pub fn dialect(&self) -> Dialect {
        let mut dialect = Dialect::of(self.product);
        if let Some(null_ordering) = self.null_ordering {
            dialect = dialect.with_null_ordering(null_ordering);
        }
        if let Some(quote) = self.identifier_quote {
            dialect = dialect.with_identifier_quote(quote);
        }
        dialect
    }

    pub fn convention(&self) -> Arc<Convention> {
        Convention::new(self.convention.clone(), self.dialect())
    }

    /// Rules for this target, minus the disabled ones.
    pub fn rule_set(&self) -> RuleSet {
        let convention = self.convention();
        let enabled = rules(&convention)
            .into_iter()
            .filter(|r| !self.disabled_rules.iter().any(|d| d == r.name()))
            .collect();
        RuleSet::with_rules(convention, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PushdownConfig::default();
        assert_eq!(config.convention, "jdbc");
        assert_eq!(config.product, DatabaseProduct::Ansi);
        assert!(config.validate().is_ok());
        assert_eq!(config.rule_set().rules().len(), 12);
    }

    #[test]
    fn test_from_json_with_overrides() {
        let config = PushdownConfig::from_json(
            r#"{
                "convention": "warehouse",
                "product": "postgres",
                "null_ordering": "emulate_with_case",
                "disabled_rules": ["PushdownSortRule"]
            }"#,
        )
        .unwrap();
        let dialect = config.dialect();
        assert_eq!(dialect.product(), DatabaseProduct::Postgres);
        assert!(!dialect.supports_null_ordering());
        assert_eq!(config.convention().name(), "warehouse");
        let rule_set = config.rule_set();
        assert_eq!(rule_set.rules().len(), 11);
        assert!(rule_set.rules().iter().all(|r| r.name() != "PushdownSortRule"));
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let err = PushdownConfig::from_json(r#"{"disabled_rules": ["NoSuchRule"]}"#).unwrap_err();
        assert!(matches!(err, PushdownError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_convention_rejected() {
        let err = PushdownConfig::from_json(r#"{"convention": " "}"#).unwrap_err();
        assert!(matches!(err, PushdownError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = PushdownConfig::from_json("{").unwrap_err();
        assert!(matches!(err, PushdownError::Serialization(_)));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PushdownConfig {
            product: DatabaseProduct::MySql,
            ..PushdownConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PushdownConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
