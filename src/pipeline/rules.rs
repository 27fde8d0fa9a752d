//! Routing rules: which category gets forwarded to whom.
//!
//! The table is built once at startup through `RoutingTableBuilder`, which
//! rejects a second rule for the same category. Dispatch is a plain lookup,
//! so every category has exactly one outcome: a recipient, or no forward.
//!
//! Rules are configured as `Label=address|Display Name` entries separated by
//! `;`, e.g. `Finance=finance@corp.example|Finance Desk;Travel=travel@corp.example|Travel Desk`.

use std::collections::HashMap;

use tracing::debug;

use crate::error::RoutingError;
use crate::pipeline::labels::Category;

pub use crate::mail::Recipient;

/// Immutable category → recipient table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    rules: HashMap<Category, Recipient>,
}

impl RoutingTable {
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// A table that never forwards.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `Label=address|Name;...`. An empty string is an empty table.
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        let mut builder = Self::builder();
        for rule in raw.split(';').map(str::trim).filter(|r| !r.is_empty()) {
            let (label, target) = rule.split_once('=').ok_or_else(|| RoutingError::MalformedRule {
                rule: rule.to_string(),
                reason: "expected Label=address|Name".into(),
            })?;
            let category: Category =
                label.trim().parse().map_err(|_| RoutingError::UnknownLabel {
                    label: label.trim().to_string(),
                })?;
            let (address, name) = target.split_once('|').unwrap_or((target, ""));
            let address = address.trim();
            if !address.contains('@') {
                return Err(RoutingError::MalformedRule {
                    rule: rule.to_string(),
                    reason: format!("{address:?} is not an email address"),
                });
            }
            builder = builder.forward(category, Recipient::new(address, name.trim()))?;
        }
        Ok(builder.build())
    }

    /// Forwarding decision for a category.
    pub fn route(&self, category: Category) -> Option<&Recipient> {
        let target = self.rules.get(&category);
        debug!(
            category = %category,
            recipient = target.map(|r| r.address.as_str()).unwrap_or("none"),
            "Routing decision"
        );
        target
    }

    /// Every category with its outcome, in label order.
    pub fn outcomes(&self) -> impl Iterator<Item = (Category, Option<&Recipient>)> + '_ {
        Category::ALL
            .into_iter()
            .map(move |category| (category, self.rules.get(&category)))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builds a `RoutingTable`, inserting each category at most once.
#[derive(Debug, Default)]
pub struct RoutingTableBuilder {
    rules: HashMap<Category, Recipient>,
}

impl RoutingTableBuilder {
    /// Forward `category` to `recipient`. A second rule for the same
    /// category is rejected, even when the recipient is identical.
    pub fn forward(mut self, category: Category, recipient: Recipient) -> Result<Self, RoutingError> {
        if self.rules.contains_key(&category) {
            return Err(RoutingError::DuplicateRule {
                category: category.to_string(),
            });
        }
        self.rules.insert(category, recipient);
        Ok(self)
    }

    pub fn build(self) -> RoutingTable {
        RoutingTable { rules: self.rules }
    }
}
