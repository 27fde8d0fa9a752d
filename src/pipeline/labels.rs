//! Category and sentiment labels, and the index-to-label tables that map raw
//! model class indices onto them.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// A closed set of classification outputs.
pub trait Label:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static
{
    /// Classifier name used in logs and errors ("category", "sentiment").
    const KIND: &'static str;

    /// Every value, in the reference model's index order.
    fn all() -> &'static [Self];

    /// Canonical label string.
    fn as_str(&self) -> &'static str;
}

// ── Category ────────────────────────────────────────────────────────

/// Business category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Finance,
    Energy,
    Technology,
    Pharmaceutical,
    Travel,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Finance,
        Self::Energy,
        Self::Technology,
        Self::Pharmaceutical,
        Self::Travel,
    ];
}

impl Label for Category {
    const KIND: &'static str = "category";

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Finance => "Finance",
            Self::Energy => "Energy",
            Self::Technology => "Technology",
            Self::Pharmaceutical => "Pharmaceutical",
            Self::Travel => "Travel",
        }
    }
}

// ── Sentiment ───────────────────────────────────────────────────────

/// Sentiment / intent of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Enquiry,
    Satisfied,
    Default,
    Dissatisfied,
    Emergency,
}

impl Sentiment {
    pub const ALL: [Sentiment; 5] = [
        Self::Enquiry,
        Self::Satisfied,
        Self::Default,
        Self::Dissatisfied,
        Self::Emergency,
    ];
}

impl Label for Sentiment {
    const KIND: &'static str = "sentiment";

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Enquiry => "enquiry",
            Self::Satisfied => "satisfied",
            Self::Default => "default",
            Self::Dissatisfied => "dissatisfied",
            Self::Emergency => "emergency",
        }
    }
}

/// Parse failure for a label name. Matching is exact: "Pharmaceuticals" is
/// not "Pharmaceutical".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label {name:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub name: String,
}

fn parse_label<L: Label>(name: &str) -> Result<L, UnknownLabel> {
    L::all()
        .iter()
        .copied()
        .find(|label| label.as_str() == name)
        .ok_or_else(|| UnknownLabel {
            kind: L::KIND,
            name: name.to_string(),
        })
}

macro_rules! label_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_label(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

label_impls!(Category);
label_impls!(Sentiment);

// ── Label table ─────────────────────────────────────────────────────

/// Fixed mapping from a model's raw class index to a label.
///
/// The table is configuration: its order must match the model's output
/// layer. Each label appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable<L: Label> {
    labels: Vec<L>,
}

impl<L: Label> LabelTable<L> {
    /// Build a table from labels in class-index order.
    pub fn new(labels: Vec<L>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{} labels", L::KIND),
                message: "label table is empty".into(),
            });
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ConfigError::InvalidValue {
                    key: format!("{} labels", L::KIND),
                    message: format!("label {label} appears more than once"),
                });
            }
        }
        Ok(Self { labels })
    }

    /// The reference model's table: every label in declaration order.
    pub fn reference() -> Self {
        Self {
            labels: L::all().to_vec(),
        }
    }

    /// Parse a comma-separated list of label names in index order.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let labels = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| {
                parse_label::<L>(name).map_err(|e| ConfigError::InvalidValue {
                    key: format!("{} labels", L::KIND),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(labels)
    }

    /// Label for a raw class index, if the table has one.
    pub fn get(&self, index: usize) -> Option<L> {
        self.labels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Serialize an optional label as its name, or `""` when unset.
pub fn label_or_empty<L: Label, S: Serializer>(
    label: &Option<L>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(label.map(|l| l.as_str()).unwrap_or(""))
}
