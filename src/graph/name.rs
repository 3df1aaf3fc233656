//! Qualified series names.
//!
//! A fully-qualified series name has two parts separated by a dot: a
//! namespace (`node` or `edge`) selecting the store, and the unqualified
//! name used inside that store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    Node,
    Edge,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Node => "node",
            Namespace::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesName {
    ns: Namespace,
    name: String,
}

impl SeriesName {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            ns: Namespace::Node,
            name: name.into(),
        }
    }

    pub fn edge(name: impl Into<String>) -> Self {
        Self {
            ns: Namespace::Edge,
            name: name.into(),
        }
    }

    /// Parse `node.<name>` or `edge.<name>`. Anything else is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let (prefix, rest) = s
            .split_once('.')
            .ok_or_else(|| GraphError::InvalidSeriesName(s.to_string()))?;
        if rest.is_empty() {
            return Err(GraphError::InvalidSeriesName(s.to_string()));
        }
        match prefix {
            "node" => Ok(Self::node(rest)),
            "edge" => Ok(Self::edge(rest)),
            _ => Err(GraphError::InvalidSeriesName(s.to_string())),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.ns
    }

    pub fn is_node_series(&self) -> bool {
        self.ns == Namespace::Node
    }

    pub fn is_edge_series(&self) -> bool {
        self.ns == Namespace::Edge
    }

    pub fn unqualified(&self) -> &str {
        &self.name
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.ns.prefix(), self.name)
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.ns.prefix(), self.name)
    }
}
