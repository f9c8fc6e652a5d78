//! Hierarchical target allocations.
//!
//! An allocation is described as a tree of percentages: every internal node
//! splits its share among its children, and every leaf is one tradable
//! instrument. [`flatten`] collapses the tree into a [`FlatAllocation`] that
//! maps each instrument to its cumulative weight in the whole portfolio.
//!
//! # Example
//!
//! ```
//! use portsim::allocation::{flatten, AllocationNode};
//!
//! let tree = AllocationNode::internal(
//!     "portfolio",
//!     1.0,
//!     vec![
//!         AllocationNode::leaf("stocks", 0.6),
//!         AllocationNode::internal(
//!             "defensive",
//!             0.4,
//!             vec![AllocationNode::leaf("bonds", 0.5), AllocationNode::leaf("gold", 0.5)],
//!         ),
//!     ],
//! );
//!
//! let flat = flatten(&tree).unwrap();
//! assert_eq!(flat.weight("gold"), Some(0.2));
//! ```

use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-10;

/// Decimal places kept on flattened leaf weights.
const WEIGHT_DECIMALS: i32 = 10;

/// A node in an allocation tree.
///
/// Deserializes from either `{ name, weight }` (leaf) or
/// `{ name, weight, children = [...] }` (internal node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllocationNode {
    Internal {
        name: String,
        weight: f64,
        children: Vec<AllocationNode>,
    },
    Leaf {
        name: String,
        weight: f64,
    },
}

impl AllocationNode {
    /// Create a leaf node.
    pub fn leaf(name: impl Into<String>, weight: f64) -> Self {
        AllocationNode::Leaf {
            name: name.into(),
            weight,
        }
    }

    /// Create an internal node.
    pub fn internal(name: impl Into<String>, weight: f64, children: Vec<AllocationNode>) -> Self {
        AllocationNode::Internal {
            name: name.into(),
            weight,
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AllocationNode::Internal { name, .. } | AllocationNode::Leaf { name, .. } => name,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            AllocationNode::Internal { weight, .. } | AllocationNode::Leaf { weight, .. } => *weight,
        }
    }

    /// Number of leaves below (and including) this node.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                AllocationNode::Leaf { .. } => count += 1,
                AllocationNode::Internal { children, .. } => stack.extend(children.iter()),
            }
        }
        count
    }
}

/// Flat map from instrument name to cumulative target weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatAllocation {
    weights: BTreeMap<String, f64>,
}

impl FlatAllocation {
    /// Build a flat allocation directly from weights, checking they sum to one.
    pub fn from_weights<I, S>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, weight) in weights {
            let name = name.into();
            check_weight(&name, weight)?;
            if map.insert(name.clone(), weight).is_some() {
                return Err(SimulationError::DuplicateLeaf { name });
            }
        }
        let total: f64 = map.values().sum();
        check_total(total)?;
        Ok(Self { weights: map })
    }

    /// Target weight of an instrument.
    pub fn weight(&self, instrument: &str) -> Option<f64> {
        self.weights.get(instrument).copied()
    }

    /// Iterate over `(instrument, weight)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

fn check_weight(name: &str, weight: f64) -> Result<()> {
    if !(weight.is_finite() && weight > 0.0 && weight <= 1.0) {
        return Err(SimulationError::Config(format!(
            "node '{}' has weight {} outside (0, 1]",
            name, weight
        )));
    }
    Ok(())
}

fn check_total(total: f64) -> Result<()> {
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(SimulationError::Config(format!(
            "leaf weights sum to {} instead of 1",
            total
        )));
    }
    Ok(())
}

fn round_weight(weight: f64) -> f64 {
    let scale = 10f64.powi(WEIGHT_DECIMALS);
    (weight * scale).round() / scale
}

/// Flatten an allocation tree into cumulative leaf weights.
///
/// Traversal uses an explicit stack, so tree depth is bounded only by memory.
/// Fails without producing a partial result when any internal node's children
/// do not sum to one, when a weight lies outside `(0, 1]`, when a leaf name
/// appears twice, or when the final leaf weights do not sum to one.
pub fn flatten(tree: &AllocationNode) -> Result<FlatAllocation> {
    let mut weights = BTreeMap::new();
    // Unrounded sum; rounding is only applied to the reported weights.
    let mut total = 0.0;
    let mut stack: Vec<(&AllocationNode, f64)> = vec![(tree, 1.0)];

    while let Some((node, cumulative)) = stack.pop() {
        check_weight(node.name(), node.weight())?;
        match node {
            AllocationNode::Leaf { name, weight } => {
                let leaf_weight = cumulative * weight;
                total += leaf_weight;
                if weights.insert(name.clone(), round_weight(leaf_weight)).is_some() {
                    return Err(SimulationError::DuplicateLeaf { name: name.clone() });
                }
            }
            AllocationNode::Internal {
                name,
                weight,
                children,
            } => {
                let children_sum: f64 = children.iter().map(AllocationNode::weight).sum();
                if (children_sum - 1.0).abs() > WEIGHT_TOLERANCE {
                    return Err(SimulationError::Config(format!(
                        "children of '{}' sum to {} instead of 1",
                        name, children_sum
                    )));
                }
                let node_weight = cumulative * weight;
                stack.extend(children.iter().map(|child| (child, node_weight)));
            }
        }
    }

    check_total(total)?;
    Ok(FlatAllocation { weights })
}
