//! Expanded plan trees and the scan-leaf visitor.
//!
//! A plan tree is the in-memory form of a materialization's serialized plan,
//! bound to live catalog metadata during expansion. The cache only inspects
//! the leaves: external-metadata change detection compares each catalog scan's
//! captured version tag against the catalog's current tag for that dataset.

use crate::types::DatasetKey;

/// One node of an expanded plan tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    /// Leaf table scan.
    Scan(ScanLeaf),
    /// Any relational operator above the leaves. The cache never interprets
    /// operator semantics, only traverses to the scans below.
    Operator {
        /// Operator name, e.g. `"filter"`, `"aggregate"`.
        name: String,
        /// Child nodes.
        inputs: Vec<PlanNode>,
    },
}

impl PlanNode {
    fn visit_scans<'a>(&'a self, visit: &mut dyn FnMut(&'a ScanLeaf)) {
        match self {
            Self::Scan(leaf) => visit(leaf),
            Self::Operator { inputs, .. } => {
                for input in inputs {
                    input.visit_scans(visit);
                }
            }
        }
    }
}

/// A leaf table scan in an expanded plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLeaf {
    /// Qualified name of the scanned table.
    pub table: DatasetKey,
    /// How the scan was resolved.
    pub source: ScanSource,
}

/// Resolution of a scan target at expansion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    /// Scan over a catalog-resident dataset, with the dataset version tag
    /// captured when the plan was expanded.
    Catalog {
        /// Captured version tag.
        version: String,
    },
    /// Scan resolved outside the catalog. Change detection treats these as
    /// always updated.
    External,
}

/// An expanded plan tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPlan {
    root: PlanNode,
}

impl ExpandedPlan {
    /// Wrap a plan tree.
    #[must_use]
    pub fn new(root: PlanNode) -> Self {
        Self { root }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Visit every scan leaf in the tree, depth first.
    pub fn for_each_scan<'a>(&'a self, visit: &mut dyn FnMut(&'a ScanLeaf)) {
        self.root.visit_scans(visit);
    }

    /// Number of scan leaves.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        let mut count = 0;
        self.for_each_scan(&mut |_| count += 1);
        count
    }
}
