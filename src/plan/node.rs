// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::collections::BTreeMap;
use std::fmt;

use crate::common::ids::FilterId;

/// Plan-side name of a value produced by an operator.
///
/// Resolved to a concrete source `SlotId` when a scan sets up its dynamic
/// filter view.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dynamic conjunct referenced by a scan-side predicate: which filter it
/// reads and the probe-side symbol it applies to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DynamicFilterDescriptor {
    pub filter_id: FilterId,
    pub input: Symbol,
}

impl DynamicFilterDescriptor {
    pub fn new(filter_id: FilterId, input: Symbol) -> Self {
        Self { filter_id, input }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinDistributionMode {
    /// Build side is broadcast to every probe task.
    Broadcast,
    /// Build side is hash-partitioned across tasks.
    Partitioned,
}

#[derive(Clone, Debug)]
pub enum PlanNode {
    Scan(ScanNode),
    Filter(FilterNode),
    Project(ProjectNode),
    Exchange(ExchangeNode),
    Join(JoinNode),
}

#[derive(Clone, Debug)]
pub struct ScanNode {
    pub node_id: i32,
    pub table: String,
    /// Dynamic conjuncts pushed into the scan predicate.
    pub dynamic_conjuncts: Vec<DynamicFilterDescriptor>,
}

#[derive(Clone, Debug)]
pub struct FilterNode {
    pub node_id: i32,
    pub child: Box<PlanNode>,
    /// Dynamic conjuncts of this filter's predicate.
    pub dynamic_conjuncts: Vec<DynamicFilterDescriptor>,
}

#[derive(Clone, Debug)]
pub struct ProjectNode {
    pub node_id: i32,
    pub child: Box<PlanNode>,
}

/// Fragment boundary; children are the remote fragment roots feeding it.
#[derive(Clone, Debug)]
pub struct ExchangeNode {
    pub node_id: i32,
    pub children: Vec<PlanNode>,
}

#[derive(Clone, Debug)]
pub struct JoinNode {
    pub node_id: i32,
    pub distribution_mode: JoinDistributionMode,
    /// Dynamic filters this join's build side produces, keyed by filter id,
    /// valued by the build-side symbol the keys are drawn from.
    pub dynamic_filters: BTreeMap<FilterId, Symbol>,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
}

impl PlanNode {
    pub fn node_id(&self) -> i32 {
        match self {
            PlanNode::Scan(node) => node.node_id,
            PlanNode::Filter(node) => node.node_id,
            PlanNode::Project(node) => node.node_id,
            PlanNode::Exchange(node) => node.node_id,
            PlanNode::Join(node) => node.node_id,
        }
    }

    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Scan(_) => Vec::new(),
            PlanNode::Filter(node) => vec![node.child.as_ref()],
            PlanNode::Project(node) => vec![node.child.as_ref()],
            PlanNode::Exchange(node) => node.children.iter().collect(),
            PlanNode::Join(node) => vec![node.left.as_ref(), node.right.as_ref()],
        }
    }
}

/// One scheduling unit of a fragmented plan.
#[derive(Clone, Debug)]
pub struct PlanFragment {
    pub fragment_id: i32,
    pub root: PlanNode,
}

impl PlanFragment {
    pub fn new(fragment_id: i32, root: PlanNode) -> Self {
        Self { fragment_id, root }
    }
}

/// A plan split into fragments at exchange boundaries.
#[derive(Clone, Debug)]
pub struct FragmentedPlan {
    pub fragments: Vec<PlanFragment>,
}

impl FragmentedPlan {
    pub fn new(fragments: Vec<PlanFragment>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[PlanFragment] {
        &self.fragments
    }
}
