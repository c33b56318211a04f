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
//! Pure set-valued queries over plan trees.
//!
//! Responsibilities:
//! - Extracts the produced, consumed, replicated, and lazy dynamic filter id
//!   sets the registration path feeds to the filter service.
//! - Traversals never mutate the tree and are deterministic in the plan.
//!
//! Key exported interfaces:
//! - Functions: `produced_dynamic_filters`, `consumed_dynamic_filters`,
//!   `replicated_dynamic_filters`, `lazy_dynamic_filters`,
//!   `plan_*` variants over a `FragmentedPlan`.

use std::collections::BTreeSet;

use crate::common::ids::FilterId;
use crate::plan::node::{
    FragmentedPlan, JoinDistributionMode, PlanFragment, PlanNode,
};

fn walk<F: FnMut(&PlanNode)>(root: &PlanNode, mut visit: F) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        visit(node);
        stack.extend(node.children());
    }
}

/// Filter ids declared on any join node under `root`.
pub fn produced_dynamic_filters(root: &PlanNode) -> BTreeSet<FilterId> {
    let mut out = BTreeSet::new();
    walk(root, |node| {
        if let PlanNode::Join(join) = node {
            out.extend(join.dynamic_filters.keys().copied());
        }
    });
    out
}

/// Filter ids referenced by any scan-side dynamic conjunct under `root`.
pub fn consumed_dynamic_filters(root: &PlanNode) -> BTreeSet<FilterId> {
    let mut out = BTreeSet::new();
    walk(root, |node| match node {
        PlanNode::Scan(scan) => {
            out.extend(scan.dynamic_conjuncts.iter().map(|d| d.filter_id));
        }
        PlanNode::Filter(filter) => {
            out.extend(filter.dynamic_conjuncts.iter().map(|d| d.filter_id));
        }
        _ => {}
    });
    out
}

/// Filter ids declared on join nodes whose build side is broadcast.
pub fn replicated_dynamic_filters(root: &PlanNode) -> BTreeSet<FilterId> {
    let mut out = BTreeSet::new();
    walk(root, |node| {
        if let PlanNode::Join(join) = node {
            if join.distribution_mode == JoinDistributionMode::Broadcast {
                out.extend(join.dynamic_filters.keys().copied());
            }
        }
    });
    out
}

/// Filter ids produced but not consumed within `fragment`.
///
/// A filter consumed in the fragment that produces it must not be lazy: a
/// scan blocking on it would stall the fragment's own build side.
pub fn lazy_dynamic_filters(fragment: &PlanFragment) -> BTreeSet<FilterId> {
    let produced = produced_dynamic_filters(&fragment.root);
    let consumed = consumed_dynamic_filters(&fragment.root);
    produced.difference(&consumed).copied().collect()
}

/// Union of per-fragment produced sets.
pub fn plan_produced_dynamic_filters(plan: &FragmentedPlan) -> BTreeSet<FilterId> {
    plan.fragments()
        .iter()
        .flat_map(|fragment| produced_dynamic_filters(&fragment.root))
        .collect()
}

/// Union of per-fragment replicated sets.
pub fn plan_replicated_dynamic_filters(plan: &FragmentedPlan) -> BTreeSet<FilterId> {
    plan.fragments()
        .iter()
        .flat_map(|fragment| replicated_dynamic_filters(&fragment.root))
        .collect()
}

/// Union of per-fragment lazy sets.
pub fn plan_lazy_dynamic_filters(plan: &FragmentedPlan) -> BTreeSet<FilterId> {
    plan.fragments()
        .iter()
        .flat_map(lazy_dynamic_filters)
        .collect()
}
