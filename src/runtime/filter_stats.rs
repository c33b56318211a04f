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
use serde::{Deserialize, Serialize};

use crate::common::ids::FilterId;
use crate::runtime::filter_context::DynamicFilterContext;

/// Display-bounded projection of one finalized filter domain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicFilterDomainStats {
    pub dynamic_filter_id: FilterId,
    pub simplified_domain: String,
    pub range_count: usize,
    pub discrete_values_count: usize,
}

/// Read-only dynamic filtering stats for one query, as exposed to UIs and
/// EXPLAIN ANALYZE output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicFiltersStats {
    pub dynamic_filter_domain_stats: Vec<DynamicFilterDomainStats>,
    pub lazy_dynamic_filters: usize,
    pub replicated_dynamic_filters: usize,
    pub total_dynamic_filters: usize,
    pub dynamic_filters_completed: usize,
}

impl DynamicFiltersStats {
    /// Stats for an unknown or unregistered query.
    pub fn empty() -> Self {
        Self {
            dynamic_filter_domain_stats: Vec::new(),
            lazy_dynamic_filters: 0,
            replicated_dynamic_filters: 0,
            total_dynamic_filters: 0,
            dynamic_filters_completed: 0,
        }
    }

    pub(crate) fn from_context(context: &DynamicFilterContext) -> Self {
        let dynamic_filter_domain_stats: Vec<DynamicFilterDomainStats> = context
            .summaries_snapshot()
            .into_iter()
            .map(|(filter_id, domain)| DynamicFilterDomainStats {
                dynamic_filter_id: filter_id,
                // simplify(1) bounds the rendered string regardless of how
                // many disjuncts the build side reported.
                simplified_domain: domain.simplify(1).to_string(),
                range_count: domain.range_count(),
                discrete_values_count: domain.discrete_values_count(),
            })
            .collect();
        Self {
            lazy_dynamic_filters: context.lazy_dynamic_filters().len(),
            replicated_dynamic_filters: context.replicated_dynamic_filters().len(),
            total_dynamic_filters: context.total_dynamic_filters(),
            dynamic_filters_completed: dynamic_filter_domain_stats.len(),
            dynamic_filter_domain_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicFiltersStats;

    #[test]
    fn test_empty_stats() {
        let stats = DynamicFiltersStats::empty();
        assert_eq!(stats.total_dynamic_filters, 0);
        assert!(stats.dynamic_filter_domain_stats.is_empty());
    }

    #[test]
    fn test_json_field_names_are_camel_case() {
        let stats = DynamicFiltersStats::empty();
        let json = serde_json::to_value(&stats).expect("serialize stats");
        assert!(json.get("dynamicFilterDomainStats").is_some());
        assert!(json.get("lazyDynamicFilters").is_some());
        assert!(json.get("replicatedDynamicFilters").is_some());
        assert!(json.get("totalDynamicFilters").is_some());
        assert!(json.get("dynamicFiltersCompleted").is_some());
    }
}
