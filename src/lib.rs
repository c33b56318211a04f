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
pub mod common;
pub mod plan;
pub mod predicate;
pub mod runtime;

// Coordinator-side layout, with `novafilter_*` convenience aliases.
pub use common::app_config as novafilter_config;
pub use common::logging as novafilter_logging;

pub use common::ids::{FilterId, QueryId, SlotId};
pub use plan::{
    DynamicFilterDescriptor, FragmentedPlan, JoinDistributionMode, PlanFragment, PlanNode, Symbol,
};
pub use predicate::{Domain, ScalarValue, TupleDomain};
pub use runtime::dynamic_filter::DynamicFilter;
pub use runtime::dynamic_filter_service::{
    DynamicFilterService, StageDynamicFilters, StageDynamicFiltersSupplier, StageState,
};
pub use runtime::filter_stats::{DynamicFilterDomainStats, DynamicFiltersStats};
