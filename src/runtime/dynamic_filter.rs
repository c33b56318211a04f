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
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use crate::common::ids::{FilterId, SlotId};
use crate::plan::{DynamicFilterDescriptor, Symbol};
use crate::predicate::TupleDomain;
use crate::runtime::filter_context::DynamicFilterContext;
use crate::runtime::signal::{Blocked, SignalHandle};

/// Dynamic filter view handed to one probe-side scan.
///
/// The predicate only ever tightens: each finalized build-side summary is
/// intersected in as the collector installs it. The handle stays valid after
/// the query's context is removed; it then behaves as if no further filters
/// will ever arrive.
pub struct DynamicFilter {
    inner: Option<BoundDynamicFilter>,
}

struct BoundDynamicFilter {
    context: Arc<DynamicFilterContext>,
    filter_ids: BTreeSet<FilterId>,
    source_columns: HashMap<FilterId, SlotId>,
    lazy_signals: Vec<SignalHandle>,
    completed_predicate: OnceLock<TupleDomain<SlotId>>,
}

impl DynamicFilter {
    /// The sentinel view for a query without dynamic filtering: always
    /// complete, predicate `all()`, never blocks.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(
        context: Arc<DynamicFilterContext>,
        descriptors: &[DynamicFilterDescriptor],
        column_handles: &HashMap<Symbol, SlotId>,
    ) -> Self {
        let mut filter_ids = BTreeSet::new();
        let mut source_columns = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let column = column_handles.get(&descriptor.input).unwrap_or_else(|| {
                panic!(
                    "source column handle for dynamic filter {} is missing: symbol={}",
                    descriptor.filter_id, descriptor.input
                )
            });
            filter_ids.insert(descriptor.filter_id);
            source_columns.insert(descriptor.filter_id, *column);
        }
        let lazy_signals = filter_ids
            .iter()
            .filter_map(|filter_id| context.lazy_dynamic_filters().get(filter_id).cloned())
            .collect();
        Self {
            inner: Some(BoundDynamicFilter {
                context,
                filter_ids,
                source_columns,
                lazy_signals,
                completed_predicate: OnceLock::new(),
            }),
        }
    }

    /// True when every requested filter has a finalized summary.
    pub fn is_complete(&self) -> bool {
        let Some(inner) = self.inner.as_ref() else {
            return true;
        };
        if inner.completed_predicate.get().is_some() {
            return true;
        }
        inner
            .filter_ids
            .iter()
            .all(|filter_id| inner.context.has_summary(*filter_id))
    }

    /// Best-known predicate right now. Absent filters contribute nothing;
    /// once complete the result is memoized and stable forever.
    pub fn current_predicate(&self) -> TupleDomain<SlotId> {
        let Some(inner) = self.inner.as_ref() else {
            return TupleDomain::all();
        };
        if let Some(predicate) = inner.completed_predicate.get() {
            return predicate.clone();
        }

        let mut predicate = TupleDomain::all();
        let mut collected = 0usize;
        for filter_id in &inner.filter_ids {
            let Some(summary) = inner.context.summary(*filter_id) else {
                continue;
            };
            collected += 1;
            let column = *inner
                .source_columns
                .get(filter_id)
                .expect("source column resolved at construction");
            let mut domains = BTreeMap::new();
            domains.insert(column, summary);
            predicate = predicate.intersect(&TupleDomain::with_column_domains(domains));
        }

        if collected == inner.filter_ids.len() {
            let _ = inner.completed_predicate.set(predicate.clone());
        }
        predicate
    }

    /// Awaitable that completes when any requested lazy filter becomes
    /// ready. Already complete when nothing is pending; callers loop until
    /// `is_complete` or their own cancellation fires.
    pub fn blocked(&self) -> Blocked {
        let Some(inner) = self.inner.as_ref() else {
            return Blocked::ready();
        };
        let pending: Vec<SignalHandle> = inner
            .lazy_signals
            .iter()
            .filter(|signal| !signal.is_fired())
            .cloned()
            .collect();
        if pending.is_empty() {
            return Blocked::ready();
        }
        Blocked::when_any(&pending)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use super::DynamicFilter;
    use crate::common::ids::{FilterId, QueryId, SlotId};
    use crate::plan::{DynamicFilterDescriptor, Symbol};
    use crate::predicate::TupleDomain;
    use crate::runtime::filter_context::DynamicFilterContext;

    #[test]
    fn test_empty_sentinel() {
        let filter = DynamicFilter::empty();
        assert!(filter.is_complete());
        assert_eq!(filter.current_predicate(), TupleDomain::all());
        assert!(filter.blocked().is_done());
    }

    #[test]
    #[should_panic(expected = "source column handle for dynamic filter")]
    fn test_missing_column_binding_panics() {
        let context = Arc::new(DynamicFilterContext::new(
            QueryId::new(1, 1),
            Arc::new(|| Ok(Vec::new())),
            [FilterId::new(1)].into_iter().collect(),
            BTreeSet::new(),
            BTreeSet::new(),
        ));
        let descriptors = vec![DynamicFilterDescriptor::new(
            FilterId::new(1),
            Symbol::new("missing"),
        )];
        let column_handles: HashMap<Symbol, SlotId> = HashMap::new();
        let _ = DynamicFilter::new(context, &descriptors, &column_handles);
    }
}
