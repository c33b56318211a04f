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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::common::ids::{FilterId, QueryId};
use crate::predicate::Domain;
use crate::runtime::dynamic_filter_service::StageDynamicFiltersSupplier;
use crate::runtime::signal::{ReadySignal, SignalHandle};
use crate::novafilter_logging::debug;

/// Mutable aggregation state for one registered query.
///
/// Only the collector writes summaries and fires signals; consumer handles
/// read concurrently. Summaries are write-once per filter id, so readers
/// observing a stale snapshot see a conservatively wider predicate, never a
/// narrower one.
pub struct DynamicFilterContext {
    query_id: QueryId,
    supplier: StageDynamicFiltersSupplier,
    dynamic_filters: BTreeSet<FilterId>,
    lazy_dynamic_filters: HashMap<FilterId, SignalHandle>,
    replicated_dynamic_filters: BTreeSet<FilterId>,
    summaries: RwLock<HashMap<FilterId, Domain>>,
    completed: AtomicBool,
}

impl DynamicFilterContext {
    pub(crate) fn new(
        query_id: QueryId,
        supplier: StageDynamicFiltersSupplier,
        dynamic_filters: BTreeSet<FilterId>,
        lazy_dynamic_filters: BTreeSet<FilterId>,
        replicated_dynamic_filters: BTreeSet<FilterId>,
    ) -> Self {
        assert!(
            !dynamic_filters.is_empty(),
            "dynamic filter context registered without expected filters: query_id={}",
            query_id
        );
        assert!(
            lazy_dynamic_filters.is_subset(&dynamic_filters),
            "lazy dynamic filters not produced by query {}",
            query_id
        );
        assert!(
            replicated_dynamic_filters.is_subset(&dynamic_filters),
            "replicated dynamic filters not produced by query {}",
            query_id
        );
        let lazy_dynamic_filters = lazy_dynamic_filters
            .into_iter()
            .map(|filter_id| {
                let signal = ReadySignal::new(format!("dynamic_filter:{}:{}", query_id, filter_id));
                (filter_id, signal)
            })
            .collect();
        Self {
            query_id,
            supplier,
            dynamic_filters,
            lazy_dynamic_filters,
            replicated_dynamic_filters,
            summaries: RwLock::new(HashMap::new()),
            completed: AtomicBool::new(false),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub(crate) fn supplier(&self) -> &StageDynamicFiltersSupplier {
        &self.supplier
    }

    pub fn total_dynamic_filters(&self) -> usize {
        self.dynamic_filters.len()
    }

    pub fn lazy_dynamic_filters(&self) -> &HashMap<FilterId, SignalHandle> {
        &self.lazy_dynamic_filters
    }

    pub fn replicated_dynamic_filters(&self) -> &BTreeSet<FilterId> {
        &self.replicated_dynamic_filters
    }

    pub fn is_replicated(&self, filter_id: FilterId) -> bool {
        self.replicated_dynamic_filters.contains(&filter_id)
    }

    /// Expected filters that have no finalized summary yet.
    pub fn uncollected_dynamic_filters(&self) -> BTreeSet<FilterId> {
        let guard = self.summaries.read().expect("dynamic filter summaries lock");
        self.dynamic_filters
            .iter()
            .filter(|filter_id| !guard.contains_key(filter_id))
            .copied()
            .collect()
    }

    pub fn summary(&self, filter_id: FilterId) -> Option<Domain> {
        let guard = self.summaries.read().expect("dynamic filter summaries lock");
        guard.get(&filter_id).cloned()
    }

    pub fn has_summary(&self, filter_id: FilterId) -> bool {
        let guard = self.summaries.read().expect("dynamic filter summaries lock");
        guard.contains_key(&filter_id)
    }

    /// Sorted snapshot of the finalized summaries, for the stats projection.
    pub fn summaries_snapshot(&self) -> BTreeMap<FilterId, Domain> {
        let guard = self.summaries.read().expect("dynamic filter summaries lock");
        guard
            .iter()
            .map(|(filter_id, domain)| (*filter_id, domain.clone()))
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Installs a batch of newly finalized domains.
    ///
    /// Each filter is finalized at most once; a repeat is a collector bug.
    /// Summary insertion happens before the readiness signal fires, so any
    /// observer that sees a signal fired also sees the summary.
    pub(crate) fn add_dynamic_filters(&self, new_filters: BTreeMap<FilterId, Domain>) {
        if new_filters.is_empty() {
            return;
        }
        {
            let mut guard = self
                .summaries
                .write()
                .expect("dynamic filter summaries lock");
            for (filter_id, domain) in &new_filters {
                assert!(
                    self.dynamic_filters.contains(filter_id),
                    "collected a dynamic filter the query does not produce: query_id={} filter_id={}",
                    self.query_id,
                    filter_id
                );
                let prev = guard.insert(*filter_id, domain.clone());
                assert!(
                    prev.is_none(),
                    "dynamic filter finalized twice: query_id={} filter_id={}",
                    self.query_id,
                    filter_id
                );
            }
            let completed = guard.len() == self.dynamic_filters.len();
            self.completed.store(completed, Ordering::Release);
        }
        for filter_id in new_filters.keys() {
            if let Some(signal) = self.lazy_dynamic_filters.get(filter_id) {
                signal.fire();
            }
        }
        debug!(
            "dynamic filters collected: query_id={} filter_ids={:?} completed={}",
            self.query_id,
            new_filters.keys().map(|f| f.as_i32()).collect::<Vec<_>>(),
            self.is_completed()
        );
    }
}

/// Process-wide mapping from query id to filter context.
pub struct DynamicFilterContextManager {
    contexts: Mutex<HashMap<QueryId, Arc<DynamicFilterContext>>>,
}

impl DynamicFilterContextManager {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent insert: an existing registration for `query_id` wins and
    /// the new context is discarded.
    pub(crate) fn register(&self, context: DynamicFilterContext) {
        let query_id = context.query_id();
        let mut guard = self.contexts.lock().expect("dynamic filter contexts lock");
        if guard.contains_key(&query_id) {
            debug!(
                "dynamic filter context already registered: query_id={}",
                query_id
            );
            return;
        }
        debug!(
            "dynamic filter context registered: query_id={} expected={} lazy={} replicated={}",
            query_id,
            context.total_dynamic_filters(),
            context.lazy_dynamic_filters().len(),
            context.replicated_dynamic_filters().len()
        );
        guard.insert(query_id, Arc::new(context));
    }

    /// Removes the context. An in-flight collector pass holding the `Arc`
    /// finishes harmlessly; the state is dropped with the last reference.
    pub fn remove(&self, query_id: QueryId) {
        let mut guard = self.contexts.lock().expect("dynamic filter contexts lock");
        if guard.remove(&query_id).is_some() {
            debug!("dynamic filter context removed: query_id={}", query_id);
        }
    }

    pub fn get(&self, query_id: QueryId) -> Option<Arc<DynamicFilterContext>> {
        let guard = self.contexts.lock().expect("dynamic filter contexts lock");
        guard.get(&query_id).map(Arc::clone)
    }

    /// Point-in-time snapshot of the active contexts for one collector pass.
    pub(crate) fn snapshot(&self) -> Vec<Arc<DynamicFilterContext>> {
        let guard = self.contexts.lock().expect("dynamic filter contexts lock");
        guard.values().map(Arc::clone).collect()
    }
}

impl Default for DynamicFilterContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use super::{DynamicFilterContext, DynamicFilterContextManager};
    use crate::common::ids::{FilterId, QueryId};
    use crate::predicate::{Domain, ScalarValue};
    use crate::runtime::dynamic_filter_service::StageDynamicFiltersSupplier;

    fn empty_supplier() -> StageDynamicFiltersSupplier {
        Arc::new(|| Ok(Vec::new()))
    }

    fn filter_ids(raw: &[i32]) -> BTreeSet<FilterId> {
        raw.iter().copied().map(FilterId::new).collect()
    }

    fn context(expected: &[i32], lazy: &[i32]) -> DynamicFilterContext {
        DynamicFilterContext::new(
            QueryId::new(1, 1),
            empty_supplier(),
            filter_ids(expected),
            filter_ids(lazy),
            BTreeSet::new(),
        )
    }

    fn batch(entries: &[(i32, i64)]) -> BTreeMap<FilterId, Domain> {
        entries
            .iter()
            .map(|(id, v)| {
                (
                    FilterId::new(*id),
                    Domain::singleton(ScalarValue::Int(*v)),
                )
            })
            .collect()
    }

    #[test]
    fn test_completion_flips_once_all_collected() {
        let ctx = context(&[1, 2], &[1, 2]);
        assert!(!ctx.is_completed());
        ctx.add_dynamic_filters(batch(&[(1, 10)]));
        assert!(!ctx.is_completed());
        assert_eq!(ctx.uncollected_dynamic_filters(), filter_ids(&[2]));
        ctx.add_dynamic_filters(batch(&[(2, 20)]));
        assert!(ctx.is_completed());
        assert!(ctx.uncollected_dynamic_filters().is_empty());
    }

    #[test]
    fn test_signal_fires_after_summary_is_visible() {
        let ctx = context(&[1], &[1]);
        let signal = ctx
            .lazy_dynamic_filters()
            .get(&FilterId::new(1))
            .cloned()
            .expect("lazy signal");
        assert!(!signal.is_fired());
        ctx.add_dynamic_filters(batch(&[(1, 10)]));
        assert!(signal.is_fired());
        assert!(ctx.has_summary(FilterId::new(1)));
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_double_finalization_panics() {
        let ctx = context(&[1], &[]);
        ctx.add_dynamic_filters(batch(&[(1, 10)]));
        ctx.add_dynamic_filters(batch(&[(1, 11)]));
    }

    #[test]
    #[should_panic(expected = "without expected filters")]
    fn test_empty_registration_panics() {
        let _ = context(&[], &[]);
    }

    #[test]
    fn test_manager_register_is_idempotent() {
        let manager = DynamicFilterContextManager::new();
        manager.register(context(&[1], &[]));
        let first = manager.get(QueryId::new(1, 1)).expect("context");
        manager.register(context(&[1, 2], &[]));
        let second = manager.get(QueryId::new(1, 1)).expect("context");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.total_dynamic_filters(), 1);
    }

    #[test]
    fn test_manager_remove_is_lenient() {
        let manager = DynamicFilterContextManager::new();
        manager.remove(QueryId::new(9, 9));
        manager.register(context(&[1], &[]));
        let held = manager.get(QueryId::new(1, 1)).expect("context");
        manager.remove(QueryId::new(1, 1));
        assert!(manager.get(QueryId::new(1, 1)).is_none());
        // A held reference keeps absorbing writes harmlessly.
        held.add_dynamic_filters(batch(&[(1, 10)]));
        assert!(held.is_completed());
    }
}
