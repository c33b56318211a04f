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
//! Coordinator-side dynamic filter service.
//!
//! Responsibilities:
//! - Registers executing queries with the dynamic filters they will produce.
//! - Runs the periodic collector that folds per-task build-side summaries
//!   into finalized per-filter domains under the completion predicate.
//! - Hands out `DynamicFilter` views to probe-side scans and read-only stats
//!   projections to introspection endpoints.
//!
//! Key exported interfaces:
//! - Types: `DynamicFilterService`, `StageState`, `StageDynamicFilters`,
//!   `StageDynamicFiltersSupplier`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::common::app_config;
use crate::common::ids::{FilterId, QueryId, SlotId};
use crate::plan::{
    DynamicFilterDescriptor, FragmentedPlan, Symbol, plan_lazy_dynamic_filters,
    plan_produced_dynamic_filters, plan_replicated_dynamic_filters,
};
use crate::predicate::Domain;
use crate::runtime::dynamic_filter::DynamicFilter;
use crate::runtime::filter_context::{DynamicFilterContext, DynamicFilterContextManager};
use crate::runtime::filter_stats::DynamicFiltersStats;
use crate::novafilter_logging::{debug, warn};

/// Scheduling state of one build stage, as seen by the supplier.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StageState {
    Planned,
    Scheduling,
    Scheduled,
    Running,
    Finishing,
    Finished,
    Canceled,
    Failed,
}

impl StageState {
    /// While true, the stage may still grow new tasks, so a per-task summary
    /// count can never be known to be final.
    pub fn can_schedule_more_tasks(self) -> bool {
        matches!(self, StageState::Planned | StageState::Scheduling)
    }
}

/// Immutable snapshot of one build stage's reported dynamic filters.
#[derive(Clone, Debug)]
pub struct StageDynamicFilters {
    stage_state: StageState,
    number_of_tasks: usize,
    task_dynamic_filters: Vec<HashMap<FilterId, Domain>>,
}

impl StageDynamicFilters {
    pub fn new(
        stage_state: StageState,
        number_of_tasks: usize,
        task_dynamic_filters: Vec<HashMap<FilterId, Domain>>,
    ) -> Self {
        Self {
            stage_state,
            number_of_tasks,
            task_dynamic_filters,
        }
    }

    pub fn stage_state(&self) -> StageState {
        self.stage_state
    }

    pub fn number_of_tasks(&self) -> usize {
        self.number_of_tasks
    }

    pub fn task_dynamic_filters(&self) -> &[HashMap<FilterId, Domain>] {
        &self.task_dynamic_filters
    }
}

/// Per-query callback yielding the current build-stage snapshots.
///
/// Must be callable concurrently at any moment; an empty list means "no
/// progress to report". A failing call is isolated to that query's tick.
pub type StageDynamicFiltersSupplier =
    Arc<dyn Fn() -> Result<Vec<StageDynamicFilters>, String> + Send + Sync>;

struct CollectorShutdown {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl CollectorShutdown {
    fn is_stopped(&self) -> bool {
        *self.stopped.lock().expect("collector shutdown lock")
    }

    /// Sleeps up to `interval`; returns true when stop was requested.
    fn wait_stop(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock().expect("collector shutdown lock");
        let deadline = std::time::Instant::now() + interval;
        while !*stopped {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(stopped, deadline - now)
                .expect("collector shutdown lock");
            stopped = guard;
        }
        true
    }

    fn request_stop(&self) {
        let mut stopped = self.stopped.lock().expect("collector shutdown lock");
        *stopped = true;
        self.cond.notify_all();
    }
}

/// Registry plus background collector for all dynamic filters of a
/// coordinator process.
///
/// Held as an explicit dependency by the execution layer, not an ambient
/// singleton.
pub struct DynamicFilterService {
    refresh_interval: Duration,
    contexts: Arc<DynamicFilterContextManager>,
    shutdown: Arc<CollectorShutdown>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DynamicFilterService {
    pub fn new(refresh_interval: Duration) -> Self {
        assert!(
            !refresh_interval.is_zero(),
            "dynamic filter refresh interval must be positive"
        );
        Self {
            refresh_interval,
            contexts: Arc::new(DynamicFilterContextManager::new()),
            shutdown: Arc::new(CollectorShutdown {
                stopped: Mutex::new(false),
                cond: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config() -> anyhow::Result<Self> {
        let cfg = app_config::config()?;
        Ok(Self::new(cfg.dynamic_filter_refresh_interval()))
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Starts the background collector thread. Idempotent.
    pub fn start(&self) {
        let mut worker = self.worker.lock().expect("collector worker lock");
        if worker.is_some() {
            return;
        }
        let contexts = Arc::clone(&self.contexts);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.refresh_interval;
        let handle = std::thread::Builder::new()
            .name("dynamic_filter_collect".to_string())
            .spawn(move || {
                debug!("dynamic filter collector started");
                loop {
                    if shutdown.is_stopped() {
                        break;
                    }
                    collect_pass(&contexts);
                    if shutdown.wait_stop(interval) {
                        break;
                    }
                }
                debug!("dynamic filter collector stopped");
            })
            .expect("start dynamic filter collector");
        *worker = Some(handle);
    }

    /// Stops the collector. Registrations made afterwards are harmless
    /// no-ops: the periodic collection no longer reaches them.
    pub fn stop(&self) {
        self.shutdown.request_stop();
        let handle = {
            let mut worker = self.worker.lock().expect("collector worker lock");
            worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Registers `query_id` with the filters it is expected to produce.
    ///
    /// Idempotent per query id. Registering with an empty expected set is a
    /// caller bug and panics; callers without dynamic filters must skip
    /// registration (see `register_query_from_plan`).
    pub fn register_query(
        &self,
        query_id: QueryId,
        supplier: StageDynamicFiltersSupplier,
        dynamic_filters: BTreeSet<FilterId>,
        lazy_dynamic_filters: BTreeSet<FilterId>,
        replicated_dynamic_filters: BTreeSet<FilterId>,
    ) {
        let context = DynamicFilterContext::new(
            query_id,
            supplier,
            dynamic_filters,
            lazy_dynamic_filters,
            replicated_dynamic_filters,
        );
        self.contexts.register(context);
    }

    /// Derives the expected/lazy/replicated filter sets from a fragmented
    /// plan and registers the query if it produces any dynamic filter.
    pub fn register_query_from_plan(
        &self,
        query_id: QueryId,
        supplier: StageDynamicFiltersSupplier,
        plan: &FragmentedPlan,
    ) {
        let produced = plan_produced_dynamic_filters(plan);
        if produced.is_empty() {
            return;
        }
        let lazy = plan_lazy_dynamic_filters(plan);
        let replicated = plan_replicated_dynamic_filters(plan);
        self.register_query(query_id, supplier, produced, lazy, replicated);
    }

    /// Drops the query's context. Lenient: unknown ids and in-flight
    /// collector passes are fine; outstanding consumer handles keep their
    /// shared view and simply never see further filters.
    pub fn remove_query(&self, query_id: QueryId) {
        self.contexts.remove(query_id);
    }

    /// Builds the dynamic filter view for one scan of `query_id`.
    ///
    /// An unknown query id (already removed, or dynamic filtering disabled)
    /// yields the empty sentinel: always complete, never blocking, predicate
    /// `TupleDomain::all()`.
    pub fn create_dynamic_filter(
        &self,
        query_id: QueryId,
        descriptors: &[DynamicFilterDescriptor],
        column_handles: &HashMap<Symbol, SlotId>,
    ) -> DynamicFilter {
        match self.contexts.get(query_id) {
            Some(context) => DynamicFilter::new(context, descriptors, column_handles),
            None => {
                debug!(
                    "dynamic filter view for unknown query: query_id={}",
                    query_id
                );
                DynamicFilter::empty()
            }
        }
    }

    /// Read-only stats projection for UIs and EXPLAIN ANALYZE.
    pub fn stats(&self, query_id: QueryId) -> DynamicFiltersStats {
        match self.contexts.get(query_id) {
            Some(context) => DynamicFiltersStats::from_context(&context),
            None => DynamicFiltersStats::empty(),
        }
    }

    /// Finalized domain for one filter, if already collected.
    pub fn summary(&self, query_id: QueryId, filter_id: FilterId) -> Option<Domain> {
        self.contexts
            .get(query_id)
            .and_then(|context| context.summary(filter_id))
    }

    /// Runs one collection pass over all registered contexts.
    ///
    /// The background worker calls this every `refresh_interval`; tests and
    /// tools call it directly to drive ticks deterministically.
    pub fn collect_dynamic_filters(&self) {
        collect_pass(&self.contexts);
    }
}

impl Drop for DynamicFilterService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn collect_pass(contexts: &DynamicFilterContextManager) {
    for context in contexts.snapshot() {
        if context.is_completed() {
            continue;
        }
        let uncollected = context.uncollected_dynamic_filters();
        let stages = match (context.supplier())() {
            Ok(stages) => stages,
            Err(e) => {
                warn!(
                    "stage dynamic filter supplier failed: query_id={} err={}",
                    context.query_id(),
                    e
                );
                continue;
            }
        };

        let mut new_filters: BTreeMap<FilterId, Domain> = BTreeMap::new();
        for stage in &stages {
            for (filter_id, domains) in stage_filter_groups(stage, &uncollected) {
                if !is_collectible(&context, filter_id, stage, &domains) {
                    continue;
                }
                let mut iter = domains.into_iter();
                let first = iter.next().expect("domain group is never empty").clone();
                let merged = iter.fold(first, |acc, domain| acc.union(domain));
                let prev = new_filters.insert(filter_id, merged);
                assert!(
                    prev.is_none(),
                    "dynamic filter reported by multiple stages: query_id={} filter_id={}",
                    context.query_id(),
                    filter_id
                );
            }
        }
        context.add_dynamic_filters(new_filters);
    }
}

/// Groups the stage's task summaries per still-uncollected filter id.
fn stage_filter_groups<'a>(
    stage: &'a StageDynamicFilters,
    uncollected: &BTreeSet<FilterId>,
) -> BTreeMap<FilterId, Vec<&'a Domain>> {
    let mut groups: BTreeMap<FilterId, Vec<&'a Domain>> = BTreeMap::new();
    for task in stage.task_dynamic_filters() {
        for (filter_id, domain) in task {
            if uncollected.contains(filter_id) {
                groups.entry(*filter_id).or_default().push(domain);
            }
        }
    }
    groups
}

/// The completion predicate: may these per-task partials be finalized?
fn is_collectible(
    context: &DynamicFilterContext,
    filter_id: FilterId,
    stage: &StageDynamicFilters,
    domains: &[&Domain],
) -> bool {
    // A summary that already filters nothing can only widen; no need to wait
    // for the remaining tasks.
    if domains.iter().any(|domain| domain.is_all()) {
        return true;
    }

    // For a broadcast build any one task's summary is authoritative.
    if context.is_replicated(filter_id) {
        return true;
    }

    // Otherwise every task of the source stage must have reported.
    !stage.stage_state().can_schedule_more_tasks()
        && domains.len() == stage.number_of_tasks()
}
