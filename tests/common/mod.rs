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
//! Shared helpers for dynamic filter integration tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use novafilter::{
    Domain, DynamicFilterDescriptor, FilterId, QueryId, ScalarValue, SlotId, StageDynamicFilters,
    StageDynamicFiltersSupplier, Symbol,
};

pub fn test_query_id(lo: i64) -> QueryId {
    QueryId::new(7, lo)
}

pub fn filter_ids(raw: &[i32]) -> BTreeSet<FilterId> {
    raw.iter().copied().map(FilterId::new).collect()
}

pub fn int_range(low: i64, high: i64) -> Domain {
    Domain::range(ScalarValue::Int(low), ScalarValue::Int(high))
}

pub fn int_value(value: i64) -> Domain {
    Domain::singleton(ScalarValue::Int(value))
}

pub fn task(entries: &[(i32, Domain)]) -> HashMap<FilterId, Domain> {
    entries
        .iter()
        .map(|(id, domain)| (FilterId::new(*id), domain.clone()))
        .collect()
}

pub fn descriptors(pairs: &[(i32, &str)]) -> Vec<DynamicFilterDescriptor> {
    pairs
        .iter()
        .map(|(id, symbol)| DynamicFilterDescriptor::new(FilterId::new(*id), Symbol::new(*symbol)))
        .collect()
}

pub fn column_handles(pairs: &[(&str, u32)]) -> HashMap<Symbol, SlotId> {
    pairs
        .iter()
        .map(|(symbol, slot)| (Symbol::new(*symbol), SlotId::new(*slot)))
        .collect()
}

/// Supplier whose stage snapshots a test can swap between collector ticks.
#[derive(Clone)]
pub struct TestSupplier {
    snapshots: Arc<Mutex<Vec<StageDynamicFilters>>>,
}

impl TestSupplier {
    pub fn new(initial: Vec<StageDynamicFilters>) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, snapshots: Vec<StageDynamicFilters>) {
        *self.snapshots.lock().expect("test supplier lock") = snapshots;
    }

    pub fn supplier(&self) -> StageDynamicFiltersSupplier {
        let snapshots = Arc::clone(&self.snapshots);
        Arc::new(move || Ok(snapshots.lock().expect("test supplier lock").clone()))
    }
}

pub fn failing_supplier(message: &str) -> StageDynamicFiltersSupplier {
    let message = message.to_string();
    Arc::new(move || Err(message.clone()))
}
