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

use crate::predicate::domain::Domain;

/// Conjunction of per-column domains.
///
/// `None` column domains collapse the whole conjunction: a tuple domain with
/// an unsatisfiable column admits no rows at all. Column domains that are
/// `all` are dropped on construction, so `is_all` is a structural check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TupleDomain<C: Ord + Clone> {
    // `None` is the contradiction ("none"); `Some(map)` holds only
    // non-trivial column domains.
    domains: Option<BTreeMap<C, Domain>>,
}

impl<C: Ord + Clone> TupleDomain<C> {
    /// The universe: admits every row.
    pub fn all() -> Self {
        Self {
            domains: Some(BTreeMap::new()),
        }
    }

    /// The contradiction: admits no row.
    pub fn none() -> Self {
        Self { domains: None }
    }

    pub fn with_column_domains(domains: BTreeMap<C, Domain>) -> Self {
        let mut kept = BTreeMap::new();
        for (column, domain) in domains {
            if domain.is_none() {
                return Self::none();
            }
            if domain.is_all() {
                continue;
            }
            kept.insert(column, domain);
        }
        Self {
            domains: Some(kept),
        }
    }

    pub fn is_all(&self) -> bool {
        self.domains.as_ref().map(BTreeMap::is_empty).unwrap_or(false)
    }

    pub fn is_none(&self) -> bool {
        self.domains.is_none()
    }

    /// Per-column domains, or `None` for the contradiction.
    pub fn column_domains(&self) -> Option<&BTreeMap<C, Domain>> {
        self.domains.as_ref()
    }

    pub fn domain(&self, column: &C) -> Option<&Domain> {
        self.domains.as_ref().and_then(|map| map.get(column))
    }

    /// Conjunction of two tuple domains: shared columns intersect, others
    /// carry over.
    pub fn intersect(&self, other: &TupleDomain<C>) -> TupleDomain<C> {
        let (Some(left), Some(right)) = (self.domains.as_ref(), other.domains.as_ref()) else {
            return Self::none();
        };
        let mut merged = left.clone();
        for (column, domain) in right {
            let combined = match merged.get(column) {
                Some(existing) => existing.intersect(domain),
                None => domain.clone(),
            };
            if combined.is_none() {
                return Self::none();
            }
            merged.insert(column.clone(), combined);
        }
        Self::with_column_domains(merged)
    }
}

impl<C: Ord + Clone + fmt::Display> fmt::Display for TupleDomain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domains.as_ref() {
            None => write!(f, "NONE"),
            Some(map) if map.is_empty() => write!(f, "ALL"),
            Some(map) => {
                for (i, (column, domain)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    write!(f, "{} IN {}", column, domain)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::TupleDomain;
    use crate::common::ids::SlotId;
    use crate::predicate::domain::{Domain, ScalarValue};

    fn int(v: i64) -> ScalarValue {
        ScalarValue::Int(v)
    }

    fn single(slot: u32, domain: Domain) -> TupleDomain<SlotId> {
        let mut map = BTreeMap::new();
        map.insert(SlotId::new(slot), domain);
        TupleDomain::with_column_domains(map)
    }

    #[test]
    fn test_all_and_none() {
        let all: TupleDomain<SlotId> = TupleDomain::all();
        assert!(all.is_all());
        assert!(!all.is_none());
        let none: TupleDomain<SlotId> = TupleDomain::none();
        assert!(none.is_none());
        assert!(!none.is_all());
    }

    #[test]
    fn test_all_domains_are_dropped() {
        let td = single(1, Domain::all());
        assert!(td.is_all());
        assert!(td.domain(&SlotId::new(1)).is_none());
    }

    #[test]
    fn test_none_domain_collapses() {
        let td = single(1, Domain::none());
        assert!(td.is_none());
    }

    #[test]
    fn test_intersect_is_identity_on_all() {
        let td = single(1, Domain::range(int(1), int(5)));
        assert_eq!(TupleDomain::all().intersect(&td), td);
        assert_eq!(td.intersect(&TupleDomain::all()), td);
    }

    #[test]
    fn test_intersect_merges_distinct_columns() {
        let a = single(1, Domain::range(int(1), int(5)));
        let b = single(2, Domain::singleton(int(42)));
        let both = a.intersect(&b);
        assert_eq!(
            both.domain(&SlotId::new(1)),
            Some(&Domain::range(int(1), int(5)))
        );
        assert_eq!(
            both.domain(&SlotId::new(2)),
            Some(&Domain::singleton(int(42)))
        );
    }

    #[test]
    fn test_intersect_same_column_tightens() {
        let a = single(1, Domain::range(int(1), int(5)));
        let b = single(1, Domain::range(int(3), int(9)));
        let both = a.intersect(&b);
        assert_eq!(
            both.domain(&SlotId::new(1)),
            Some(&Domain::range(int(3), int(5)))
        );
    }

    #[test]
    fn test_intersect_disjoint_same_column_is_none() {
        let a = single(1, Domain::range(int(1), int(2)));
        let b = single(1, Domain::range(int(8), int(9)));
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_display() {
        let td = single(3, Domain::singleton(int(7)));
        assert_eq!(td.to_string(), "3 IN {7}");
    }
}
