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
//! Per-column value-set algebra for dynamic filter summaries.
//!
//! Responsibilities:
//! - Defines typed scalar values, inclusive ranges, and the value-set kinds a
//!   build side can report (all, none, sorted ranges, discrete values).
//! - Provides the union/intersect/simplify operations the collector and the
//!   consumer handles rely on.
//!
//! Key exported interfaces:
//! - Types: `ScalarValue`, `Range`, `ValueSet`, `Domain`.
//!
//! Mixing scalar types inside one filter's domains is a plan-lowering bug and
//! panics rather than degrading to a wrong predicate.

use std::fmt;

/// Typed scalar carried by dynamic filter domains.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ScalarValue {
    Boolean(bool),
    Int(i64),
    Varchar(String),
}

impl ScalarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int(_) => "int",
            ScalarValue::Varchar(_) => "varchar",
        }
    }

    fn same_type(&self, other: &ScalarValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Varchar(v) => write!(f, "{}", v),
        }
    }
}

fn check_same_type(a: &ScalarValue, b: &ScalarValue) {
    assert!(
        a.same_type(b),
        "scalar type mismatch in domain operation: {} vs {}",
        a.type_name(),
        b.type_name()
    );
}

/// Inclusive interval over one scalar type. `None` bounds are unbounded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Range {
    low: Option<ScalarValue>,
    high: Option<ScalarValue>,
}

impl Range {
    pub fn new(low: Option<ScalarValue>, high: Option<ScalarValue>) -> Self {
        if let (Some(l), Some(h)) = (low.as_ref(), high.as_ref()) {
            check_same_type(l, h);
            assert!(l <= h, "range low bound {} above high bound {}", l, h);
        }
        Self { low, high }
    }

    pub fn closed(low: ScalarValue, high: ScalarValue) -> Self {
        Self::new(Some(low), Some(high))
    }

    pub fn point(value: ScalarValue) -> Self {
        Self::new(Some(value.clone()), Some(value))
    }

    pub fn at_least(low: ScalarValue) -> Self {
        Self::new(Some(low), None)
    }

    pub fn at_most(high: ScalarValue) -> Self {
        Self::new(None, Some(high))
    }

    pub fn low(&self) -> Option<&ScalarValue> {
        self.low.as_ref()
    }

    pub fn high(&self) -> Option<&ScalarValue> {
        self.high.as_ref()
    }

    pub fn contains(&self, value: &ScalarValue) -> bool {
        let above_low = match self.low.as_ref() {
            Some(low) => value >= low,
            None => true,
        };
        let below_high = match self.high.as_ref() {
            Some(high) => value <= high,
            None => true,
        };
        above_low && below_high
    }

    fn sample(&self) -> Option<&ScalarValue> {
        self.low.as_ref().or(self.high.as_ref())
    }

    /// True when `other` starts at or below this range's high bound, so the
    /// two inclusive ranges cover a contiguous region.
    fn touches(&self, other: &Range) -> bool {
        match (self.high.as_ref(), other.low.as_ref()) {
            (None, _) | (_, None) => true,
            (Some(high), Some(low)) => low <= high,
        }
    }

    fn intersect(&self, other: &Range) -> Option<Range> {
        let low = match (self.low.as_ref(), other.low.as_ref()) {
            (None, l) | (l, None) => l.cloned(),
            (Some(a), Some(b)) => Some(if a >= b { a.clone() } else { b.clone() }),
        };
        let high = match (self.high.as_ref(), other.high.as_ref()) {
            (None, h) | (h, None) => h.cloned(),
            (Some(a), Some(b)) => Some(if a <= b { a.clone() } else { b.clone() }),
        };
        if let (Some(l), Some(h)) = (low.as_ref(), high.as_ref()) {
            if l > h {
                return None;
            }
        }
        Some(Range { low, high })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low.as_ref(), self.high.as_ref()) {
            (Some(l), Some(h)) if l == h => write!(f, "{}", l),
            (Some(l), Some(h)) => write!(f, "[{}, {}]", l, h),
            (Some(l), None) => write!(f, "[{}, +inf)", l),
            (None, Some(h)) => write!(f, "(-inf, {}]", h),
            (None, None) => write!(f, "(-inf, +inf)"),
        }
    }
}

/// The kinds of value set a build side can report for one column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValueSet {
    /// Every value of the column type.
    All,
    /// No value at all (empty build side).
    None,
    /// Sorted, pairwise-disjoint inclusive ranges.
    Ranges(Vec<Range>),
    /// Sorted, deduplicated discrete values.
    Discrete(Vec<ScalarValue>),
}

impl ValueSet {
    /// Normalizes arbitrary ranges into sorted disjoint form.
    pub fn from_ranges(mut ranges: Vec<Range>) -> ValueSet {
        if ranges.is_empty() {
            return ValueSet::None;
        }
        if let Some(first) = ranges.iter().find_map(Range::sample) {
            for value in ranges.iter().filter_map(Range::sample) {
                check_same_type(first, value);
            }
        }
        ranges.sort_by(|a, b| match (a.low.as_ref(), b.low.as_ref()) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(y),
        });
        let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.touches(&range) => {
                    last.high = match (last.high.take(), range.high) {
                        (None, _) | (_, None) => None,
                        (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
                    };
                }
                _ => merged.push(range),
            }
        }
        ValueSet::Ranges(merged)
    }

    /// Normalizes discrete values into sorted deduplicated form.
    pub fn from_values(mut values: Vec<ScalarValue>) -> ValueSet {
        if values.is_empty() {
            return ValueSet::None;
        }
        let first = values[0].clone();
        for value in &values {
            check_same_type(&first, value);
        }
        values.sort();
        values.dedup();
        ValueSet::Discrete(values)
    }

    fn union(&self, other: &ValueSet) -> ValueSet {
        match (self, other) {
            (ValueSet::All, _) | (_, ValueSet::All) => ValueSet::All,
            (ValueSet::None, x) | (x, ValueSet::None) => x.clone(),
            (ValueSet::Ranges(a), ValueSet::Ranges(b)) => {
                ValueSet::from_ranges(a.iter().chain(b.iter()).cloned().collect())
            }
            (ValueSet::Discrete(a), ValueSet::Discrete(b)) => {
                ValueSet::from_values(a.iter().chain(b.iter()).cloned().collect())
            }
            (ValueSet::Discrete(values), ValueSet::Ranges(ranges))
            | (ValueSet::Ranges(ranges), ValueSet::Discrete(values)) => ValueSet::from_ranges(
                ranges
                    .iter()
                    .cloned()
                    .chain(values.iter().cloned().map(Range::point))
                    .collect(),
            ),
        }
    }

    fn intersect(&self, other: &ValueSet) -> ValueSet {
        match (self, other) {
            (ValueSet::All, x) | (x, ValueSet::All) => x.clone(),
            (ValueSet::None, _) | (_, ValueSet::None) => ValueSet::None,
            (ValueSet::Ranges(a), ValueSet::Ranges(b)) => {
                if let (Some(x), Some(y)) = (
                    a.iter().find_map(Range::sample),
                    b.iter().find_map(Range::sample),
                ) {
                    check_same_type(x, y);
                }
                let mut out = Vec::new();
                for left in a {
                    for right in b {
                        if let Some(range) = left.intersect(right) {
                            out.push(range);
                        }
                    }
                }
                ValueSet::from_ranges(out)
            }
            (ValueSet::Discrete(a), ValueSet::Discrete(b)) => {
                if let (Some(x), Some(y)) = (a.first(), b.first()) {
                    check_same_type(x, y);
                }
                ValueSet::from_values(a.iter().filter(|v| b.contains(v)).cloned().collect())
            }
            (ValueSet::Discrete(values), ValueSet::Ranges(ranges))
            | (ValueSet::Ranges(ranges), ValueSet::Discrete(values)) => {
                if let (Some(x), Some(y)) =
                    (values.first(), ranges.iter().find_map(Range::sample))
                {
                    check_same_type(x, y);
                }
                ValueSet::from_values(
                    values
                        .iter()
                        .filter(|v| ranges.iter().any(|r| r.contains(v)))
                        .cloned()
                        .collect(),
                )
            }
        }
    }

    fn bounds(&self) -> Option<(Option<ScalarValue>, Option<ScalarValue>)> {
        match self {
            ValueSet::All | ValueSet::None => None,
            ValueSet::Ranges(ranges) => {
                // Ranges are sorted by low bound, unbounded lows first.
                let low = ranges.first().and_then(|r| r.low.clone());
                let mut high = None;
                for range in ranges {
                    match range.high.as_ref() {
                        None => return Some((low, None)),
                        Some(h) => {
                            if high.as_ref().map(|max| h > max).unwrap_or(true) {
                                high = Some(h.clone());
                            }
                        }
                    }
                }
                Some((low, high))
            }
            ValueSet::Discrete(values) => {
                Some((values.first().cloned(), values.last().cloned()))
            }
        }
    }
}

/// Semantic value set over one column's type.
///
/// Every published domain is a conservative over-approximation of the true
/// build-side key set until the filter is declared complete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Domain {
    values: ValueSet,
}

impl Domain {
    pub fn all() -> Self {
        Self {
            values: ValueSet::All,
        }
    }

    pub fn none() -> Self {
        Self {
            values: ValueSet::None,
        }
    }

    pub fn singleton(value: ScalarValue) -> Self {
        Self {
            values: ValueSet::from_values(vec![value]),
        }
    }

    pub fn multiple(values: Vec<ScalarValue>) -> Self {
        Self {
            values: ValueSet::from_values(values),
        }
    }

    pub fn range(low: ScalarValue, high: ScalarValue) -> Self {
        Self {
            values: ValueSet::from_ranges(vec![Range::closed(low, high)]),
        }
    }

    pub fn from_ranges(ranges: Vec<Range>) -> Self {
        Self {
            values: ValueSet::from_ranges(ranges),
        }
    }

    pub fn values(&self) -> &ValueSet {
        &self.values
    }

    pub fn is_all(&self) -> bool {
        matches!(self.values, ValueSet::All)
    }

    pub fn is_none(&self) -> bool {
        matches!(self.values, ValueSet::None)
    }

    pub fn union(&self, other: &Domain) -> Domain {
        Domain {
            values: self.values.union(&other.values),
        }
    }

    pub fn intersect(&self, other: &Domain) -> Domain {
        Domain {
            values: self.values.intersect(&other.values),
        }
    }

    /// Union of a non-empty list of domains, as reported by the build tasks
    /// of one stage.
    pub fn union_of(domains: &[Domain]) -> Domain {
        assert!(!domains.is_empty(), "union of zero domains");
        domains
            .iter()
            .skip(1)
            .fold(domains[0].clone(), |acc, d| acc.union(d))
    }

    /// Lossy widening to at most `threshold` disjuncts, for display purposes.
    ///
    /// The result is always a superset of `self`.
    pub fn simplify(&self, threshold: usize) -> Domain {
        assert!(threshold > 0, "simplify threshold must be positive");
        let span = |set: &ValueSet| -> ValueSet {
            match set.bounds() {
                Some((low, high)) => ValueSet::Ranges(vec![Range::new(low, high)]),
                None => set.clone(),
            }
        };
        match &self.values {
            ValueSet::Ranges(ranges) if ranges.len() > threshold => Domain {
                values: span(&self.values),
            },
            ValueSet::Discrete(values) if values.len() > threshold => Domain {
                values: span(&self.values),
            },
            _ => self.clone(),
        }
    }

    /// Number of range disjuncts, for the stats projection. Discrete and
    /// all/none domains report zero.
    pub fn range_count(&self) -> usize {
        match &self.values {
            ValueSet::Ranges(ranges) => ranges.len(),
            _ => 0,
        }
    }

    /// Number of discrete values, for the stats projection. Range-backed and
    /// all/none domains report zero.
    pub fn discrete_values_count(&self) -> usize {
        match &self.values {
            ValueSet::Discrete(values) => values.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.values {
            ValueSet::All => write!(f, "ALL"),
            ValueSet::None => write!(f, "NONE"),
            ValueSet::Ranges(ranges) => {
                write!(f, "[")?;
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", range)?;
                }
                write!(f, "]")
            }
            ValueSet::Discrete(values) => {
                write!(f, "{{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Domain, Range, ScalarValue, ValueSet};

    fn int(v: i64) -> ScalarValue {
        ScalarValue::Int(v)
    }

    #[test]
    fn test_union_with_all_is_all() {
        let d = Domain::range(int(1), int(5));
        assert!(d.union(&Domain::all()).is_all());
        assert!(Domain::all().union(&d).is_all());
    }

    #[test]
    fn test_intersect_with_all_is_identity() {
        let d = Domain::range(int(1), int(5));
        assert_eq!(d.intersect(&Domain::all()), d);
        assert_eq!(Domain::all().intersect(&d), d);
    }

    #[test]
    fn test_union_keeps_disjoint_ranges() {
        let d = Domain::range(int(1), int(5)).union(&Domain::range(int(7), int(9)));
        assert_eq!(d.range_count(), 2);
        assert_eq!(d.to_string(), "[[1, 5], [7, 9]]");
    }

    #[test]
    fn test_union_merges_overlapping_ranges() {
        let d = Domain::range(int(1), int(5)).union(&Domain::range(int(4), int(9)));
        assert_eq!(d.range_count(), 1);
        assert_eq!(d.to_string(), "[[1, 9]]");
    }

    #[test]
    fn test_intersect_ranges() {
        let a = Domain::range(int(1), int(5));
        let b = Domain::range(int(3), int(9));
        assert_eq!(a.intersect(&b), Domain::range(int(3), int(5)));
        let c = Domain::range(int(7), int(9));
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_discrete_union_and_intersect() {
        let a = Domain::multiple(vec![int(1), int(2), int(3)]);
        let b = Domain::multiple(vec![int(3), int(4)]);
        assert_eq!(
            a.union(&b),
            Domain::multiple(vec![int(1), int(2), int(3), int(4)])
        );
        assert_eq!(a.intersect(&b), Domain::singleton(int(3)));
    }

    #[test]
    fn test_discrete_against_ranges() {
        let values = Domain::multiple(vec![int(2), int(8)]);
        let ranges = Domain::range(int(1), int(5));
        assert_eq!(values.intersect(&ranges), Domain::singleton(int(2)));
        let union = values.union(&ranges);
        assert_eq!(union.range_count(), 2);
    }

    #[test]
    fn test_union_of_matches_pairwise_union() {
        let domains = vec![
            Domain::range(int(1), int(5)),
            Domain::range(int(7), int(9)),
            Domain::all(),
        ];
        assert!(Domain::union_of(&domains).is_all());
    }

    #[test]
    fn test_simplify_collapses_to_span() {
        let d = Domain::range(int(1), int(2))
            .union(&Domain::range(int(4), int(5)))
            .union(&Domain::range(int(8), int(9)));
        assert_eq!(d.range_count(), 3);
        let simplified = d.simplify(1);
        assert_eq!(simplified.range_count(), 1);
        assert_eq!(simplified.to_string(), "[[1, 9]]");
        // Simplify never narrows.
        assert_eq!(simplified.intersect(&d), d);
    }

    #[test]
    fn test_simplify_discrete_collapses_to_range() {
        let d = Domain::multiple(vec![int(1), int(5), int(42)]);
        let simplified = d.simplify(1);
        assert_eq!(simplified.discrete_values_count(), 0);
        assert_eq!(simplified.to_string(), "[[1, 42]]");
    }

    #[test]
    fn test_simplify_below_threshold_is_identity() {
        let d = Domain::range(int(1), int(5)).union(&Domain::range(int(7), int(9)));
        assert_eq!(d.simplify(2), d);
    }

    #[test]
    fn test_normalization_of_value_lists() {
        let set = ValueSet::from_values(vec![int(3), int(1), int(3), int(2)]);
        assert_eq!(set, ValueSet::Discrete(vec![int(1), int(2), int(3)]));
        assert_eq!(ValueSet::from_values(Vec::new()), ValueSet::None);
        assert_eq!(ValueSet::from_ranges(Vec::new()), ValueSet::None);
    }

    #[test]
    fn test_unbounded_ranges() {
        let low = Domain::from_ranges(vec![Range::at_most(int(5))]);
        let high = Domain::from_ranges(vec![Range::at_least(int(3))]);
        let both = low.intersect(&high);
        assert_eq!(both, Domain::range(int(3), int(5)));
        let union = low.union(&high);
        assert_eq!(union.to_string(), "[(-inf, +inf)]");
    }

    #[test]
    #[should_panic(expected = "scalar type mismatch")]
    fn test_mixed_types_panic() {
        let ints = Domain::singleton(int(1));
        let strings = Domain::singleton(ScalarValue::Varchar("x".to_string()));
        let _ = ints.union(&strings);
    }
}
