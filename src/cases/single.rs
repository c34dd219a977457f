use std::vec;

use reqwest::StatusCode;

use super::{CaseClass, TestCase, pair};
use crate::rules::{ParameterKind, ParameterRule};

const ABOVE_CEILING_MARGIN: i64 = 1000;
const NON_NUMERIC: &str = "abc";
const FRACTIONAL: f64 = 12.5;
const UNKNOWN_SORT_CANDIDATES: [&str; 3] = ["abc", "unknown", "zzz"];

/// Lazily expands one rule into its equivalence-class cases.
///
/// The class plan is fixed per rule kind, so two runs over the same rule yield the
/// same cases in the same order. Cases are only built when the iterator is advanced.
pub struct CaseGenerator<'a> {
    rule: &'a ParameterRule,
    path: &'a str,
    plan: vec::IntoIter<CaseClass>,
}

impl<'a> CaseGenerator<'a> {
    pub fn new(rule: &'a ParameterRule, path: &'a str) -> Self {
        Self {
            rule,
            path,
            plan: plan_for(rule).into_iter(),
        }
    }

    fn build(&self, class: CaseClass) -> TestCase {
        let name = self.rule.name();
        let single = |value: String| vec![pair(name, value)];
        let (query, status) = match &class {
            CaseClass::Valid => (
                single(self.rule.samples().first().cloned().unwrap_or_default()),
                StatusCode::OK,
            ),
            CaseClass::Repeated(count) => (
                self.rule
                    .samples()
                    .iter()
                    .take(*count)
                    .map(|value| pair(name, value.as_str()))
                    .collect(),
                StatusCode::OK,
            ),
            CaseClass::Fractional => (
                single(fractional_value(self.rule).unwrap_or_default().to_string()),
                StatusCode::OK,
            ),
            CaseClass::Empty => (single(String::new()), self.empty_status()),
            CaseClass::NonNumeric => (single(NON_NUMERIC.into()), StatusCode::BAD_REQUEST),
            CaseClass::Zero => (single("0".into()), StatusCode::BAD_REQUEST),
            CaseClass::Negative => (single("-1".into()), StatusCode::BAD_REQUEST),
            CaseClass::AtMinimum => (single(self.min().to_string()), StatusCode::OK),
            CaseClass::BelowMinimum => (
                single(below_minimum(self.rule).unwrap_or_default().to_string()),
                StatusCode::BAD_REQUEST,
            ),
            CaseClass::AboveCeiling => (
                single(above_ceiling(self.rule).unwrap_or_default().to_string()),
                StatusCode::BAD_REQUEST,
            ),
            CaseClass::Text(text) => (single(text.clone()), StatusCode::OK),
            CaseClass::SortAscending(key) => (single(key.clone()), StatusCode::OK),
            CaseClass::SortDescending(key) => (single(format!("-{key}")), StatusCode::OK),
            CaseClass::UnknownSortKey => (single(self.unknown_sort_key()), StatusCode::BAD_REQUEST),
            CaseClass::UnknownSortKeyDescending => (
                single(format!("-{}", self.unknown_sort_key())),
                StatusCode::BAD_REQUEST,
            ),
            CaseClass::Absent => (Vec::new(), StatusCode::OK),
            CaseClass::Baseline
            | CaseClass::AllFilters
            | CaseClass::FilterSortSearch
            | CaseClass::PriceRange
            | CaseClass::Pair(..) => unreachable!("multi-parameter class in single-parameter plan"),
        };
        TestCase::new(self.path, query, status, class, name)
    }

    fn empty_status(&self) -> StatusCode {
        if self.rule.is_empty_valid() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    fn min(&self) -> i64 {
        self.rule
            .bounds()
            .and_then(|bounds| bounds.min)
            .unwrap_or_default()
    }

    fn unknown_sort_key(&self) -> String {
        let accepted = match self.rule.kind() {
            ParameterKind::SortKey(accepted) => accepted.as_slice(),
            _ => &[],
        };
        UNKNOWN_SORT_CANDIDATES
            .iter()
            .find(|candidate| !accepted.iter().any(|key| key == *candidate))
            .map(|candidate| candidate.to_string())
            .unwrap_or_else(|| format!("{}_unknown", accepted.join("_")))
    }
}

impl Iterator for CaseGenerator<'_> {
    type Item = TestCase;

    fn next(&mut self) -> Option<Self::Item> {
        let class = self.plan.next()?;
        Some(self.build(class))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

impl ExactSizeIterator for CaseGenerator<'_> {}

fn plan_for(rule: &ParameterRule) -> Vec<CaseClass> {
    let mut plan = Vec::new();
    let samples = rule.samples().len();
    let repeated = |plan: &mut Vec<CaseClass>| {
        if rule.is_multi_valued() {
            plan.extend((2..=samples.min(3)).map(CaseClass::Repeated));
        }
    };

    match rule.kind() {
        ParameterKind::PositiveInteger => {
            plan.push(CaseClass::Valid);
            repeated(&mut plan);
            plan.extend([
                CaseClass::Empty,
                CaseClass::NonNumeric,
                CaseClass::Zero,
                CaseClass::Negative,
            ]);
            if above_ceiling(rule).is_some() {
                plan.push(CaseClass::AboveCeiling);
            }
        }
        ParameterKind::SignedNumber => {
            plan.push(CaseClass::Valid);
            if fractional_value(rule).is_some() {
                plan.push(CaseClass::Fractional);
            }
            repeated(&mut plan);
            plan.extend([CaseClass::Empty, CaseClass::NonNumeric]);
            if rule.bounds().is_some_and(|bounds| bounds.min.is_some()) {
                plan.push(CaseClass::AtMinimum);
            }
            if below_minimum(rule).is_some() {
                plan.push(CaseClass::BelowMinimum);
            }
            if above_ceiling(rule).is_some() {
                plan.push(CaseClass::AboveCeiling);
            }
        }
        ParameterKind::FreeText => {
            plan.extend(rule.samples().iter().cloned().map(CaseClass::Text));
            plan.push(CaseClass::Empty);
        }
        ParameterKind::SortKey(accepted) => {
            for key in accepted {
                plan.push(CaseClass::SortAscending(key.clone()));
                plan.push(CaseClass::SortDescending(key.clone()));
            }
            plan.extend([CaseClass::UnknownSortKey, CaseClass::UnknownSortKeyDescending]);
        }
    }

    plan.push(CaseClass::Absent);
    plan
}

/// A non-integral value inside the rule bounds, or `None` when the bounds leave no room.
fn fractional_value(rule: &ParameterRule) -> Option<f64> {
    let bounds = rule.bounds().unwrap_or_default();
    let near_sample = rule
        .samples()
        .first()
        .and_then(|sample| sample.parse::<f64>().ok())
        .map(|value| value.trunc() + 0.5);
    let near_min = bounds.min.map(|min| min as f64 + 0.5);
    [Some(FRACTIONAL), near_sample, near_min]
        .into_iter()
        .flatten()
        .find(|value| value.fract() != 0.0 && bounds.contains(*value))
}

fn below_minimum(rule: &ParameterRule) -> Option<i64> {
    rule.bounds()?.min?.checked_sub(1)
}

fn above_ceiling(rule: &ParameterRule) -> Option<i64> {
    rule.ceiling()?.checked_add(ABOVE_CEILING_MARGIN)
}
