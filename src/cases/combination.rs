use reqwest::StatusCode;

use super::{CaseClass, TestCase, pair};
use crate::rules::{ParameterKind, ParameterRule, PriceRangeRule, RuleRegistry};

const SUBJECT: &str = "combination";

// Bounds used for the price ordering cases: low < mid < high.
const PRICE_LOW: &str = "100";
const PRICE_MID: &str = "150";
const PRICE_HIGH: &str = "200";

/// Multi-parameter cases built only from values the single-parameter rules accept.
///
/// The only invalid combinations produced are the ones the price cross-field rule
/// declares; every other mix is expected to be accepted.
pub struct CombinationGenerator<'a> {
    registry: &'a RuleRegistry,
    path: &'a str,
    pairwise: bool,
}

impl<'a> CombinationGenerator<'a> {
    pub fn new(registry: &'a RuleRegistry, path: &'a str) -> Self {
        Self {
            registry,
            path,
            pairwise: false,
        }
    }

    /// Also emit one case per pair of filter parameters.
    pub fn with_pairwise(mut self, pairwise: bool) -> Self {
        self.pairwise = pairwise;
        self
    }

    pub fn cases(&self) -> Vec<TestCase> {
        let mut cases = vec![self.case(Vec::new(), CaseClass::Baseline)];

        let filters: Vec<&ParameterRule> = self
            .registry
            .rules()
            .filter(|rule| rule.kind().is_filter())
            .collect();

        if !filters.is_empty() {
            let query = filters
                .iter()
                .map(|rule| pair(rule.name(), rule.combination_value()))
                .collect();
            cases.push(self.case(query, CaseClass::AllFilters));
        }

        if let Some(query) = self.filter_sort_search() {
            cases.push(self.case(query, CaseClass::FilterSortSearch));
        }

        if let Some(price) = self.registry.price_range() {
            cases.extend(self.price_cases(price));
        }

        if self.pairwise {
            for (index, left) in filters.iter().enumerate() {
                for right in &filters[index + 1..] {
                    let query = vec![
                        pair(left.name(), left.combination_value()),
                        pair(right.name(), right.combination_value()),
                    ];
                    let class = CaseClass::Pair(left.name().into(), right.name().into());
                    cases.push(self.case(query, class));
                }
            }
        }

        cases
    }

    fn filter_sort_search(&self) -> Option<Vec<(String, String)>> {
        let first_of = |wanted: fn(&ParameterKind) -> bool| {
            self.registry.rules().find(|rule| wanted(rule.kind()))
        };
        let search = first_of(|kind| matches!(kind, ParameterKind::FreeText));
        let sort = first_of(|kind| matches!(kind, ParameterKind::SortKey(_)));
        if search.is_none() && sort.is_none() {
            return None;
        }

        let mut query: Vec<_> = [search, sort]
            .into_iter()
            .flatten()
            .map(|rule| pair(rule.name(), rule.combination_value()))
            .collect();

        match self.registry.price_range() {
            Some(price) => {
                query.push(pair(price.min_key(), PRICE_LOW));
                query.push(pair(price.max_key(), PRICE_HIGH));
            }
            None => {
                let filter = first_of(ParameterKind::is_filter)?;
                query.push(pair(filter.name(), filter.combination_value()));
            }
        }
        Some(query)
    }

    fn price_cases(&self, price: &PriceRangeRule) -> Vec<TestCase> {
        let (min, max) = (price.min_key(), price.max_key());
        [
            vec![pair(min, PRICE_HIGH), pair(max, PRICE_LOW)],
            vec![pair(max, PRICE_MID), pair(min, PRICE_HIGH)],
            vec![pair(min, PRICE_HIGH), pair(max, PRICE_HIGH)],
            vec![pair(min, PRICE_LOW), pair(max, PRICE_HIGH)],
        ]
        .into_iter()
        .map(|query| self.case(query, CaseClass::PriceRange))
        .collect()
    }

    fn case(&self, query: Vec<(String, String)>, class: CaseClass) -> TestCase {
        let status = self
            .registry
            .price_range()
            .map(|price| price.expected_for_query(&query))
            .unwrap_or(StatusCode::OK);
        TestCase::new(self.path, query, status, class, SUBJECT)
    }
}
