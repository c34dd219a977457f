use std::collections::BTreeMap;

use thiserror::Error;

pub mod catalog;
pub mod price;

pub use price::{CrossFieldMode, PriceRangeRule};

/// Value shape a query parameter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Catalog identifiers: `0`, negatives and non-numeric input are rejected.
    PositiveInteger,
    /// Decimal numbers, optionally bounded (prices).
    SignedNumber,
    /// Unvalidated text such as `search`.
    FreeText,
    /// Ordering key from a closed set, optionally prefixed with `-` for descending order.
    SortKey(Vec<String>),
}

impl ParameterKind {
    /// Numeric kinds narrow the result set and take part in filter combinations.
    pub fn is_filter(&self) -> bool {
        matches!(self, Self::PositiveInteger | Self::SignedNumber)
    }
}

/// Inclusive numeric bounds. `max` is the ceiling: the largest identifier known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min as f64) && self.max.is_none_or(|max| value <= max as f64)
    }
}

/// Declarative validation contract of a single query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRule {
    name: String,
    kind: ParameterKind,
    bounds: Option<Bounds>,
    multi_valued: bool,
    empty_is_valid: bool,
    samples: Vec<String>,
    combination_value: Option<String>,
    count_column: Option<String>,
}

impl ParameterRule {
    /// Identifier filter: `min = 1`, multi-valued, empty value means "no filter".
    pub fn positive_integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::PositiveInteger,
            bounds: Some(Bounds {
                min: Some(1),
                max: None,
            }),
            multi_valued: true,
            empty_is_valid: true,
            samples: vec!["1".into(), "2".into(), "3".into()],
            combination_value: None,
            count_column: None,
        }
    }

    /// Single-valued numeric filter without bounds.
    pub fn signed_number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::SignedNumber,
            bounds: None,
            multi_valued: false,
            empty_is_valid: true,
            samples: vec!["1".into()],
            combination_value: None,
            count_column: None,
        }
    }

    pub fn free_text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::FreeText,
            bounds: None,
            multi_valued: false,
            empty_is_valid: true,
            samples: vec!["abc".into(), "1".into()],
            combination_value: None,
            count_column: None,
        }
    }

    pub fn sort_key<I, S>(name: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepted: Vec<String> = accepted.into_iter().map(Into::into).collect();
        Self {
            name: name.into(),
            samples: accepted.clone(),
            kind: ParameterKind::SortKey(accepted),
            bounds: None,
            multi_valued: false,
            empty_is_valid: true,
            combination_value: None,
            count_column: None,
        }
    }

    pub fn with_ceiling(mut self, max: i64) -> Self {
        let bounds = self.bounds.get_or_insert_with(Bounds::default);
        bounds.max = Some(max);
        self
    }

    pub fn with_min(mut self, min: i64) -> Self {
        let bounds = self.bounds.get_or_insert_with(Bounds::default);
        bounds.min = Some(min);
        self
    }

    pub fn multi_valued(mut self, multi_valued: bool) -> Self {
        self.multi_valued = multi_valued;
        self
    }

    pub fn empty_is_valid(mut self, empty_is_valid: bool) -> Self {
        self.empty_is_valid = empty_is_valid;
        self
    }

    pub fn with_samples<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.samples = samples.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_combination_value(mut self, value: impl Into<String>) -> Self {
        self.combination_value = Some(value.into());
        self
    }

    pub fn with_count_column(mut self, column: impl Into<String>) -> Self {
        self.count_column = Some(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Largest valid identifier, if the catalog size is known.
    pub fn ceiling(&self) -> Option<i64> {
        self.bounds.and_then(|bounds| bounds.max)
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn is_empty_valid(&self) -> bool {
        self.empty_is_valid
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Value used when this parameter joins a multi-parameter case.
    pub fn combination_value(&self) -> &str {
        self.combination_value
            .as_deref()
            .or_else(|| self.samples.first().map(String::as_str))
            .unwrap_or_default()
    }

    pub fn count_column(&self) -> Option<&str> {
        self.count_column.as_deref()
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("parameter name must not be empty".into());
        }
        if self.samples.is_empty() {
            return Err("at least one valid sample is required".into());
        }

        match &self.kind {
            ParameterKind::PositiveInteger => {
                let min = self.bounds.and_then(|bounds| bounds.min);
                if !min.is_some_and(|min| min >= 1) {
                    return Err("positive integer rules require a minimum of at least 1".into());
                }
                self.validate_numeric_samples(|sample| sample.parse::<i64>().ok().map(|v| v as f64))
            }
            ParameterKind::SignedNumber => {
                self.validate_numeric_samples(|sample| sample.parse::<f64>().ok())
            }
            ParameterKind::SortKey(accepted) => {
                if accepted.is_empty() {
                    return Err("sort rules require at least one accepted key".into());
                }
                if accepted.iter().any(|key| key.is_empty() || key.starts_with('-')) {
                    return Err("sort keys must be non-empty and must not carry a '-' prefix".into());
                }
                let unaccepted = self
                    .samples
                    .iter()
                    .chain(self.combination_value.iter())
                    .find(|value| !accepted.contains(value));
                match unaccepted {
                    Some(value) => Err(format!("value '{value}' is not an accepted sort key")),
                    None => Ok(()),
                }
            }
            ParameterKind::FreeText => Ok(()),
        }
    }

    fn validate_numeric_samples(&self, parse: impl Fn(&str) -> Option<f64>) -> Result<(), String> {
        let bounds = self.bounds.unwrap_or_default();
        let values = self
            .samples
            .iter()
            .chain(self.combination_value.iter());
        for sample in values {
            match parse(sample) {
                Some(value) if bounds.contains(value) => {}
                Some(_) => return Err(format!("sample '{sample}' lies outside the rule bounds")),
                None => return Err(format!("sample '{sample}' is not numeric")),
            }
        }
        Ok(())
    }
}

/// Registry misuse. These are programmer errors and abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("parameter rule '{0}' is already registered")]
    DuplicateRule(String),
    #[error("no rule registered for parameter '{0}'")]
    UnknownParameter(String),
    #[error("parameter rule '{name}' is invalid: {reason}")]
    InvalidRule { name: String, reason: String },
}

/// Name-keyed rule set, composed once at startup and read-only afterwards.
///
/// Iteration follows ascending parameter name so generated cases keep a stable order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, ParameterRule>,
    price: Option<PriceRangeRule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: ParameterRule) -> Result<(), RegistryError> {
        if self.rules.contains_key(rule.name()) {
            return Err(RegistryError::DuplicateRule(rule.name().to_string()));
        }
        rule.validate().map_err(|reason| RegistryError::InvalidRule {
            name: rule.name().to_string(),
            reason,
        })?;
        self.rules.insert(rule.name().to_string(), rule);
        Ok(())
    }

    /// Attach the min/max cross-field rule. Both keys must already be registered.
    pub fn register_price_range(&mut self, price: PriceRangeRule) -> Result<(), RegistryError> {
        self.get(price.min_key())?;
        self.get(price.max_key())?;
        self.price = Some(price);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ParameterRule, RegistryError> {
        self.rules
            .get(name)
            .ok_or_else(|| RegistryError::UnknownParameter(name.to_string()))
    }

    pub fn price_range(&self) -> Option<&PriceRangeRule> {
        self.price.as_ref()
    }

    pub fn rules(&self) -> impl Iterator<Item = &ParameterRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
