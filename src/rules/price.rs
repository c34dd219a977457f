use reqwest::StatusCode;

/// How the min/max ordering constraint treats equal bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CrossFieldMode {
    /// Only `min > max` is rejected; equal bounds select a single price.
    #[default]
    Strict,
    /// `min >= max` is rejected.
    Inclusive,
}

/// Cross-field ordering rule spanning a minimum and a maximum price parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRangeRule {
    min_key: String,
    max_key: String,
    mode: CrossFieldMode,
}

impl PriceRangeRule {
    pub fn new(min_key: impl Into<String>, max_key: impl Into<String>) -> Self {
        Self {
            min_key: min_key.into(),
            max_key: max_key.into(),
            mode: CrossFieldMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CrossFieldMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn min_key(&self) -> &str {
        &self.min_key
    }

    pub fn max_key(&self) -> &str {
        &self.max_key
    }

    pub fn mode(&self) -> CrossFieldMode {
        self.mode
    }

    /// Status the service owes for the given bounds.
    ///
    /// Only the ordering is judged here; a missing, empty or non-numeric side leaves the
    /// verdict to the single-parameter rules, so the pair is reported as `200 OK`.
    pub fn expected_status(&self, min: Option<&str>, max: Option<&str>) -> StatusCode {
        let (Some(min), Some(max)) = (parse_price(min), parse_price(max)) else {
            return StatusCode::OK;
        };
        let rejected = match self.mode {
            CrossFieldMode::Strict => min > max,
            CrossFieldMode::Inclusive => min >= max,
        };
        if rejected {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }

    /// Expected status for an ordered query, reading the last occurrence of each key.
    pub fn expected_for_query(&self, query: &[(String, String)]) -> StatusCode {
        let last = |key: &str| {
            query
                .iter()
                .rev()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
        };
        self.expected_status(last(&self.min_key), last(&self.max_key))
    }
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<f64>().ok())
}
