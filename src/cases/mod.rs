use std::fmt;

use reqwest::StatusCode;

pub mod combination;
pub mod single;

pub use combination::CombinationGenerator;
pub use single::CaseGenerator;

/// Equivalence class a generated case exercises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseClass {
    Valid,
    Repeated(usize),
    Fractional,
    Empty,
    NonNumeric,
    Zero,
    Negative,
    AtMinimum,
    BelowMinimum,
    AboveCeiling,
    Text(String),
    SortAscending(String),
    SortDescending(String),
    UnknownSortKey,
    UnknownSortKeyDescending,
    Absent,
    Baseline,
    AllFilters,
    FilterSortSearch,
    PriceRange,
    Pair(String, String),
}

impl fmt::Display for CaseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("single valid value"),
            Self::Repeated(count) => write!(f, "{count} repeated valid values"),
            Self::Fractional => f.write_str("fractional value"),
            Self::Empty => f.write_str("empty value"),
            Self::NonNumeric => f.write_str("non-numeric value"),
            Self::Zero => f.write_str("zero"),
            Self::Negative => f.write_str("negative value"),
            Self::AtMinimum => f.write_str("value at lower bound"),
            Self::BelowMinimum => f.write_str("value below lower bound"),
            Self::AboveCeiling => f.write_str("value above ceiling"),
            Self::Text(text) => write!(f, "text {text:?}"),
            Self::SortAscending(key) => write!(f, "ascending by {key}"),
            Self::SortDescending(key) => write!(f, "descending by {key}"),
            Self::UnknownSortKey => f.write_str("unknown sort key"),
            Self::UnknownSortKeyDescending => f.write_str("unknown descending sort key"),
            Self::Absent => f.write_str("parameter absent"),
            Self::Baseline => f.write_str("no parameters"),
            Self::AllFilters => f.write_str("all filters"),
            Self::FilterSortSearch => f.write_str("filter, sort and search"),
            Self::PriceRange => f.write_str("price range"),
            Self::Pair(left, right) => write!(f, "pair {left} + {right}"),
        }
    }
}

/// One concrete request and the status the service owes for it.
///
/// Immutable once generated; the runner hands it to the probe exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    path: String,
    query: Vec<(String, String)>,
    expected_status: StatusCode,
    class: CaseClass,
    label: String,
}

impl TestCase {
    pub fn new(
        path: impl Into<String>,
        query: Vec<(String, String)>,
        expected_status: StatusCode,
        class: CaseClass,
        subject: &str,
    ) -> Self {
        let label = format!("{subject}: {class}");
        Self {
            path: path.into(),
            query,
            expected_status,
            class,
            label,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn expected_status(&self) -> StatusCode {
        self.expected_status
    }

    pub fn class(&self) -> &CaseClass {
        &self.class
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Query string as the probe sends it, keys repeated for multiple values.
    pub fn query_string(&self) -> String {
        encode_query(&self.query)
    }
}

/// Form-encode ordered pairs. Repeated keys stay repeated (`k=1&k=2`), never `k[]=`.
pub fn encode_query(query: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .finish()
}

pub(crate) fn pair(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}
