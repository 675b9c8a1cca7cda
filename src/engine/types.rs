use std::fmt;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::engine::errors::AggError;
use crate::wire::RespValue;

pub const DEFAULT_QUERY: &str = "*";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_DIALECT: u32 = 2;

/// A requested field in both its `@`-prefixed (GROUPBY) and plain (row key) forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub at: String,
    pub plain: String,
}

impl FieldSpec {
    pub fn parse(raw: &str) -> Result<Self, AggError> {
        let plain = raw.strip_prefix('@').unwrap_or(raw).trim();
        if plain.is_empty() {
            return Err(AggError::InvalidField(raw.to_string()));
        }
        Ok(Self {
            at: format!("@{plain}"),
            plain: plain.to_string(),
        })
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain)
    }
}

/// One result row, keyed by attribute name without `@`. Only valid for its page.
pub type Row = IndexMap<String, RespValue>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: i64,
}

impl ValueCount {
    pub fn new(value: impl Into<String>, count: i64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }

    /// Extracts `(value, count)` from a row; `None` if either is missing or unreadable.
    pub fn from_row(row: &Row, plain: &str) -> Option<Self> {
        let value = row.get(plain)?.to_text()?;
        let count = row.get("count")?.as_int()?;
        Some(Self { value, count })
    }
}

pub type FieldResult = Vec<ValueCount>;

/// Server-assigned cursor id. Zero means there is nothing left to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorHandle(pub u64);

impl CursorHandle {
    pub const EXHAUSTED: CursorHandle = CursorHandle(0);

    pub fn from_reply(value: &RespValue) -> Self {
        value
            .as_int()
            .filter(|id| *id > 0)
            .map_or(Self::EXHAUSTED, |id| CursorHandle(id as u64))
    }

    pub fn is_exhausted(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// One bounded, server-sorted request per field.
    TopN(usize),
    /// Cursor pagination until exhaustion or the per-field cap.
    Cursor,
}

/// Immutable description of one aggregation call.
#[derive(Debug, Clone)]
pub struct AggregationRequest {
    index: String,
    query: String,
    fields: Vec<FieldSpec>,
    mode: AggregationMode,
    batch_size: usize,
    max_groups_per_field: Option<usize>,
    sort_desc: bool,
    timeout_ms: Option<u64>,
    dialect: u32,
}

impl AggregationRequest {
    pub fn builder(index: impl Into<String>) -> AggregationRequestBuilder {
        AggregationRequestBuilder::new(index)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_groups_per_field(&self) -> Option<usize> {
        self.max_groups_per_field
    }

    pub fn sort_desc(&self) -> bool {
        self.sort_desc
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn dialect(&self) -> u32 {
        self.dialect
    }

    /// True once `len` entries reach the per-field cap.
    pub fn cap_reached(&self, len: usize) -> bool {
        self.max_groups_per_field.is_some_and(|k| len >= k)
    }
}

#[derive(Debug, Clone)]
pub struct AggregationRequestBuilder {
    index: String,
    query: String,
    fields: Vec<String>,
    top_n: Option<usize>,
    batch_size: usize,
    max_groups_per_field: Option<usize>,
    sort_desc: bool,
    timeout_ms: Option<u64>,
    dialect: u32,
}

impl AggregationRequestBuilder {
    fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: DEFAULT_QUERY.to_string(),
            fields: Vec::new(),
            top_n: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_groups_per_field: None,
            sort_desc: true,
            timeout_ms: None,
            dialect: DEFAULT_DIALECT,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Switches to top-N mode: one bounded, server-sorted page per field.
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn max_groups_per_field(mut self, k: usize) -> Self {
        self.max_groups_per_field = Some(k);
        self
    }

    pub fn sort_desc(mut self, sort_desc: bool) -> Self {
        self.sort_desc = sort_desc;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn dialect(mut self, dialect: u32) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn build(self) -> Result<AggregationRequest, AggError> {
        if self.index.trim().is_empty() {
            return Err(AggError::InvalidConfig("index name is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(AggError::InvalidConfig(
                "batch size must be greater than zero".into(),
            ));
        }
        if self.top_n == Some(0) {
            return Err(AggError::InvalidConfig("top-n must be greater than zero".into()));
        }
        if self.max_groups_per_field == Some(0) {
            return Err(AggError::InvalidConfig(
                "max groups per field must be greater than zero".into(),
            ));
        }

        let mut seen = IndexSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for raw in &self.fields {
            let spec = FieldSpec::parse(raw)?;
            if seen.insert(spec.plain.clone()) {
                fields.push(spec);
            } else {
                warn!(target: "rqe::orchestrator", field = %spec, "Duplicate field requested; keeping first occurrence");
            }
        }

        Ok(AggregationRequest {
            index: self.index,
            query: self.query,
            fields,
            mode: self.top_n.map_or(AggregationMode::Cursor, AggregationMode::TopN),
            batch_size: self.batch_size,
            max_groups_per_field: self.max_groups_per_field,
            sort_desc: self.sort_desc,
            timeout_ms: self.timeout_ms,
            dialect: self.dialect,
        })
    }
}

/// Per-field results of one call, plus the fields that failed and the wall time.
#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    pub results: IndexMap<String, FieldResult>,
    pub failures: IndexMap<String, AggError>,
    /// Reply pages each field received: the initial page plus every non-empty READ.
    pub pages: IndexMap<String, usize>,
    pub elapsed: Duration,
}

impl AggregationOutcome {
    pub fn field(&self, plain: &str) -> Option<&FieldResult> {
        self.results.get(plain)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sum of all counts for a field; the number of matched documents when uncapped.
    pub fn total(&self, plain: &str) -> i64 {
        self.results
            .get(plain)
            .map_or(0, |r| r.iter().map(|vc| vc.count).sum())
    }

    /// All-or-nothing view: the first field failure becomes the error.
    pub fn into_result(self) -> Result<Self, AggError> {
        match self.failures.values().next() {
            Some(err) => Err(err.clone()),
            None => Ok(self),
        }
    }

    pub fn to_json(&self) -> Value {
        let failures: IndexMap<&String, String> = self
            .failures
            .iter()
            .map(|(field, err)| (field, err.to_string()))
            .collect();
        json!({
            "results": self.results,
            "failures": failures,
            "pages": self.pages,
            "elapsed_ms": self.elapsed.as_secs_f64() * 1000.0,
        })
    }
}
