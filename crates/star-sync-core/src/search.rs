//! Similarity search options, field allow-list, and result rows.
//!
//! Store backends assemble field names into query text, so every name a
//! caller supplies (result fields and sort fields alike) must pass
//! [`SearchOptions::validate`] before a query is built. Unknown names are
//! rejected with a [`SearchError`], never dropped.
//!
//! The ranking helpers here ([`rank_rows`], [`sort_rows`]) are shared by the
//! store backends, which only differ in how they load candidate rows.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::models::Item;

/// Name of the computed similarity column.
pub const SCORE_FIELD: &str = "score";

/// Default result fields for the CLI.
pub const DEFAULT_FIELDS: &str = "full_name,description,ai_summary,ai_categories,stars,url,score";

/// Default result count.
pub const DEFAULT_LIMIT: usize = 10;

/// Value shape of a selectable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// JSON array of strings.
    List,
    /// Unix seconds, rendered as RFC 3339 text.
    Timestamp,
    /// The computed similarity score.
    Score,
}

/// Every field name that may appear in a search request.
///
/// `embedding` is intentionally absent: vectors are not returned in rows.
pub const ALLOWED_FIELDS: &[(&str, FieldKind)] = &[
    ("owner", FieldKind::Text),
    ("name", FieldKind::Text),
    ("full_name", FieldKind::Text),
    ("description", FieldKind::Text),
    ("url", FieldKind::Text),
    ("homepage_url", FieldKind::Text),
    ("stars", FieldKind::Integer),
    ("language", FieldKind::Text),
    ("topics", FieldKind::List),
    ("readme_excerpt", FieldKind::Text),
    ("ai_summary", FieldKind::Text),
    ("ai_categories", FieldKind::List),
    ("fetched_at", FieldKind::Timestamp),
    ("enriched_at", FieldKind::Timestamp),
    (SCORE_FIELD, FieldKind::Score),
];

/// Look up the kind of an allowed field.
pub fn field_kind(name: &str) -> Option<FieldKind> {
    ALLOWED_FIELDS
        .iter()
        .find(|(f, _)| *f == name)
        .map(|(_, k)| *k)
}

/// Whether `name` may appear in a search request.
pub fn is_allowed_field(name: &str) -> bool {
    field_kind(name).is_some()
}

/// Search request validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("unknown field {0:?}")]
    UnknownField(String),
    #[error("unknown sort field {0:?}")]
    UnknownSortField(String),
    #[error("invalid sort direction {0:?} (use asc or desc)")]
    InvalidSortDirection(String),
    #[error("invalid sort clause {0:?} (use \"field [asc|desc]\")")]
    InvalidSortClause(String),
    #[error("no fields specified")]
    NoFields,
    #[error("limit must be >= 1")]
    InvalidLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// What a similarity search returns and in which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of rows.
    pub limit: usize,
    /// Result fields, in output order. `score` is always included.
    pub fields: Vec<String>,
    /// Sort clauses; empty means `score desc`.
    pub sort: Vec<SortClause>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            fields: DEFAULT_FIELDS.split(',').map(str::to_string).collect(),
            sort: Vec::new(),
        }
    }
}

impl SearchOptions {
    /// Build options from the CLI's comma-separated syntax and validate them.
    pub fn parse(limit: usize, fields: &str, sort: &str) -> Result<Self, SearchError> {
        let options = Self {
            limit,
            fields: parse_fields(fields)?,
            sort: parse_sort(sort)?,
        };
        options.validate()?;
        Ok(options)
    }

    /// Check every field name against [`ALLOWED_FIELDS`].
    ///
    /// Must be called before any field name is placed into query text.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        if self.fields.is_empty() {
            return Err(SearchError::NoFields);
        }
        for f in &self.fields {
            if !is_allowed_field(f) {
                return Err(SearchError::UnknownField(f.clone()));
            }
        }
        for clause in &self.sort {
            if !is_allowed_field(&clause.field) {
                return Err(SearchError::UnknownSortField(clause.field.clone()));
            }
        }
        Ok(())
    }

    /// Sort clauses with the `score desc` default applied.
    pub fn effective_sort(&self) -> Vec<SortClause> {
        if self.sort.is_empty() {
            vec![SortClause::new(SCORE_FIELD, SortDirection::Desc)]
        } else {
            self.sort.clone()
        }
    }

    /// Stored columns a backend must load: result fields plus sort fields,
    /// deduplicated, without `score`.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        let sort_fields = self.sort.iter().map(|c| c.field.as_str());
        for f in self.fields.iter().map(String::as_str).chain(sort_fields) {
            if f != SCORE_FIELD && !cols.contains(&f) {
                cols.push(f);
            }
        }
        cols
    }
}

/// Parse a comma-separated field list, validating each name.
pub fn parse_fields(raw: &str) -> Result<Vec<String>, SearchError> {
    let mut fields = Vec::new();
    for f in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if !is_allowed_field(f) {
            return Err(SearchError::UnknownField(f.to_string()));
        }
        fields.push(f.to_string());
    }
    if fields.is_empty() {
        return Err(SearchError::NoFields);
    }
    Ok(fields)
}

/// Parse `"field [asc|desc], ..."` into sort clauses.
pub fn parse_sort(raw: &str) -> Result<Vec<SortClause>, SearchError> {
    let mut clauses = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tokens: Vec<&str> = part.split_whitespace().collect();
        let field = tokens[0];
        if !is_allowed_field(field) {
            return Err(SearchError::UnknownSortField(field.to_string()));
        }
        let direction = match tokens.get(1).map(|t| t.to_ascii_lowercase()) {
            None => SortDirection::Asc,
            Some(d) if d == "asc" => SortDirection::Asc,
            Some(d) if d == "desc" => SortDirection::Desc,
            Some(_) => return Err(SearchError::InvalidSortDirection(tokens[1].to_string())),
        };
        if tokens.len() > 2 {
            return Err(SearchError::InvalidSortClause(part.to_string()));
        }
        clauses.push(SortClause::new(field, direction));
    }
    Ok(clauses)
}

/// A dynamically typed value in a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    List(Vec<String>),
    Absent,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn from_timestamp(ts: Option<DateTime<Utc>>) -> Self {
        ts.map(|t| FieldValue::Text(t.to_rfc3339()))
            .unwrap_or(FieldValue::Absent)
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Absent => 0,
            FieldValue::Integer(_) | FieldValue::Float(_) => 1,
            FieldValue::Text(_) => 2,
            FieldValue::List(_) => 3,
        }
    }

    /// Total order used for sorting. Absent sorts before any present value.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }
}

/// One search result: field name → value, in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRow {
    values: Vec<(String, FieldValue)>,
}

impl SearchRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any existing value for it.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        let field = field.into();
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    /// The similarity score, `0.0` if missing.
    pub fn score(&self) -> f64 {
        self.get(SCORE_FIELD).and_then(FieldValue::as_f64).unwrap_or(0.0)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(f, _)| f.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only `fields` (in that order) plus `score`.
    fn project(mut self, fields: &[String]) -> Self {
        let mut out = SearchRow::new();
        for f in fields {
            if out.get(f).is_some() {
                continue;
            }
            if let Some(pos) = self.values.iter().position(|(name, _)| name == f) {
                let (name, value) = self.values.swap_remove(pos);
                out.values.push((name, value));
            }
        }
        if out.get(SCORE_FIELD).is_none() {
            if let Some(pos) = self.values.iter().position(|(name, _)| name == SCORE_FIELD) {
                out.values.push(self.values.swap_remove(pos));
            }
        }
        out
    }
}

impl Serialize for SearchRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Read an allowed, stored field from an item.
///
/// Returns [`FieldValue::Absent`] for `score` and for unknown names.
pub fn item_field(item: &Item, field: &str) -> FieldValue {
    fn text(v: &Option<String>) -> FieldValue {
        v.clone().map(FieldValue::Text).unwrap_or(FieldValue::Absent)
    }
    match field {
        "owner" => FieldValue::Text(item.owner.clone()),
        "name" => FieldValue::Text(item.name.clone()),
        "full_name" => FieldValue::Text(item.full_name.clone()),
        "description" => text(&item.description),
        "url" => FieldValue::Text(item.url.clone()),
        "homepage_url" => text(&item.homepage_url),
        "stars" => FieldValue::Integer(item.stars),
        "language" => text(&item.language),
        "topics" => FieldValue::List(item.topics.clone()),
        "readme_excerpt" => text(&item.readme_excerpt),
        "ai_summary" => text(&item.ai_summary),
        "ai_categories" => item
            .ai_categories
            .clone()
            .map(FieldValue::List)
            .unwrap_or(FieldValue::Absent),
        "fetched_at" => FieldValue::from_timestamp(item.fetched_at),
        "enriched_at" => FieldValue::from_timestamp(item.enriched_at),
        _ => FieldValue::Absent,
    }
}

/// Stable-sort rows by the given clauses, applied in order.
pub fn sort_rows(rows: &mut [SearchRow], clauses: &[SortClause]) {
    rows.sort_by(|a, b| {
        for clause in clauses {
            let av = a.get(&clause.field).unwrap_or(&FieldValue::Absent);
            let bv = b.get(&clause.field).unwrap_or(&FieldValue::Absent);
            let ord = match clause.direction {
                SortDirection::Asc => av.sort_cmp(bv),
                SortDirection::Desc => bv.sort_cmp(av),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Sort, truncate, and project scored candidate rows.
///
/// Each candidate must carry `score` and every column in
/// [`SearchOptions::columns`].
pub fn rank_rows(mut rows: Vec<SearchRow>, options: &SearchOptions) -> Vec<SearchRow> {
    sort_rows(&mut rows, &options.effective_sort());
    rows.truncate(options.limit);
    rows.into_iter().map(|r| r.project(&options.fields)).collect()
}

/// Count category labels across items; an item with N tags adds to N counters.
pub fn count_categories<'a, I>(categories: I) -> std::collections::HashMap<String, u64>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut counts = std::collections::HashMap::new();
    for tags in categories {
        for tag in tags {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    counts
}
