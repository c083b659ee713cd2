//! Query descriptors and deterministic cache keys.
//!
//! Keys are plain strings of the form
//! `resource|page_size|page|sort_field:sort_order|filters` so they stay
//! readable in logs and can be invalidated by resource prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;

/// Separator between key segments. Every key starts with `resource` + this.
pub const KEY_SEPARATOR: char = '|';

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Ascending,
  Descending,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::Ascending => "asc",
      SortOrder::Descending => "desc",
    }
  }
}

/// Comparison operator of a filter triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
  Eq,
  Ne,
  Lt,
  Lte,
  Gt,
  Gte,
  Contains,
  In,
}

impl FilterOp {
  pub fn as_str(&self) -> &'static str {
    match self {
      FilterOp::Eq => "eq",
      FilterOp::Ne => "ne",
      FilterOp::Lt => "lt",
      FilterOp::Lte => "lte",
      FilterOp::Gt => "gt",
      FilterOp::Gte => "gte",
      FilterOp::Contains => "contains",
      FilterOp::In => "in",
    }
  }

  /// Parse an operator code, accepting a few symbolic aliases.
  pub fn parse(s: &str) -> Option<Self> {
    let op = match s.trim().to_lowercase().as_str() {
      "eq" | "=" | "==" => FilterOp::Eq,
      "ne" | "!=" => FilterOp::Ne,
      "lt" | "<" => FilterOp::Lt,
      "lte" | "<=" => FilterOp::Lte,
      "gt" | ">" => FilterOp::Gt,
      "gte" | ">=" => FilterOp::Gte,
      "contains" | "like" => FilterOp::Contains,
      "in" => FilterOp::In,
      _ => return None,
    };
    Some(op)
  }
}

/// A single `(field, operator, value)` filter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Filter {
  pub field: String,
  pub op: FilterOp,
  pub value: String,
}

impl Filter {
  pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      op,
      value: value.into(),
    }
  }
}

/// Normalized description of a list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDescriptor {
  pub resource: String,
  pub page: u32,
  pub page_size: u32,
  pub sort_field: Option<String>,
  pub sort_order: SortOrder,
  pub filters: Vec<Filter>,
}

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

impl QueryDescriptor {
  pub fn new(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      page: 1,
      page_size: DEFAULT_PAGE_SIZE,
      sort_field: None,
      sort_order: SortOrder::Ascending,
      filters: Vec::new(),
    }
  }

  pub fn page(mut self, page: u32) -> Self {
    self.page = page;
    self
  }

  pub fn page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
    self.sort_field = Some(field.into());
    self.sort_order = order;
    self
  }

  pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
    self.filters.push(Filter::new(field, op, value));
    self
  }

  /// Clamp paging into `1..=max_page_size` and sort the filters.
  ///
  /// The result is what gets sent to the backend and what the key is built
  /// from, so requests that clamp to the same page size share an entry.
  pub fn normalized(&self, max_page_size: u32) -> Self {
    let mut filters = self.filters.clone();
    filters.sort();
    Self {
      resource: self.resource.clone(),
      page: self.page.max(1),
      page_size: self.page_size.clamp(1, max_page_size.max(1)),
      sort_field: self.sort_field.clone(),
      sort_order: self.sort_order,
      filters,
    }
  }

  fn sorted_filters(&self) -> Vec<&Filter> {
    let mut filters: Vec<&Filter> = self.filters.iter().collect();
    filters.sort();
    filters
  }
}

impl PartialEq for QueryDescriptor {
  fn eq(&self, other: &Self) -> bool {
    self.resource == other.resource
      && self.page == other.page
      && self.page_size == other.page_size
      && self.sort_field == other.sort_field
      && self.sort_order == other.sort_order
      && self.sorted_filters() == other.sorted_filters()
  }
}

impl Eq for QueryDescriptor {}

/// Canonical string key for a cached query or entity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Prefix shared by every key of `resource`.
  pub fn resource_prefix(resource: &str) -> String {
    format!("{}{}", escape(resource), KEY_SEPARATOR)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// Build the key for a list query. The resource segment comes from the
/// descriptor itself, so descriptors that differ only in resource never share
/// a key.
///
/// Filters are sorted first, so input order never changes the key. Free-form
/// segments are form-urlencoded, which keeps the separators unambiguous.
pub fn build_key(descriptor: &QueryDescriptor) -> CacheKey {
  let filters = descriptor
    .sorted_filters()
    .into_iter()
    .map(|f| format!("{}:{}:{}", escape(&f.field), f.op.as_str(), escape(&f.value)))
    .collect::<Vec<_>>()
    .join(",");

  CacheKey(format!(
    "{resource}{sep}{size}{sep}{page}{sep}{sort}:{order}{sep}{filters}",
    resource = escape(&descriptor.resource),
    sep = KEY_SEPARATOR,
    size = descriptor.page_size,
    page = descriptor.page,
    sort = escape(descriptor.sort_field.as_deref().unwrap_or("")),
    order = descriptor.sort_order.as_str(),
    filters = filters,
  ))
}

/// Build the key for a single-entity lookup.
pub fn entity_key(resource: &str, id: &str) -> CacheKey {
  CacheKey(format!(
    "{}{}id:{}",
    escape(resource),
    KEY_SEPARATOR,
    escape(id)
  ))
}

fn escape(s: &str) -> String {
  form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
