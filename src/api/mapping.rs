//! Per-resource translation between query descriptors and backend parameters.
//!
//! Resources of the backend disagree on parameter names, paging style, sort
//! syntax and response envelopes. All of that is data in a `ResourceMapping`
//! so one cached client serves every resource.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::cache::{Filter, FilterOp, Page, QueryDescriptor, SortOrder};
use crate::error::ApiError;

/// How pagination is expressed in query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Paging {
  /// `?page=N&pageSize=M`
  Page {
    #[serde(default = "default_page_param")]
    page_param: String,
    #[serde(default = "default_size_param")]
    size_param: String,
    /// Number the backend uses for the first page (0 or 1)
    #[serde(default = "default_first_page")]
    first_page: u32,
  },
  /// `?offset=N&limit=M`
  Offset {
    #[serde(default = "default_offset_param")]
    offset_param: String,
    #[serde(default = "default_limit_param")]
    limit_param: String,
  },
}

impl Default for Paging {
  fn default() -> Self {
    Paging::Page {
      page_param: default_page_param(),
      size_param: default_size_param(),
      first_page: default_first_page(),
    }
  }
}

/// How the sort direction is expressed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum SortStyle {
  /// `?sort=name&order=desc`
  Separate {
    #[serde(default = "default_order_param")]
    order_param: String,
  },
  /// `?sort=-name` for descending
  Prefix,
}

impl Default for SortStyle {
  fn default() -> Self {
    SortStyle::Separate {
      order_param: default_order_param(),
    }
  }
}

/// How filter triples become query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStyle {
  /// `field=value` for equality, `field_gte=value` otherwise
  #[default]
  Suffix,
  /// `filter[field][gte]=value`
  Bracket,
}

/// Static description of one backend resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResourceMapping {
  /// Collection path relative to the API base; defaults to `/<resource>`
  pub path: Option<String>,
  pub paging: Paging,
  pub sort_param: String,
  pub sort_style: SortStyle,
  pub filter_style: FilterStyle,
  /// Field renames from console names to backend names
  pub fields: HashMap<String, String>,
  /// Envelope key holding the records
  pub data_field: String,
  /// Envelope key holding the total count
  pub total_field: String,
}

impl Default for ResourceMapping {
  fn default() -> Self {
    Self {
      path: None,
      paging: Paging::default(),
      sort_param: "sort".to_string(),
      sort_style: SortStyle::default(),
      filter_style: FilterStyle::default(),
      fields: HashMap::new(),
      data_field: "data".to_string(),
      total_field: "total".to_string(),
    }
  }
}

fn default_page_param() -> String {
  "page".to_string()
}

fn default_size_param() -> String {
  "pageSize".to_string()
}

fn default_first_page() -> u32 {
  1
}

fn default_offset_param() -> String {
  "offset".to_string()
}

fn default_limit_param() -> String {
  "limit".to_string()
}

fn default_order_param() -> String {
  "order".to_string()
}

impl ResourceMapping {
  /// Collection path for `resource`.
  pub fn collection_path(&self, resource: &str) -> String {
    match &self.path {
      Some(p) => format!("/{}", p.trim_matches('/')),
      None => format!("/{}", resource),
    }
  }

  /// Path of a single record.
  pub fn entity_path(&self, resource: &str, id: &str) -> String {
    let id: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("{}/{}", self.collection_path(resource), id)
  }

  fn field<'a>(&'a self, name: &'a str) -> &'a str {
    self.fields.get(name).map(String::as_str).unwrap_or(name)
  }

  /// Translate a (normalized) descriptor into backend query parameters.
  pub fn query_params(&self, descriptor: &QueryDescriptor) -> Vec<(String, String)> {
    let mut params = Vec::new();

    match &self.paging {
      Paging::Page {
        page_param,
        size_param,
        first_page,
      } => {
        let page = descriptor.page.saturating_sub(1).saturating_add(*first_page);
        params.push((page_param.clone(), page.to_string()));
        params.push((size_param.clone(), descriptor.page_size.to_string()));
      }
      Paging::Offset {
        offset_param,
        limit_param,
      } => {
        let offset = u64::from(descriptor.page.saturating_sub(1)) * u64::from(descriptor.page_size);
        params.push((offset_param.clone(), offset.to_string()));
        params.push((limit_param.clone(), descriptor.page_size.to_string()));
      }
    }

    if let Some(sort) = &descriptor.sort_field {
      let sort = self.field(sort);
      match &self.sort_style {
        SortStyle::Separate { order_param } => {
          params.push((self.sort_param.clone(), sort.to_string()));
          params.push((order_param.clone(), descriptor.sort_order.as_str().to_string()));
        }
        SortStyle::Prefix => {
          let value = match descriptor.sort_order {
            SortOrder::Ascending => sort.to_string(),
            SortOrder::Descending => format!("-{}", sort),
          };
          params.push((self.sort_param.clone(), value));
        }
      }
    }

    for filter in &descriptor.filters {
      params.push(self.filter_param(filter));
    }

    params
  }

  fn filter_param(&self, filter: &Filter) -> (String, String) {
    let field = self.field(&filter.field);
    let name = match (self.filter_style, filter.op) {
      (FilterStyle::Suffix, FilterOp::Eq) => field.to_string(),
      (FilterStyle::Suffix, op) => format!("{}_{}", field, op.as_str()),
      (FilterStyle::Bracket, op) => format!("filter[{}][{}]", field, op.as_str()),
    };
    (name, filter.value.clone())
  }

  /// Extract records and total from a list response.
  ///
  /// Accepts either an envelope object or a bare array; a missing total falls
  /// back to the number of records.
  pub fn parse_page(&self, body: Value) -> Result<Page<Value>, ApiError> {
    match body {
      Value::Array(records) => {
        let total = records.len() as u64;
        Ok(Page::new(records, total))
      }
      Value::Object(mut envelope) => {
        let records = match envelope.remove(&self.data_field) {
          Some(Value::Array(records)) => records,
          Some(other) => {
            return Err(ApiError::InvalidResponse(format!(
              "'{}' is not an array: {}",
              self.data_field, other
            )))
          }
          None => {
            return Err(ApiError::InvalidResponse(format!(
              "missing '{}' in list response",
              self.data_field
            )))
          }
        };
        let total = envelope
          .get(&self.total_field)
          .and_then(|t| t.as_u64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
          .unwrap_or(records.len() as u64);
        Ok(Page::new(records, total))
      }
      other => Err(ApiError::InvalidResponse(format!(
        "unexpected list response: {}",
        other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn params(mapping: &ResourceMapping, q: &QueryDescriptor) -> Vec<(String, String)> {
    mapping.query_params(q)
  }

  fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
  }

  #[test]
  fn test_default_mapping() {
    let q = QueryDescriptor::new("children")
      .page(3)
      .page_size(20)
      .sort("last_name", SortOrder::Descending)
      .filter("room", FilterOp::Eq, "blue")
      .filter("age", FilterOp::Gte, "3");

    assert_eq!(
      params(&ResourceMapping::default(), &q),
      vec![
        pair("page", "3"),
        pair("pageSize", "20"),
        pair("sort", "last_name"),
        pair("order", "desc"),
        pair("room", "blue"),
        pair("age_gte", "3"),
      ]
    );
  }

  #[test]
  fn test_offset_prefix_bracket_mapping() {
    let mapping = ResourceMapping {
      paging: Paging::Offset {
        offset_param: "skip".into(),
        limit_param: "take".into(),
      },
      sort_style: SortStyle::Prefix,
      sort_param: "orderBy".into(),
      filter_style: FilterStyle::Bracket,
      fields: HashMap::from([("last_name".to_string(), "lastName".to_string())]),
      ..ResourceMapping::default()
    };
    let q = QueryDescriptor::new("incidents")
      .page(3)
      .page_size(25)
      .sort("last_name", SortOrder::Descending)
      .filter("last_name", FilterOp::Contains, "lo");

    assert_eq!(
      params(&mapping, &q),
      vec![
        pair("skip", "50"),
        pair("take", "25"),
        pair("orderBy", "-lastName"),
        pair("filter[lastName][contains]", "lo"),
      ]
    );
  }

  #[test]
  fn test_zero_based_pages() {
    let mapping = ResourceMapping {
      paging: Paging::Page {
        page_param: "p".into(),
        size_param: "n".into(),
        first_page: 0,
      },
      ..ResourceMapping::default()
    };
    let q = QueryDescriptor::new("rooms").page(1).page_size(10);
    assert_eq!(params(&mapping, &q), vec![pair("p", "0"), pair("n", "10")]);
  }

  #[test]
  fn test_last_page_saturates() {
    let mapping = ResourceMapping {
      paging: Paging::Page {
        page_param: "p".into(),
        size_param: "n".into(),
        first_page: 5,
      },
      ..ResourceMapping::default()
    };
    let q = QueryDescriptor::new("rooms").page(u32::MAX).page_size(10);
    assert_eq!(
      params(&mapping, &q),
      vec![pair("p", &u32::MAX.to_string()), pair("n", "10")]
    );
  }

  #[test]
  fn test_paths() {
    let mapping = ResourceMapping::default();
    assert_eq!(mapping.collection_path("children"), "/children");
    assert_eq!(mapping.entity_path("children", "a b"), "/children/a+b");

    let mapping = ResourceMapping {
      path: Some("/v2/kids/".into()),
      ..ResourceMapping::default()
    };
    assert_eq!(mapping.collection_path("children"), "/v2/kids");
  }

  #[test]
  fn test_parse_page() {
    let mapping = ResourceMapping::default();

    let page = mapping
      .parse_page(json!({"data": [{"id": 1}, {"id": 2}], "total": 40}))
      .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total, 40);

    let page = mapping.parse_page(json!([{"id": 1}])).unwrap();
    assert_eq!(page.total, 1);

    let page = mapping
      .parse_page(json!({"data": [], "total": "12"}))
      .unwrap();
    assert_eq!(page.total, 12);

    assert!(matches!(
      mapping.parse_page(json!({"items": []})),
      Err(ApiError::InvalidResponse(_))
    ));
    assert!(matches!(
      mapping.parse_page(json!("nope")),
      Err(ApiError::InvalidResponse(_))
    ));
  }

  #[test]
  fn test_mapping_from_yaml() {
    let yaml = r#"
path: /api/incidents
paging:
  style: offset
sort_style:
  style: prefix
filter_style: bracket
data_field: items
fields:
  child: childId
"#;
    let mapping: ResourceMapping = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
      mapping.paging,
      Paging::Offset {
        offset_param: "offset".into(),
        limit_param: "limit".into()
      }
    );
    assert_eq!(mapping.sort_style, SortStyle::Prefix);
    assert_eq!(mapping.filter_style, FilterStyle::Bracket);
    assert_eq!(mapping.data_field, "items");
    assert_eq!(mapping.total_field, "total");
    assert_eq!(mapping.fields.get("child").map(String::as_str), Some("childId"));
  }
}
