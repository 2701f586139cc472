//! Serde types matching the Firestore REST v1 wire format.
//!
//! Firestore wraps every field in a typed value object
//! (`{"stringValue": "Cash"}`). These types translate between that encoding
//! and the plain JSON [`Fields`] the rest of the crate works with.

use std::collections::BTreeMap;

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Number, Value};

use super::types::normalize_timestamp;
use super::{Document, Fields};

/// Re-serialize a value through JSON to convert between compatible types.
/// Used to turn typed records into document fields and back.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiValue {
  NullValue(Option<String>),
  BooleanValue(bool),
  /// int64 values travel as decimal strings
  IntegerValue(String),
  DoubleValue(f64),
  TimestampValue(String),
  StringValue(String),
  BytesValue(String),
  ReferenceValue(String),
  GeoPointValue(Value),
  ArrayValue(ApiArrayValue),
  MapValue(ApiMapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiArrayValue {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub values: Vec<ApiValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMapValue {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub fields: BTreeMap<String, ApiValue>,
}

impl ApiValue {
  /// Decode into plain JSON. Timestamps become normalized RFC 3339 strings.
  pub fn into_json(self) -> Result<Value> {
    Ok(match self {
      ApiValue::NullValue(_) => Value::Null,
      ApiValue::BooleanValue(b) => Value::Bool(b),
      ApiValue::IntegerValue(s) => {
        let n: i64 = s
          .parse()
          .map_err(|e| eyre!("Invalid integerValue '{}': {}", s, e))?;
        Value::Number(n.into())
      }
      ApiValue::DoubleValue(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
      ApiValue::TimestampValue(ts) => Value::String(normalize_timestamp(&ts)?),
      ApiValue::StringValue(s) | ApiValue::BytesValue(s) | ApiValue::ReferenceValue(s) => {
        Value::String(s)
      }
      ApiValue::GeoPointValue(v) => v,
      ApiValue::ArrayValue(arr) => Value::Array(
        arr
          .values
          .into_iter()
          .map(ApiValue::into_json)
          .collect::<Result<_>>()?,
      ),
      ApiValue::MapValue(map) => Value::Object(decode_fields(map.fields)?),
    })
  }

  /// Encode plain JSON. Integral numbers become `integerValue`.
  pub fn from_json(value: Value) -> Self {
    match value {
      Value::Null => ApiValue::NullValue(Some("NULL_VALUE".to_string())),
      Value::Bool(b) => ApiValue::BooleanValue(b),
      Value::Number(n) => match n.as_i64() {
        Some(i) => ApiValue::IntegerValue(i.to_string()),
        None => ApiValue::DoubleValue(n.as_f64().unwrap_or_default()),
      },
      Value::String(s) => ApiValue::StringValue(s),
      Value::Array(values) => ApiValue::ArrayValue(ApiArrayValue {
        values: values.into_iter().map(ApiValue::from_json).collect(),
      }),
      Value::Object(map) => ApiValue::MapValue(ApiMapValue {
        fields: encode_fields(map),
      }),
    }
  }
}

pub fn decode_fields(fields: BTreeMap<String, ApiValue>) -> Result<Fields> {
  fields
    .into_iter()
    .map(|(k, v)| Ok((k, v.into_json()?)))
    .collect()
}

pub fn encode_fields(fields: Fields) -> BTreeMap<String, ApiValue> {
  fields
    .into_iter()
    .map(|(k, v)| (k, ApiValue::from_json(v)))
    .collect()
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDocument {
  /// Full resource name: `projects/{p}/databases/{d}/documents/{collection}/{id}`
  pub name: String,
  #[serde(default)]
  pub fields: BTreeMap<String, ApiValue>,
}

impl ApiDocument {
  pub fn id(&self) -> &str {
    self.name.rsplit('/').next().unwrap_or_default()
  }

  pub fn into_document(self) -> Result<Document> {
    let id = self.id().to_string();
    let fields = decode_fields(self.fields)?;
    Ok(Document { id, fields })
  }
}

/// Request body for create and patch calls
#[derive(Debug, Serialize)]
pub struct ApiWriteBody {
  pub fields: BTreeMap<String, ApiValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListResponse {
  #[serde(default)]
  pub documents: Vec<ApiDocument>,
  pub next_page_token: Option<String>,
}

// ============================================================================
// Commit (server timestamp transform)
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiCommitRequest {
  pub writes: Vec<ApiWrite>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWrite {
  pub update: ApiUpdate,
  pub update_mask: ApiDocumentMask,
  pub update_transforms: Vec<ApiFieldTransform>,
}

#[derive(Debug, Serialize)]
pub struct ApiUpdate {
  pub name: String,
  pub fields: BTreeMap<String, ApiValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDocumentMask {
  pub field_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFieldTransform {
  pub field_path: String,
  pub set_to_server_value: &'static str,
}

impl ApiWrite {
  /// Merge-write that only sets `field` to the request time.
  pub fn server_timestamp(document_name: String, field: &str) -> Self {
    Self {
      update: ApiUpdate {
        name: document_name,
        fields: BTreeMap::new(),
      },
      update_mask: ApiDocumentMask {
        field_paths: Vec::new(),
      },
      update_transforms: vec![ApiFieldTransform {
        field_path: field.to_string(),
        set_to_server_value: "REQUEST_TIME",
      }],
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCommitResponse {
  #[serde(default)]
  pub write_results: Vec<ApiWriteResult>,
  pub commit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWriteResult {
  #[serde(default)]
  pub transform_results: Vec<ApiValue>,
}

impl ApiCommitResponse {
  /// The server time applied by the first transform, falling back to the commit time.
  pub fn stamped_time(self) -> Result<String> {
    let transformed = self
      .write_results
      .into_iter()
      .next()
      .and_then(|r| r.transform_results.into_iter().next());

    match (transformed, self.commit_time) {
      (Some(ApiValue::TimestampValue(ts)), _) | (_, Some(ts)) => normalize_timestamp(&ts),
      _ => Err(eyre!("Commit response carried no timestamp")),
    }
  }
}
