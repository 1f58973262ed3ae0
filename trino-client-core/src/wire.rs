//! Wire-level JSON shapes returned by the coordinator. These mirror the response body verbatim
//! (camelCase field names) and are deserialized once per page in [`crate::request`]; everything
//! downstream works with [`Status`], not these raw structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct WireResponse {
    pub id: String,
    #[serde(default)]
    pub stats: Value,
    #[serde(default)]
    pub warnings: Vec<Value>,
    #[serde(rename = "infoUri")]
    pub info_uri: String,
    #[serde(rename = "nextUri")]
    pub next_uri: Option<String>,
    #[serde(rename = "updateType")]
    pub update_type: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub columns: Option<Vec<WireColumn>>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "typeSignature")]
    pub type_signature: TypeSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSignature {
    #[serde(rename = "rawType")]
    pub raw_type: String,
    #[serde(default)]
    pub arguments: Vec<TypeArgument>,
}

/// A single type argument of a recursive type signature, e.g. the element type of an `array`
/// or a field type of a `row`. Left as a raw JSON value and decoded lazily by
/// [`crate::type_mapper`] because non-`TYPE` kinds (`LONG`, `VARIABLE`) never need to recurse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeArgument {
    pub kind: String,
    pub value: Value,
}

impl TypeArgument {
    pub fn as_type_signature(&self) -> Option<TypeSignature> {
        if self.kind != "TYPE" {
            return None;
        }
        serde_json::from_value(self.value.clone()).ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct WireError {
    #[serde(rename = "errorType")]
    pub error_type: String,
    pub message: String,
}

/// A Status is the crate's normalized view of one page of a running query: what
/// [`crate::request::RequestLayer::process`] hands back after decoding a [`WireResponse`] and
/// folding header directives into the session.
#[derive(Debug, Clone)]
pub struct Status {
    pub id: String,
    pub stats: Value,
    pub warnings: Vec<Value>,
    pub info_uri: String,
    pub next_uri: Option<String>,
    pub update_type: Option<String>,
    pub rows: Vec<Vec<Value>>,
    pub columns: Option<Vec<WireColumn>>,
}

impl From<WireResponse> for Status {
    fn from(response: WireResponse) -> Self {
        Self {
            id: response.id,
            stats: response.stats,
            warnings: response.warnings,
            info_uri: response.info_uri,
            next_uri: response.next_uri,
            update_type: response.update_type,
            rows: response.data.unwrap_or_default(),
            columns: response.columns,
        }
    }
}
