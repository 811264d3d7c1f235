//! Wire representation of the health card payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Optional descriptive fields: numbers and booleans are kept as text, any other
// shape is dropped rather than failing the whole credential.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            log::debug!("Ignoring non-scalar value {other} in optional field");
            None
        }
    })
}

/// A value that issuers encode either as a scalar or as an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ValueOrArray<T> {
    Value(T),
    Array(Vec<T>),
}

impl<T: ToString> ValueOrArray<T> {
    // joins array elements with a single space
    pub fn to_space_joined_string(&self) -> String {
        match self {
            ValueOrArray::Value(v) => v.to_string(),
            ValueOrArray::Array(vec) => vec
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCardPayload {
    pub iss: String,
    pub nbf: i64,
    pub vc: VerifiableCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "type")]
    pub type_: Vec<String>,
    pub credential_subject: CredentialSubject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    pub fhir_version: String,
    pub fhir_bundle: Bundle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub entry: Vec<BundleEntry>,
}

/// Bundle entry; the resource is dispatched on its `resourceType` later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(default)]
    pub name: Vec<HumanName>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumanName {
    #[serde(default)]
    pub family: Option<ValueOrArray<String>>,
    #[serde(default)]
    pub given: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Immunization {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default)]
    pub vaccine_code: Option<CodeableConcept>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub occurrence_date_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lot_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coding {
    #[serde(default, deserialize_with = "lenient_string")]
    pub system: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display: Option<String>,
}
