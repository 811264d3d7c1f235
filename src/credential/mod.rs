/// Serde models matching the payload JSON.
pub mod models;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::DecodeError;

/// A parsed health card credential.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    /// Issuer URL (`iss`)
    pub issuer: String,
    /// Not-before time in epoch seconds (`nbf`)
    pub not_before: i64,
    /// Credential type tags (`vc.type`)
    pub types: Vec<String>,
    /// FHIR version of the bundle
    pub fhir_version: String,
    /// The medical record bundle
    pub bundle: MedicalBundle,
}

impl CredentialRecord {
    /// Not-before time as a UTC timestamp, if representable.
    pub fn not_before_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.not_before, 0)
    }
}

/// FHIR bundle carried by the credential.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalBundle {
    pub resource_type: String,
    pub bundle_type: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Source URL of the resource, usually `resource:N`
    pub full_url: String,
    pub resource: Resource,
}

/// Bundle resource, modelled only for the kinds the summary needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Patient(Patient),
    Immunization(Immunization),
    /// Any other resource kind, kept as-is.
    Other {
        resource_type: String,
        body: Value,
    },
}

impl Resource {
    /// The FHIR `resourceType` of this resource.
    pub fn resource_type(&self) -> &str {
        match self {
            Resource::Patient(_) => "Patient",
            Resource::Immunization(_) => "Immunization",
            Resource::Other { resource_type, .. } => resource_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub names: Vec<Name>,
    pub birth_date: Option<String>,
}

/// A person name with the family name already collapsed to one string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Name {
    pub given: Vec<String>,
    pub family: String,
}

impl Name {
    /// Given names followed by the family name, separated by single spaces.
    pub fn display(&self) -> String {
        self.given
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.family.as_str()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Immunization {
    /// FHIR status: `completed`, `entered-in-error` or `not-done`
    pub status: Option<String>,
    /// First vaccine coding that carries a code
    pub vaccine: Option<VaccineCode>,
    pub occurrence: Option<String>,
    pub lot_number: Option<String>,
}

impl Immunization {
    /// Whether the dose counts as administered. A missing status counts.
    pub fn is_completed(&self) -> bool {
        match self.status.as_deref() {
            None => true,
            Some(status) => status.eq_ignore_ascii_case("completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VaccineCode {
    pub system: Option<String>,
    pub code: String,
}

/// Parses normalized credential JSON into a `CredentialRecord`.
///
/// # Arguments
/// * `text` - Normalized payload JSON
///
/// # Returns
/// * `Result<CredentialRecord, DecodeError>` - The record, or `Schema` if a required
///   field is missing or has the wrong shape
pub fn parse_credential(text: &str) -> Result<CredentialRecord, DecodeError> {
    let payload: models::HealthCardPayload = serde_json::from_str(text)?;
    let record = CredentialRecord::try_from(payload)?;

    log::debug!(
        "Parsed credential from '{}' with {} bundle entries",
        record.issuer,
        record.bundle.entries.len()
    );

    Ok(record)
}

impl TryFrom<models::HealthCardPayload> for CredentialRecord {
    type Error = DecodeError;

    fn try_from(payload: models::HealthCardPayload) -> Result<Self, DecodeError> {
        let models::HealthCardPayload { iss, nbf, vc } = payload;
        let models::VerifiableCredential {
            type_,
            credential_subject,
        } = vc;
        let models::CredentialSubject {
            fhir_version,
            fhir_bundle,
        } = credential_subject;

        Ok(Self {
            issuer: iss,
            not_before: nbf,
            types: type_,
            fhir_version,
            bundle: fhir_bundle.try_into()?,
        })
    }
}

impl TryFrom<models::Bundle> for MedicalBundle {
    type Error = DecodeError;

    fn try_from(bundle: models::Bundle) -> Result<Self, DecodeError> {
        let models::Bundle {
            resource_type,
            type_,
            entry,
        } = bundle;

        let entries = entry
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            resource_type,
            bundle_type: type_,
            entries,
        })
    }
}

impl TryFrom<models::BundleEntry> for Entry {
    type Error = DecodeError;

    fn try_from(entry: models::BundleEntry) -> Result<Self, DecodeError> {
        let models::BundleEntry { full_url, resource } = entry;

        let resource_type = resource
            .get("resourceType")
            .ok_or_else(|| {
                DecodeError::Schema(format!("'resourceType' not found in entry '{full_url}'"))
            })?
            .as_str()
            .ok_or_else(|| {
                DecodeError::Schema(format!("'resourceType' is not a string in entry '{full_url}'"))
            })?
            .to_owned();

        let resource = match resource_type.as_str() {
            "Patient" => {
                Resource::Patient(serde_json::from_value::<models::Patient>(resource)?.into())
            }
            "Immunization" => Resource::Immunization(
                serde_json::from_value::<models::Immunization>(resource)?.into(),
            ),
            _ => {
                log::trace!("Keeping '{resource_type}' resource in '{full_url}' as opaque JSON");
                Resource::Other {
                    resource_type,
                    body: resource,
                }
            }
        };

        Ok(Self { full_url, resource })
    }
}

impl From<models::Patient> for Patient {
    fn from(patient: models::Patient) -> Self {
        let models::Patient { name, birth_date } = patient;

        Self {
            names: name.into_iter().map(Into::into).collect(),
            birth_date,
        }
    }
}

impl From<models::HumanName> for Name {
    fn from(name: models::HumanName) -> Self {
        let models::HumanName { family, given } = name;

        Self {
            given,
            family: family
                .map(|f| f.to_space_joined_string())
                .unwrap_or_default(),
        }
    }
}

impl From<models::Immunization> for Immunization {
    fn from(immunization: models::Immunization) -> Self {
        let models::Immunization {
            status,
            vaccine_code,
            occurrence_date_time,
            lot_number,
        } = immunization;

        let vaccine = vaccine_code.and_then(|concept| {
            concept
                .coding
                .into_iter()
                .find_map(|models::Coding { system, code, .. }| {
                    code.map(|code| VaccineCode { system, code })
                })
        });

        Self {
            status,
            vaccine,
            occurrence: occurrence_date_time,
            lot_number,
        }
    }
}
