use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    credential::{CredentialRecord, Immunization, Resource},
    verify::Verdict,
};

const CVX_SYSTEM: &str = "http://hl7.org/fhir/sid/cvx";

/// Which Immunization entries count as doses.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum DosePolicy {
    /// Skip entries whose status says the dose was not administered.
    #[default]
    CompletedOnly,
    /// Count every Immunization entry.
    All,
}

/// Authenticity of the decoded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Authenticity {
    /// No signature check has been made.
    NotVerified,
    /// The issuer signature was checked against the given key.
    Verified {
        key_id: String,
        /// Set when the key set was fetched from the issuer the card itself names,
        /// which proves integrity but not that the issuer is trusted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        self_published_by: Option<String>,
    },
    /// The signature check failed.
    Rejected { reason: String },
}

/// Non-fatal findings while building a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum SummaryWarning {
    #[strum(serialize = "no Patient resource in bundle")]
    NoPatient,
    #[strum(serialize = "Patient resource has no name")]
    PatientWithoutName,
}

/// One Immunization entry as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dose {
    pub date: Option<String>,
    pub vaccine_code: Option<String>,
    pub vaccine: Option<String>,
    pub lot_number: Option<String>,
    pub status: Option<String>,
    /// Whether this entry is included in `dose_count`
    pub counted: bool,
}

/// Human-readable verification summary of a health card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub issuer: String,
    pub not_before: Option<DateTime<Utc>>,
    pub credential_types: Vec<String>,
    pub display_name: String,
    pub dose_count: usize,
    pub doses: Vec<Dose>,
    pub authenticity: Authenticity,
    pub warnings: Vec<SummaryWarning>,
}

impl VerificationReport {
    /// Attaches the outcome of a signature check to the report.
    pub fn with_verdict(self, verdict: Verdict) -> Self {
        let authenticity = match verdict {
            Verdict::Verified { key_id } => Authenticity::Verified {
                key_id,
                self_published_by: None,
            },
            Verdict::Rejected { reason } => Authenticity::Rejected { reason },
        };

        Self {
            authenticity,
            ..self
        }
    }

    /// Records that a verified signature was checked with keys published by the
    /// card's own issuer. Other outcomes are left unchanged.
    pub fn self_published_by(mut self, issuer: &str) -> Self {
        if let Authenticity::Verified {
            self_published_by, ..
        } = &mut self.authenticity
        {
            *self_published_by = Some(issuer.to_owned());
        }
        self
    }

    /// Returns true only if a verifier accepted the signature.
    pub fn is_authentic(&self) -> bool {
        matches!(self.authenticity, Authenticity::Verified { .. })
    }
}

/// Builds the report for a credential in a single pass over its bundle.
///
/// # Arguments
///
/// * `record` - The parsed credential.
/// * `policy` - Which Immunization entries are counted.
///
/// # Returns
///
/// A report whose authenticity is always `NotVerified`.
pub fn build_summary(record: &CredentialRecord, policy: DosePolicy) -> VerificationReport {
    let mut display_name = None;
    let mut doses = Vec::new();
    let mut warnings = Vec::new();

    for entry in &record.bundle.entries {
        match &entry.resource {
            Resource::Patient(patient) if display_name.is_none() => {
                let name = match patient.names.first() {
                    Some(name) => name.display(),
                    None => {
                        warnings.push(SummaryWarning::PatientWithoutName);
                        String::new()
                    }
                };
                display_name = Some(name);
            }
            Resource::Immunization(immunization) => {
                doses.push(dose(immunization, policy));
            }
            _ => {}
        }
    }

    let display_name = display_name.unwrap_or_else(|| {
        log::warn!("No Patient resource in credential from '{}'", record.issuer);
        warnings.push(SummaryWarning::NoPatient);
        String::new()
    });

    let dose_count = doses.iter().filter(|d| d.counted).count();

    log::debug!(
        "Summary: {dose_count} of {} immunization entries counted ({policy})",
        doses.len()
    );

    VerificationReport {
        issuer: record.issuer.clone(),
        not_before: record.not_before_utc(),
        credential_types: record.types.clone(),
        display_name,
        dose_count,
        doses,
        authenticity: Authenticity::NotVerified,
        warnings,
    }
}

fn dose(immunization: &Immunization, policy: DosePolicy) -> Dose {
    let counted = match policy {
        DosePolicy::All => true,
        DosePolicy::CompletedOnly => immunization.is_completed(),
    };

    let vaccine = immunization
        .vaccine
        .as_ref()
        .filter(|v| v.system.as_deref().map_or(true, |s| s == CVX_SYSTEM))
        .and_then(|v| cvx_name(&v.code))
        .map(ToOwned::to_owned);

    Dose {
        date: immunization.occurrence.clone(),
        vaccine_code: immunization.vaccine.as_ref().map(|v| v.code.clone()),
        vaccine,
        lot_number: immunization.lot_number.clone(),
        status: immunization.status.clone(),
        counted,
    }
}

/// Product names for the CVX codes seen on COVID-19 health cards.
fn cvx_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "207" => "Moderna COVID-19",
        "208" => "Pfizer-BioNTech COVID-19",
        "210" => "AstraZeneca COVID-19",
        "211" => "Novavax COVID-19",
        "212" => "Janssen COVID-19",
        "213" => "COVID-19, unspecified",
        _ => return None,
    };
    Some(name)
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issuer:     {}", self.issuer)?;
        if let Some(nbf) = self.not_before {
            writeln!(f, "Valid from: {}", nbf.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }

        let holder = if self.display_name.is_empty() {
            "The holder"
        } else {
            self.display_name.as_str()
        };
        let plural = if self.dose_count == 1 { "" } else { "s" };
        writeln!(
            f,
            "{holder} received {} dose{plural} of the COVID-19 vaccine.",
            self.dose_count
        )?;

        for dose in &self.doses {
            write!(f, "  - {}", dose.date.as_deref().unwrap_or("unknown date"))?;
            match (&dose.vaccine, &dose.vaccine_code) {
                (Some(name), Some(code)) => write!(f, "  {name} (CVX {code})")?,
                (None, Some(code)) => write!(f, "  code {code}")?,
                _ => {}
            }
            if let Some(lot) = &dose.lot_number {
                write!(f, "  lot {lot}")?;
            }
            if !dose.counted {
                write!(
                    f,
                    "  [not counted: {}]",
                    dose.status.as_deref().unwrap_or("unknown status")
                )?;
            }
            writeln!(f)?;
        }

        match &self.authenticity {
            Authenticity::NotVerified => writeln!(
                f,
                "Signature:  NOT VERIFIED, the content above is unauthenticated"
            )?,
            Authenticity::Verified {
                key_id,
                self_published_by: None,
            } => writeln!(f, "Signature:  valid (key {key_id})")?,
            Authenticity::Verified {
                key_id,
                self_published_by: Some(issuer),
            } => writeln!(
                f,
                "Signature:  valid (key {key_id}, self-published by {issuer}; issuer not vetted)"
            )?,
            Authenticity::Rejected { reason } => writeln!(f, "Signature:  INVALID ({reason})")?,
        }

        for warning in &self.warnings {
            writeln!(f, "Warning:    {warning}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::credential::{
        parse_credential, Entry, MedicalBundle, Name, Patient, VaccineCode,
    };

    fn record(entries: Vec<Resource>) -> CredentialRecord {
        CredentialRecord {
            issuer: "https://example.org/issuer".to_owned(),
            not_before: 1620000000,
            types: vec!["https://smarthealth.cards#health-card".to_owned()],
            fhir_version: "4.0.1".to_owned(),
            bundle: MedicalBundle {
                resource_type: "Bundle".to_owned(),
                bundle_type: "collection".to_owned(),
                entries: entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, resource)| Entry {
                        full_url: format!("resource:{i}"),
                        resource,
                    })
                    .collect(),
            },
        }
    }

    fn patient(given: &[&str], family: &str) -> Resource {
        Resource::Patient(Patient {
            names: vec![Name {
                given: given.iter().map(|g| g.to_string()).collect(),
                family: family.to_owned(),
            }],
            birth_date: None,
        })
    }

    fn immunization(status: Option<&str>) -> Resource {
        Resource::Immunization(Immunization {
            status: status.map(ToOwned::to_owned),
            vaccine: Some(VaccineCode {
                system: Some(CVX_SYSTEM.to_owned()),
                code: "208".to_owned(),
            }),
            occurrence: Some("2021-03-01".to_owned()),
            lot_number: None,
        })
    }

    #[test]
    fn counts_doses_and_names_patient() {
        let record = record(vec![
            patient(&["Jean"], "Biche"),
            immunization(None),
            immunization(None),
        ]);

        let report = build_summary(&record, DosePolicy::default());

        assert_eq!(report.issuer, "https://example.org/issuer");
        assert_eq!(report.display_name, "Jean Biche");
        assert_eq!(report.dose_count, 2);
        assert_eq!(report.authenticity, Authenticity::NotVerified);
        assert!(!report.is_authentic());
        assert!(report.warnings.is_empty());
        assert_eq!(
            report.doses[0].vaccine.as_deref(),
            Some("Pfizer-BioNTech COVID-19")
        );
    }

    #[test]
    fn first_patient_wins() {
        let record = record(vec![
            immunization(None),
            patient(&["Jean", "Paul"], "Biche"),
            patient(&["Other"], "Person"),
        ]);

        let report = build_summary(&record, DosePolicy::default());
        assert_eq!(report.display_name, "Jean Paul Biche");
        assert_eq!(report.dose_count, 1);
    }

    #[test]
    fn missing_patient_is_a_warning() {
        let record = record(vec![immunization(None)]);

        let report = build_summary(&record, DosePolicy::default());
        assert_eq!(report.display_name, "");
        assert_eq!(report.dose_count, 1);
        assert_eq!(report.warnings, vec![SummaryWarning::NoPatient]);
    }

    #[test]
    fn nameless_patient_is_a_warning() {
        let record = record(vec![Resource::Patient(Patient {
            names: vec![],
            birth_date: Some("1960-01-01".to_owned()),
        })]);

        let report = build_summary(&record, DosePolicy::default());
        assert_eq!(report.display_name, "");
        assert_eq!(report.warnings, vec![SummaryWarning::PatientWithoutName]);
    }

    #[test]
    fn dose_policy() {
        let record = record(vec![
            patient(&["Jean"], "Biche"),
            immunization(Some("completed")),
            immunization(Some("entered-in-error")),
            immunization(Some("not-done")),
            immunization(None),
        ]);

        let filtered = build_summary(&record, DosePolicy::CompletedOnly);
        assert_eq!(filtered.dose_count, 2);
        assert_eq!(filtered.doses.len(), 4);

        let all = build_summary(&record, DosePolicy::All);
        assert_eq!(all.dose_count, 4);
    }

    #[test]
    fn dose_policy_names() {
        assert_eq!(DosePolicy::CompletedOnly.to_string(), "completed-only");
        assert_eq!(DosePolicy::from_str("all").unwrap(), DosePolicy::All);
    }

    #[test]
    fn verdicts_update_authenticity() {
        let report = build_summary(&record(vec![]), DosePolicy::default());

        let verified = report.clone().with_verdict(Verdict::Verified {
            key_id: "k1".to_owned(),
        });
        assert!(verified.is_authentic());
        assert!(verified.to_string().contains("Signature:  valid (key k1)\n"));

        let fetched = verified.self_published_by("https://issuer.example");
        assert!(fetched.is_authentic());
        assert_eq!(
            fetched.authenticity,
            Authenticity::Verified {
                key_id: "k1".to_owned(),
                self_published_by: Some("https://issuer.example".to_owned()),
            }
        );
        assert!(fetched
            .to_string()
            .contains("valid (key k1, self-published by https://issuer.example; issuer not vetted)"));

        let not_verified = report.clone().self_published_by("https://issuer.example");
        assert_eq!(not_verified.authenticity, Authenticity::NotVerified);

        let rejected = report.with_verdict(Verdict::Rejected {
            reason: "bad".to_owned(),
        });
        assert!(!rejected.is_authentic());
        assert_eq!(
            rejected.authenticity,
            Authenticity::Rejected {
                reason: "bad".to_owned()
            }
        );
    }

    #[test]
    fn renders_text() {
        let text = include_str!("../fixtures/legacy-family-array.json");
        let record = parse_credential(text).unwrap();
        let report = build_summary(&record, DosePolicy::default());

        let rendered = report.to_string();
        assert!(rendered.contains("Jean Biche received 1 dose of the COVID-19 vaccine."));
        assert!(rendered.contains("Moderna COVID-19 (CVX 207)"));
        assert!(rendered.contains("[not counted: entered-in-error]"));
        assert!(rendered.contains("NOT VERIFIED"));
        assert!(rendered.contains("Valid from: 2021-03-26"));
    }

    #[test]
    fn serializes_json() {
        let report = build_summary(&record(vec![immunization(None)]), DosePolicy::default());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["doseCount"], 1);
        assert_eq!(json["displayName"], "");
        assert_eq!(json["authenticity"]["status"], "not_verified");
        assert_eq!(json["warnings"][0], "no_patient");
    }
}
