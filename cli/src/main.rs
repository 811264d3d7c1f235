//! `qc-vaxx-check`: checks SMART Health Card vaccination QR codes.

mod keys;
mod scan;

use std::{fmt, path::PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use rayon::prelude::*;
use vaxx_check::{
    decode_credential,
    summary::build_summary,
    verify::{Es256JwksVerifier, SignatureVerifier},
    DecodeOptions, DosePolicy, VerificationReport,
};

/// Checks a SMART Health Card vaccination QR code.
///
/// Prints the issuer, the patient name and the number of vaccine doses. The
/// signature is only checked when an issuer key set is given.
#[derive(Debug, Parser)]
#[command(name = "qc-vaxx-check", version)]
struct Args {
    /// QR code image files
    #[arg(required_unless_present = "raw")]
    images: Vec<PathBuf>,

    /// Already scanned `shc:/...` payload (repeatable)
    #[arg(long, conflicts_with = "images")]
    raw: Vec<String>,

    /// Issuer JWK Set file used to verify signatures
    #[arg(long, env = "VAXX_CHECK_JWKS", conflicts_with = "fetch_jwks")]
    jwks: Option<PathBuf>,

    /// Download the issuer key set from `<iss>/.well-known/jwks.json`.
    ///
    /// The issuer URL comes from the card itself, so this checks integrity only:
    /// any https host can publish keys for cards it signed.
    #[arg(long)]
    fetch_jwks: bool,

    /// Count Immunization entries whatever their status
    #[arg(long)]
    count_all_doses: bool,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

enum Input {
    Image(PathBuf),
    Raw(usize, String),
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Image(path) => write!(f, "{}", path.display()),
            Input::Raw(i, _) => write!(f, "payload #{}", i + 1),
        }
    }
}

impl Args {
    fn inputs(&self) -> Vec<Input> {
        let images = self.images.iter().cloned().map(Input::Image);
        let raw = self
            .raw
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, raw)| Input::Raw(i, raw));
        images.chain(raw).collect()
    }

    fn options(&self) -> DecodeOptions {
        let dose_policy = if self.count_all_doses {
            DosePolicy::All
        } else {
            DosePolicy::CompletedOnly
        };
        DecodeOptions { dose_policy }
    }

    fn verifies(&self) -> bool {
        self.jwks.is_some() || self.fetch_jwks
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let inputs = args.inputs();
    let options = args.options();

    let verifier = args
        .jwks
        .as_deref()
        .map(keys::load_jwks_file)
        .transpose()?;

    let outcomes = inputs
        .par_iter()
        .map(|input| check(input, options, verifier.as_ref(), args.fetch_jwks))
        .collect::<Vec<_>>();

    let mut failed = 0;
    let mut json_reports = Vec::new();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        match outcome {
            Ok(report) => {
                if args.verifies() && !report.is_authentic() {
                    failed += 1;
                }
                if args.json {
                    json_reports.push(report);
                } else {
                    if inputs.len() > 1 {
                        println!("== {input}");
                    }
                    print!("{report}");
                }
            }
            Err(e) => {
                eprintln!("{input}: {e:#}");
                failed += 1;
            }
        }
    }

    if args.json {
        println!("{}", render_json(&json_reports, inputs.len() > 1)?);
    }

    if failed > 0 {
        bail!("{failed} of {} credential(s) could not be validated", inputs.len());
    }

    Ok(())
}

/// A single input prints one object, several inputs print one array.
fn render_json(reports: &[VerificationReport], many: bool) -> Result<String> {
    Ok(match reports {
        [report] if !many => serde_json::to_string_pretty(report)?,
        reports => serde_json::to_string_pretty(reports)?,
    })
}

fn check(
    input: &Input,
    options: DecodeOptions,
    verifier: Option<&Es256JwksVerifier>,
    fetch_jwks: bool,
) -> Result<VerificationReport> {
    let raw = match input {
        Input::Image(path) => scan::scan_image(path)?,
        Input::Raw(_, raw) => raw.clone(),
    };

    let decoded = decode_credential(&raw).map_err(|e| anyhow!("{}: {e}", e.kind()))?;
    let report = build_summary(&decoded.record, options.dose_policy);

    let verdict = match (verifier, fetch_jwks) {
        (Some(verifier), _) => Some(verifier.verify(&decoded.token)?),
        (None, true) => {
            let verifier = keys::fetch_issuer_jwks(&decoded.record.issuer)?;
            let report = report.with_verdict(verifier.verify(&decoded.token)?);
            return Ok(report.self_published_by(&decoded.record.issuer));
        }
        (None, false) => None,
    };

    Ok(match verdict {
        Some(verdict) => report.with_verdict(verdict),
        None => report,
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_images_and_flags() {
        let args =
            Args::try_parse_from(["qc-vaxx-check", "a.png", "b.png", "--count-all-doses"]).unwrap();

        assert_eq!(args.images.len(), 2);
        assert_eq!(args.options().dose_policy, DosePolicy::All);
        assert!(!args.verifies());
        assert_eq!(args.inputs()[1].to_string(), "b.png");
    }

    #[test]
    fn parses_raw_payloads() {
        let args =
            Args::try_parse_from(["qc-vaxx-check", "--raw", "shc:/56", "--raw", "shc:/57"]).unwrap();

        let inputs = args.inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].to_string(), "payload #1");
        assert_eq!(args.options().dose_policy, DosePolicy::CompletedOnly);
    }

    #[test]
    fn requires_an_input() {
        assert!(Args::try_parse_from(["qc-vaxx-check"]).is_err());
        assert!(Args::try_parse_from(["qc-vaxx-check", "a.png", "--raw", "shc:/56"]).is_err());
    }

    #[test]
    fn json_output_is_one_document() {
        let text = include_str!("../../fixtures/two-doses.json");
        let record = vaxx_check::credential::parse_credential(text).unwrap();
        let report = build_summary(&record, DosePolicy::default());

        let single: serde_json::Value =
            serde_json::from_str(&render_json(&[report.clone()], false).unwrap()).unwrap();
        assert_eq!(single["doseCount"], 2);

        let many: serde_json::Value =
            serde_json::from_str(&render_json(&[report.clone(), report], true).unwrap()).unwrap();
        let many = many.as_array().unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1]["issuer"], single["issuer"]);

        assert_eq!(render_json(&[], true).unwrap(), "[]");
    }

    #[test]
    fn decode_errors_carry_their_kind() {
        let input = Input::Raw(0, "shc:/5".to_owned());
        let err = check(&input, DecodeOptions::default(), None, false).unwrap_err();
        assert!(err.to_string().starts_with("MalformedPayload:"));
    }
}
