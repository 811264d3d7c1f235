use std::{fs, path::Path};

use anyhow::{Context, Result};
use vaxx_check::verify::Es256JwksVerifier;

/// Loads an issuer key set from a JWKS file.
pub fn load_jwks_file(path: &Path) -> Result<Es256JwksVerifier> {
    let jwks = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key set '{}'", path.display()))?;
    Es256JwksVerifier::from_jwks_json(&jwks)
}

/// Location of an issuer's published key set.
pub fn jwks_url(issuer: &str) -> String {
    format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
}

/// Downloads the key set an issuer publishes under `/.well-known/jwks.json`.
#[cfg(feature = "fetch-jwks")]
pub fn fetch_issuer_jwks(issuer: &str) -> Result<Es256JwksVerifier> {
    use anyhow::bail;

    if !issuer.starts_with("https://") {
        bail!("Refusing to fetch keys for non-https issuer '{issuer}'");
    }

    let url = jwks_url(issuer);
    log::debug!("Fetching issuer keys from {url}");

    let jwks = reqwest::blocking::get(&url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .with_context(|| format!("Failed to fetch '{url}'"))?;

    Es256JwksVerifier::from_jwks_json(&jwks)
}

#[cfg(not(feature = "fetch-jwks"))]
pub fn fetch_issuer_jwks(issuer: &str) -> Result<Es256JwksVerifier> {
    anyhow::bail!("Cannot fetch keys for '{issuer}': built without the 'fetch-jwks' feature")
}
