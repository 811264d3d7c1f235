//! Signature verification extension point.
//!
//! Decoding a health card says nothing about who produced it. Callers that want
//! to present a credential as authentic must run a [`SignatureVerifier`] over the
//! decoded token and attach its [`Verdict`] to the report.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::token::CompactToken;

/// Outcome of checking a token signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The signature is valid for the given key.
    Verified { key_id: String },
    /// The signature could not be validated.
    Rejected { reason: String },
}

/// Trait for checking the issuer signature of a decoded token.
pub trait SignatureVerifier: Send + Sync {
    /// Checks the signature over `token.signing_input()`.
    ///
    /// # Arguments
    ///
    /// * `token` - The decoded compact token.
    ///
    /// # Returns
    ///
    /// A `Verdict`; `Err` is reserved for failures of the verifier itself.
    fn verify(&self, token: &CompactToken) -> Result<Verdict>;
}

#[cfg(feature = "verify-es256")]
pub use es256::Es256JwksVerifier;

#[cfg(feature = "verify-es256")]
mod es256 {
    use std::collections::HashMap;

    use anyhow::{anyhow, bail, Context, Result};
    use base64::engine::{general_purpose::URL_SAFE_NO_PAD as BASE64_URL_NO_PAD, Engine};
    use p256::{
        ecdsa::{signature::Verifier, Signature, VerifyingKey},
        EncodedPoint, FieldBytes,
    };
    use serde::Deserialize;

    use super::{SignatureVerifier, Verdict};
    use crate::token::CompactToken;

    #[derive(Debug, Deserialize)]
    struct JwkSet {
        keys: Vec<Jwk>,
    }

    #[derive(Debug, Deserialize)]
    struct Jwk {
        kty: String,
        #[serde(default)]
        crv: Option<String>,
        #[serde(default)]
        kid: Option<String>,
        #[serde(default)]
        x: Option<String>,
        #[serde(default)]
        y: Option<String>,
    }

    /// ES256 verifier backed by an issuer's JSON Web Key Set.
    #[derive(Debug, Clone)]
    pub struct Es256JwksVerifier {
        keys: HashMap<String, VerifyingKey>,
    }

    impl Es256JwksVerifier {
        /// Builds a verifier from a JWK Set document.
        ///
        /// Keys that are not P-256 EC keys are skipped.
        ///
        /// # Arguments
        ///
        /// * `jwks` - JSON text of the form `{"keys":[...]}`.
        pub fn from_jwks_json(jwks: &str) -> Result<Self> {
            let set: JwkSet = serde_json::from_str(jwks).context("Invalid JWK Set")?;

            let mut keys = HashMap::new();
            for jwk in set.keys {
                if jwk.kty != "EC" || jwk.crv.as_deref() != Some("P-256") {
                    log::debug!(
                        "Skipping {} key '{}'",
                        jwk.kty,
                        jwk.kid.as_deref().unwrap_or_default()
                    );
                    continue;
                }
                let kid = jwk.kid.clone().unwrap_or_default();
                let key = verifying_key(&jwk).with_context(|| format!("Invalid key '{kid}'"))?;
                keys.insert(kid, key);
            }

            if keys.is_empty() {
                bail!("JWK Set contains no P-256 keys");
            }

            log::debug!("Loaded {} ES256 key(s)", keys.len());

            Ok(Self { keys })
        }

        /// Number of usable keys.
        pub fn len(&self) -> usize {
            self.keys.len()
        }

        /// Returns true if no keys were loaded.
        pub fn is_empty(&self) -> bool {
            self.keys.is_empty()
        }

        fn select_key(&self, kid: Option<&str>) -> Option<(&str, &VerifyingKey)> {
            let selected = match kid {
                Some(kid) => self.keys.get_key_value(kid),
                None if self.keys.len() == 1 => self.keys.iter().next(),
                None => None,
            };
            selected.map(|(kid, key)| (kid.as_str(), key))
        }
    }

    impl SignatureVerifier for Es256JwksVerifier {
        fn verify(&self, token: &CompactToken) -> Result<Verdict> {
            let header = match token.parse_header() {
                Ok(header) => header,
                Err(e) => {
                    return Ok(Verdict::Rejected {
                        reason: format!("unreadable token header: {e}"),
                    })
                }
            };

            if header.alg != "ES256" {
                return Ok(Verdict::Rejected {
                    reason: format!("unsupported algorithm '{}'", header.alg),
                });
            }

            let Some((kid, key)) = self.select_key(header.kid.as_deref()) else {
                return Ok(Verdict::Rejected {
                    reason: format!(
                        "no key '{}' in issuer key set",
                        header.kid.as_deref().unwrap_or_default()
                    ),
                });
            };

            let signature = match Signature::from_slice(&token.signature) {
                Ok(signature) => signature,
                Err(_) => {
                    return Ok(Verdict::Rejected {
                        reason: format!(
                            "signature must be 64 bytes, found {}",
                            token.signature.len()
                        ),
                    })
                }
            };

            log::trace!("Verifying ES256 signature with key '{kid}'");

            let verdict = match key.verify(token.signing_input().as_bytes(), &signature) {
                Ok(()) => Verdict::Verified {
                    key_id: kid.to_owned(),
                },
                Err(_) => Verdict::Rejected {
                    reason: format!("signature does not match key '{kid}'"),
                },
            };

            Ok(verdict)
        }
    }

    fn verifying_key(jwk: &Jwk) -> Result<VerifyingKey> {
        let coordinate = |name: &str, value: &Option<String>| -> Result<Vec<u8>> {
            let value = value
                .as_deref()
                .ok_or_else(|| anyhow!("Missing '{name}' coordinate"))?;
            let bytes = BASE64_URL_NO_PAD.decode(value)?;
            if bytes.len() != 32 {
                bail!("'{name}' coordinate must be 32 bytes, found {}", bytes.len());
            }
            Ok(bytes)
        };

        let x = coordinate("x", &jwk.x)?;
        let y = coordinate("y", &jwk.y)?;

        let point = EncodedPoint::from_affine_coordinates(
            &FieldBytes::clone_from_slice(&x),
            &FieldBytes::clone_from_slice(&y),
            false,
        );

        VerifyingKey::from_encoded_point(&point).map_err(|_| anyhow!("Point is not on P-256"))
    }
}
