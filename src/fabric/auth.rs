//! Authentication configuration for fabric apps.
//!
//! Exactly one method must be configured: a shared secret, a static JWT
//! token file, a dynamically signed JWT, or SPIRE. The configuration is
//! converted into the identity provider (how this app proves who it is) and
//! identity verifier (how it checks its peers) handed to the fabric at app
//! creation.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_JWT_DURATION: Duration = Duration::from_secs(3600);

/// Errors raised while validating or converting authentication settings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no authentication method configured")]
    NoMethod,

    #[error("only one authentication method can be configured at a time")]
    MultipleMethods,

    #[error("JWT key encoding configuration is required for the identity provider")]
    MissingEncodingKey,

    #[error("JWT key must specify either 'file' or 'data'")]
    MissingKeySource,

    #[error("unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported JWT key format: {0}")]
    UnsupportedKeyFormat(String),
}

/// Authentication settings, as they appear in configuration files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub shared_secret: Option<String>,
    pub static_jwt: Option<StaticJwtConfig>,
    pub jwt: Option<JwtConfig>,
    pub spire: Option<SpireConfig>,
}

/// Pre-issued JWT read from a file.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticJwtConfig {
    pub file: String,
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
}

/// Dynamically signed JWT.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub claims: JwtClaims,
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
    pub key: JwtKey,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
}

/// Signing and verification key material. When `decoding` is absent the
/// verifier resolves keys from the peer's identity (autoresolve).
#[derive(Debug, Clone, Deserialize)]
pub struct JwtKey {
    pub encoding: Option<JwtKeyConfig>,
    pub decoding: Option<JwtKeyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtKeyConfig {
    pub algorithm: String,
    pub format: String,
    pub key: JwtKeySource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtKeySource {
    pub file: Option<String>,
    pub data: Option<String>,
}

/// SPIRE workload identity.
#[derive(Debug, Clone, Deserialize)]
pub struct SpireConfig {
    pub socket_path: Option<String>,
    pub target_spiffe_id: Option<String>,
    #[serde(default)]
    pub jwt_audiences: Vec<String>,
    #[serde(default)]
    pub trust_domains: Vec<String>,
}

/// Identity provider handed to the fabric at app creation.
#[derive(Debug, Clone)]
pub enum IdentityProviderConfig {
    SharedSecret {
        id: String,
        secret: String,
    },
    StaticJwt {
        token_file: String,
        duration: Duration,
    },
    Jwt {
        key: ResolvedJwtKey,
        claims: JwtClaims,
        duration: Duration,
    },
    Spire(SpireConfig),
}

/// Identity verifier handed to the fabric at app creation.
#[derive(Debug, Clone)]
pub enum IdentityVerifierConfig {
    SharedSecret {
        id: String,
        secret: String,
    },
    Jwt {
        /// `None` means autoresolve from the peer identity.
        key: Option<ResolvedJwtKey>,
        claims: JwtClaims,
        duration: Duration,
    },
    Spire(SpireConfig),
}

/// Parsed JWT key material.
#[derive(Debug, Clone)]
pub struct ResolvedJwtKey {
    pub algorithm: JwtAlgorithm,
    pub format: JwtKeyFormat,
    pub source: ResolvedKeySource,
}

#[derive(Debug, Clone)]
pub enum ResolvedKeySource {
    File(String),
    Data(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtAlgorithm {
    Hs256,
    Hs384,
    Hs512,
    Es256,
    Es384,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    EdDsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtKeyFormat {
    Pem,
    Jwk,
    Jwks,
}

impl AuthConfig {
    /// Convenience constructor for shared-secret deployments.
    pub fn with_shared_secret(secret: impl Into<String>) -> Self {
        Self {
            shared_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Check that exactly one authentication method is configured.
    pub fn validate(&self) -> Result<(), AuthError> {
        let configured = [
            self.shared_secret.is_some(),
            self.static_jwt.is_some(),
            self.jwt.is_some(),
            self.spire.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        match configured {
            0 => Err(AuthError::NoMethod),
            1 => Ok(()),
            _ => Err(AuthError::MultipleMethods),
        }
    }

    /// Build the identity provider for an app named `app_id`.
    pub fn to_provider(&self, app_id: &str) -> Result<IdentityProviderConfig, AuthError> {
        self.validate()?;

        if let Some(secret) = &self.shared_secret {
            return Ok(IdentityProviderConfig::SharedSecret {
                id: app_id.to_string(),
                secret: secret.clone(),
            });
        }

        if let Some(static_jwt) = &self.static_jwt {
            return Ok(IdentityProviderConfig::StaticJwt {
                token_file: static_jwt.file.clone(),
                duration: static_jwt.duration.unwrap_or(DEFAULT_JWT_DURATION),
            });
        }

        if let Some(jwt) = &self.jwt {
            let encoding = jwt.key.encoding.as_ref().ok_or(AuthError::MissingEncodingKey)?;
            return Ok(IdentityProviderConfig::Jwt {
                key: encoding.resolve()?,
                claims: jwt.claims.clone(),
                duration: jwt.duration.unwrap_or(DEFAULT_JWT_DURATION),
            });
        }

        if let Some(spire) = &self.spire {
            return Ok(IdentityProviderConfig::Spire(spire.clone()));
        }

        Err(AuthError::NoMethod)
    }

    /// Build the identity verifier for an app named `app_id`.
    pub fn to_verifier(&self, app_id: &str) -> Result<IdentityVerifierConfig, AuthError> {
        self.validate()?;

        if let Some(secret) = &self.shared_secret {
            return Ok(IdentityVerifierConfig::SharedSecret {
                id: app_id.to_string(),
                secret: secret.clone(),
            });
        }

        // Static tokens verify like dynamic JWTs with autoresolved keys.
        if let Some(static_jwt) = &self.static_jwt {
            return Ok(IdentityVerifierConfig::Jwt {
                key: None,
                claims: JwtClaims::default(),
                duration: static_jwt.duration.unwrap_or(DEFAULT_JWT_DURATION),
            });
        }

        if let Some(jwt) = &self.jwt {
            let key = match &jwt.key.decoding {
                Some(decoding) => Some(decoding.resolve()?),
                None => None,
            };
            return Ok(IdentityVerifierConfig::Jwt {
                key,
                claims: jwt.claims.clone(),
                duration: jwt.duration.unwrap_or(DEFAULT_JWT_DURATION),
            });
        }

        if let Some(spire) = &self.spire {
            return Ok(IdentityVerifierConfig::Spire(spire.clone()));
        }

        Err(AuthError::NoMethod)
    }
}

impl JwtKeyConfig {
    fn resolve(&self) -> Result<ResolvedJwtKey, AuthError> {
        let algorithm = parse_algorithm(&self.algorithm)?;
        let format = parse_key_format(&self.format)?;

        let source = if let Some(file) = &self.key.file {
            ResolvedKeySource::File(file.clone())
        } else if let Some(data) = &self.key.data {
            ResolvedKeySource::Data(data.clone())
        } else {
            return Err(AuthError::MissingKeySource);
        };

        Ok(ResolvedJwtKey {
            algorithm,
            format,
            source,
        })
    }
}

fn parse_algorithm(algorithm: &str) -> Result<JwtAlgorithm, AuthError> {
    match algorithm {
        "HS256" => Ok(JwtAlgorithm::Hs256),
        "HS384" => Ok(JwtAlgorithm::Hs384),
        "HS512" => Ok(JwtAlgorithm::Hs512),
        "ES256" => Ok(JwtAlgorithm::Es256),
        "ES384" => Ok(JwtAlgorithm::Es384),
        "RS256" => Ok(JwtAlgorithm::Rs256),
        "RS384" => Ok(JwtAlgorithm::Rs384),
        "RS512" => Ok(JwtAlgorithm::Rs512),
        "PS256" => Ok(JwtAlgorithm::Ps256),
        "PS384" => Ok(JwtAlgorithm::Ps384),
        "PS512" => Ok(JwtAlgorithm::Ps512),
        "EdDSA" => Ok(JwtAlgorithm::EdDsa),
        other => Err(AuthError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn parse_key_format(format: &str) -> Result<JwtKeyFormat, AuthError> {
    match format.to_ascii_lowercase().as_str() {
        "pem" => Ok(JwtKeyFormat::Pem),
        "jwk" => Ok(JwtKeyFormat::Jwk),
        "jwks" => Ok(JwtKeyFormat::Jwks),
        other => Err(AuthError::UnsupportedKeyFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_method_rejected() {
        let auth = AuthConfig::default();
        assert!(matches!(auth.validate(), Err(AuthError::NoMethod)));
    }

    #[test]
    fn multiple_methods_rejected() {
        let auth = AuthConfig {
            shared_secret: Some("secret".to_string()),
            static_jwt: Some(StaticJwtConfig {
                file: "/tmp/token".to_string(),
                duration: None,
            }),
            ..Default::default()
        };
        assert!(matches!(auth.validate(), Err(AuthError::MultipleMethods)));
    }

    #[test]
    fn shared_secret_provider() {
        let auth = AuthConfig::with_shared_secret("s3cr3t-s3cr3t-s3cr3t-s3cr3t-1234");
        match auth.to_provider("org/ns/app").unwrap() {
            IdentityProviderConfig::SharedSecret { id, secret } => {
                assert_eq!(id, "org/ns/app");
                assert_eq!(secret, "s3cr3t-s3cr3t-s3cr3t-s3cr3t-1234");
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn jwt_provider_requires_encoding_key() {
        let auth = AuthConfig {
            jwt: Some(JwtConfig {
                claims: JwtClaims::default(),
                duration: None,
                key: JwtKey {
                    encoding: None,
                    decoding: None,
                },
            }),
            ..Default::default()
        };
        assert!(matches!(
            auth.to_provider("org/ns/app"),
            Err(AuthError::MissingEncodingKey)
        ));
    }

    #[test]
    fn jwt_verifier_autoresolves_without_decoding_key() {
        let auth = AuthConfig {
            jwt: Some(JwtConfig {
                claims: JwtClaims::default(),
                duration: None,
                key: JwtKey {
                    encoding: Some(JwtKeyConfig {
                        algorithm: "ES256".to_string(),
                        format: "pem".to_string(),
                        key: JwtKeySource {
                            file: Some("/tmp/key.pem".to_string()),
                            data: None,
                        },
                    }),
                    decoding: None,
                },
            }),
            ..Default::default()
        };
        match auth.to_verifier("org/ns/app").unwrap() {
            IdentityVerifierConfig::Jwt { key, .. } => assert!(key.is_none()),
            other => panic!("unexpected verifier: {other:?}"),
        }
    }

    #[test]
    fn jwt_key_rejects_unknown_algorithm() {
        let key = JwtKeyConfig {
            algorithm: "none".to_string(),
            format: "pem".to_string(),
            key: JwtKeySource {
                file: None,
                data: Some("key-material".to_string()),
            },
        };
        assert!(matches!(
            key.resolve(),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn jwt_key_requires_a_source() {
        let key = JwtKeyConfig {
            algorithm: "HS256".to_string(),
            format: "jwk".to_string(),
            key: JwtKeySource {
                file: None,
                data: None,
            },
        };
        assert!(matches!(key.resolve(), Err(AuthError::MissingKeySource)));
    }
}
