//! GantryAuthConfiguration CRD
//!
//! Holds the server URL and API token used to reach the remote service.
//! It is read by the engine and never programmed remotely.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec for a GantryAuthConfiguration
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryAuthConfiguration",
    plural = "gantryauthconfigurations",
    shortname = "gauth",
    namespaced,
    printcolumn = r#"{"name":"Server","type":"string","jsonPath":".spec.serverUrl"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryAuthConfigurationSpec {
    /// Base URL of the remote API (e.g. `https://eu.api.gantry.example`)
    pub server_url: String,

    /// Token given inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Token stored in a Secret in the same namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

/// Reference to a key inside a Secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Key within the Secret's data
    pub key: String,
}

/// How the token of an auth configuration is supplied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSource<'a> {
    /// Inline token
    Inline(&'a str),
    /// Token in a Secret
    Secret(&'a SecretKeyRef),
}

impl GantryAuthConfigurationSpec {
    /// Exactly one of `token` and `secretRef` must be set
    pub fn token_source(&self) -> crate::Result<TokenSource<'_>> {
        match (self.token.as_deref(), self.secret_ref.as_ref()) {
            (Some(token), None) if !token.is_empty() => Ok(TokenSource::Inline(token)),
            (None, Some(secret)) => Ok(TokenSource::Secret(secret)),
            (Some(_), Some(_)) => Err(crate::Error::validation(
                "only one of token and secretRef may be set",
            )),
            _ => Err(crate::Error::validation(
                "one of token or secretRef is required",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(token: Option<&str>, secret: bool) -> GantryAuthConfigurationSpec {
        GantryAuthConfigurationSpec {
            server_url: "https://api.example.test".to_string(),
            token: token.map(String::from),
            secret_ref: secret.then(|| SecretKeyRef {
                name: "token".to_string(),
                key: "value".to_string(),
            }),
        }
    }

    #[test]
    fn exactly_one_token_source_is_accepted() {
        assert!(matches!(
            spec(Some("tok"), false).token_source().unwrap(),
            TokenSource::Inline("tok")
        ));
        assert!(matches!(
            spec(None, true).token_source().unwrap(),
            TokenSource::Secret(_)
        ));
        assert!(spec(Some("tok"), true).token_source().is_err());
        assert!(spec(None, false).token_source().is_err());
        assert!(spec(Some(""), false).token_source().is_err());
    }
}
