use std::any::Any;

use serde::{Deserialize, Serialize};
use xds_types::envoy::config::core::v3::DataSource;
use xds_types::envoy::extensions::transport_sockets::tls::v3 as wire;

use super::{encode_proto, json_view, EncodeResult};
use crate::{Resource, ResourceKind};

/// A certificate and its private key, PEM encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCertificate {
    /// Certificate chain.
    pub certificate_chain: String,
    /// Private key.
    pub private_key: String,
}

/// Peer certificate validation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationContext {
    /// Trusted CA bundle, PEM encoded.
    pub trusted_ca: String,
}

/// TLS secret (SDS).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret name.
    pub name: String,
    /// Certificate and key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_certificate: Option<TlsCertificate>,
    /// Validation context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_context: Option<ValidationContext>,
}

fn inline(pem: &str) -> Option<DataSource> {
    Some(DataSource {
        inline_string: Some(pem.to_string()),
    })
}

impl Secret {
    /// The Envoy message this secret encodes to.
    #[must_use]
    pub fn to_proto(&self) -> wire::Secret {
        wire::Secret {
            name: self.name.clone(),
            tls_certificate: self.tls_certificate.as_ref().map(|cert| wire::TlsCertificate {
                certificate_chain: inline(&cert.certificate_chain),
                private_key: inline(&cert.private_key),
            }),
            validation_context: self.validation_context.as_ref().map(|ctx| {
                wire::CertificateValidationContext {
                    trusted_ca: inline(&ctx.trusted_ca),
                }
            }),
        }
    }
}

impl Resource for Secret {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> EncodeResult {
        encode_proto(self.kind(), &self.to_proto())
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        json_view(self)
    }

    fn validate(&self) -> Result<(), String> {
        if self.tls_certificate.is_none() && self.validation_context.is_none() {
            return Err("secret has neither tls_certificate nor validation_context".to_string());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
