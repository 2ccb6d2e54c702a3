//! Issuance notifications accepted by the recorder.
//!
//! Only the fields the recorder needs are carried; certificate parsing and
//! transport happen elsewhere.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::CredentialKind;

/// An SSH certificate was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCertIssued {
    /// The certificate's valid principals. The first non-blank one names the user.
    pub valid_principals: Vec<String>,
    /// End of validity, seconds since the Unix epoch.
    pub valid_before: u64,
}

impl SshCertIssued {
    /// Create a notification for a single principal.
    #[must_use]
    pub fn new(principal: impl Into<String>, valid_before: u64) -> Self {
        Self {
            valid_principals: vec![principal.into()],
            valid_before,
        }
    }
}

/// An X.509 certificate was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509CertIssued {
    /// Subject common name, which names the user.
    pub common_name: String,
    /// End of validity, seconds since the Unix epoch.
    pub not_after: u64,
}

impl X509CertIssued {
    /// Create a notification.
    #[must_use]
    pub fn new(common_name: impl Into<String>, not_after: u64) -> Self {
        Self {
            common_name: common_name.into(),
            not_after,
        }
    }
}

/// Either kind of issuance notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Notification {
    /// SSH certificate issued.
    Ssh(SshCertIssued),
    /// X.509 certificate issued.
    X509(X509CertIssued),
}

impl Notification {
    /// The credential kind.
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Ssh(_) => CredentialKind::Ssh,
            Self::X509(_) => CredentialKind::X509,
        }
    }

    /// The username to record against, or `None` if the notification
    /// carries no usable identity.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Ssh(cert) => cert
                .valid_principals
                .iter()
                .map(|p| p.trim())
                .find(|p| !p.is_empty()),
            Self::X509(cert) => Some(cert.common_name.trim()).filter(|cn| !cn.is_empty()),
        }
    }

    /// End of validity, seconds since the Unix epoch.
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        match self {
            Self::Ssh(cert) => cert.valid_before,
            Self::X509(cert) => cert.not_after,
        }
    }

    /// Time left until expiry as seen at `now` (zero if already expired).
    #[must_use]
    pub fn remaining_lifetime(&self, now: u64) -> Duration {
        Duration::from_secs(self.expires_at().saturating_sub(now))
    }
}

impl From<SshCertIssued> for Notification {
    fn from(cert: SshCertIssued) -> Self {
        Self::Ssh(cert)
    }
}

impl From<X509CertIssued> for Notification {
    fn from(cert: X509CertIssued) -> Self {
        Self::X509(cert)
    }
}
