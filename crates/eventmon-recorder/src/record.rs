//! Issuance records and lifetime quantization.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const SECS_PER_MINUTE: u32 = 60;
const SECS_PER_HOUR: u32 = 3600;

/// Margin added before checking whether a lifetime rolls into the next hour.
const HOUR_MARGIN_SECS: u32 = 60;

/// Margin added before checking whether a lifetime rolls into the next minute.
const MINUTE_MARGIN_SECS: u32 = 1;

/// Which kind of credential an issuance record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// An SSH user certificate.
    Ssh,
    /// An X.509 client certificate.
    X509,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::X509 => write!(f, "x509"),
        }
    }
}

/// A single credential issuance, as kept in a user's history.
///
/// Immutable once created. Exactly one of `ssh` and `x509` is normally set;
/// a record with neither flag is tolerated when read back from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    /// Issuance time, seconds since the Unix epoch.
    pub create_time: u64,
    /// Granted lifetime in seconds, quantized by [`quantize_lifetime`].
    pub lifetime_seconds: u32,
    /// Whether an SSH certificate was issued.
    #[serde(default)]
    pub ssh: bool,
    /// Whether an X.509 certificate was issued.
    #[serde(default)]
    pub x509: bool,
}

impl IssuanceRecord {
    /// Create a record for the given credential kind.
    #[must_use]
    pub fn new(create_time: u64, lifetime_seconds: u32, kind: CredentialKind) -> Self {
        Self {
            create_time,
            lifetime_seconds,
            ssh: kind == CredentialKind::Ssh,
            x509: kind == CredentialKind::X509,
        }
    }

    /// The credential kind, if exactly one flag is set.
    #[must_use]
    pub fn kind(&self) -> Option<CredentialKind> {
        match (self.ssh, self.x509) {
            (true, false) => Some(CredentialKind::Ssh),
            (false, true) => Some(CredentialKind::X509),
            _ => None,
        }
    }

    /// When the issued credential stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.create_time
            .saturating_add(u64::from(self.lifetime_seconds))
    }
}

/// Convert a granted lifetime into the coarse value stored in the history.
///
/// The duration is first rounded to the nearest whole second. Lifetimes of
/// an hour or more are bumped to the next whole hour when adding a 60 second
/// margin crosses an hour boundary; lifetimes of a minute or more are bumped
/// to the next whole minute when adding a 1 second margin crosses a minute
/// boundary. Anything shorter keeps second granularity.
#[must_use]
pub fn quantize_lifetime(lifetime: Duration) -> u32 {
    let mut seconds = whole_seconds(lifetime);
    if seconds >= SECS_PER_HOUR {
        let hours = seconds / SECS_PER_HOUR;
        let hours_plus = seconds.saturating_add(HOUR_MARGIN_SECS) / SECS_PER_HOUR;
        if hours_plus > hours {
            seconds = hours_plus.saturating_mul(SECS_PER_HOUR);
        }
    } else if seconds >= SECS_PER_MINUTE {
        let minutes = seconds / SECS_PER_MINUTE;
        let minutes_plus = seconds.saturating_add(MINUTE_MARGIN_SECS) / SECS_PER_MINUTE;
        if minutes_plus > minutes {
            seconds = minutes_plus.saturating_mul(SECS_PER_MINUTE);
        }
    }
    seconds
}

/// Round half up to whole seconds, saturating at `u32::MAX`.
fn whole_seconds(lifetime: Duration) -> u32 {
    let mut secs = lifetime.as_secs();
    if lifetime.subsec_nanos() >= 500_000_000 {
        secs = secs.saturating_add(1);
    }
    u32::try_from(secs).unwrap_or(u32::MAX)
}
