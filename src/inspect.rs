//! Server certificate expiry inspection.
//!
//! The expiry read here is informational: it is printed on every poll cycle
//! and exported as a metric, but whether an expired server certificate is
//! accepted is decided by the TLS handshake alone.

use chrono::{DateTime, NaiveDateTime};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::X509;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ProbeError;

/// Expiration timestamp of a certificate on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryInfo {
    /// File the certificate was read from
    pub path: PathBuf,
    /// The `notAfter` field as a UTC date-time, seconds precision
    pub not_after: NaiveDateTime,
}

impl ExpiryInfo {
    /// Seconds between `now` and expiry, negative once expired.
    pub fn seconds_remaining(&self, now: NaiveDateTime) -> i64 {
        (self.not_after - now).num_seconds()
    }

    /// Whole days between `now` and expiry, negative once expired.
    pub fn days_remaining(&self, now: NaiveDateTime) -> i64 {
        (self.not_after - now).num_days()
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.not_after < now
    }
}

impl fmt::Display for ExpiryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.not_after.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Reads a PEM encoded X.509 certificate and returns its expiration timestamp.
///
/// # Arguments
///
/// * `path` - Path to a file holding one PEM certificate
///
/// # Returns
///
/// * `Ok(ExpiryInfo)` - The certificate's `notAfter` as UTC
/// * `Err(ProbeError::CertificateParse)` - The file is missing, unreadable,
///   not PEM, or its `notAfter` cannot be represented
///
/// # Example
///
/// ```no_run
/// # use mtlsprobe::inspect_certificate;
/// let expiry = inspect_certificate("./cert/server-cert.pem")?;
/// println!("{} is the expiration date of a server certificate", expiry);
/// # Ok::<(), mtlsprobe::ProbeError>(())
/// ```
pub fn inspect_certificate<P: AsRef<Path>>(path: P) -> Result<ExpiryInfo, ProbeError> {
    let path = path.as_ref();
    let pem = fs::read(path).map_err(|e| ProbeError::certificate_parse(path, e))?;
    let cert = X509::from_pem(&pem).map_err(|e| ProbeError::certificate_parse(path, e))?;
    let not_after =
        asn1_time_to_utc(cert.not_after()).map_err(|e| ProbeError::certificate_parse(path, e))?;

    log::debug!("{} expires at {}", path.display(), not_after);
    Ok(ExpiryInfo {
        path: path.to_path_buf(),
        not_after,
    })
}

/// Converts an ASN.1 UTCTime/GeneralizedTime to a UTC-naive date-time.
///
/// The value is measured as an offset from the Unix epoch by OpenSSL itself,
/// so both the two and four digit year forms resolve identically and any
/// zone suffix is already folded into UTC.
pub(crate) fn asn1_time_to_utc(time: &Asn1TimeRef) -> Result<NaiveDateTime, String> {
    let epoch = Asn1Time::from_unix(0).map_err(|e| e.to_string())?;
    let diff = epoch.diff(time).map_err(|e| e.to_string())?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| format!("notAfter out of range: {}", time))
}
