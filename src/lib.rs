//! Mutual TLS health-check poller.
//!
//! The probe reads the expiry of a local copy of the server certificate,
//! then polls an HTTPS endpoint with a client certificate, printing the
//! outcome of every attempt. The first failed request ends the loop.
//!
//! # Example
//!
//! ```no_run
//! use mtlsprobe::config::Config;
//! use mtlsprobe::{inspect_certificate, PollingClient, PollSettings, ThreadSleep};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Config::default().resolve()?;
//! let expiry = inspect_certificate(&settings.server_cert)?;
//! let mut client = PollingClient::new(&settings.identity, expiry, PollSettings::from(&settings))?;
//! let summary = client.run(&mut std::io::stdout(), &mut ThreadSleep, |_, _| {})?;
//! println!("{} cycle(s)", summary.cycles);
//! # Ok(())
//! # }
//! ```

use chrono::{NaiveDateTime, SubsecRound, Utc};

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod inspect;
pub mod issue;

pub use client::{Pacer, PollOutcome, PollSettings, PollState, PollingClient, RunSummary, ThreadSleep};
pub use error::ProbeError;
pub use identity::TlsIdentity;
pub use inspect::{inspect_certificate, ExpiryInfo};
pub use issue::CertIssuer;

/// Current UTC time without sub-second precision.
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}
