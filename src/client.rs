//! The polling loop.
//!
//! A [`PollingClient`] owns one HTTP session configured for mutual TLS and
//! issues a single GET per cycle. The first failed request terminates the
//! loop; there is no retry.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use strum_macros::Display;
use url::Url;

use crate::config::Settings;
use crate::identity::TlsIdentity;
use crate::inspect::ExpiryInfo;
use crate::{utc_now, ProbeError};

/// Lifecycle of a [`PollingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PollState {
    Initializing,
    Polling,
    Terminated,
}

/// Result of one successful GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub status: u16,
    pub body: String,
}

/// Polling parameters taken from [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub url: Url,
    pub interval: Duration,
    pub request_timeout: Option<Duration>,
    pub max_cycles: Option<u64>,
}

impl From<&Settings> for PollSettings {
    fn from(settings: &Settings) -> Self {
        PollSettings {
            url: settings.url.clone(),
            interval: settings.interval,
            request_timeout: settings.request_timeout,
            max_cycles: settings.max_cycles,
        }
    }
}

/// Totals reported once the loop ends.
#[derive(Debug)]
pub struct RunSummary {
    pub cycles: u64,
    pub succeeded: u64,
    /// The error that terminated the loop, if any
    pub failure: Option<ProbeError>,
}

/// Waits between two poll cycles.
pub trait Pacer {
    fn pause(&mut self, interval: Duration);
}

/// Blocks the calling thread for the whole interval.
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&mut self, interval: Duration) {
        thread::sleep(interval);
    }
}

pub struct PollingClient {
    http: reqwest::blocking::Client,
    settings: PollSettings,
    expiry: ExpiryInfo,
    state: PollState,
}

impl PollingClient {
    /// Builds the mTLS session. No network I/O happens here.
    ///
    /// The CAs of `identity.root_ca` are the only trust anchors; the
    /// platform's built-in roots are not consulted.
    pub fn new(
        identity: &TlsIdentity,
        expiry: ExpiryInfo,
        settings: PollSettings,
    ) -> Result<Self, ProbeError> {
        log::debug!("{}: building session for {}", PollState::Initializing, settings.url);
        let loaded = identity.load()?;

        let mut builder = reqwest::blocking::Client::builder()
            .use_native_tls()
            .identity(loaded.identity)
            .tls_built_in_root_certs(false)
            .timeout(settings.request_timeout);
        for root in loaded.roots {
            builder = builder.add_root_certificate(root);
        }
        let http = builder.build().map_err(|e| ProbeError::Other {
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        Ok(PollingClient {
            http,
            settings,
            expiry,
            state: PollState::Initializing,
        })
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn expiry(&self) -> &ExpiryInfo {
        &self.expiry
    }

    pub fn url(&self) -> &Url {
        &self.settings.url
    }

    /// Performs one HTTPS GET against the target URL.
    ///
    /// Any HTTP status counts as a completed request; only transport, TLS
    /// and body decoding failures are errors.
    pub fn poll_once(&self) -> Result<PollOutcome, ProbeError> {
        let url = self.settings.url.as_str();
        let response = self
            .http
            .get(self.settings.url.clone())
            .send()
            .map_err(|e| ProbeError::request(url, &e))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| ProbeError::request(url, &e))?;
        log::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(PollOutcome { status, body })
    }

    /// Runs one cycle: prints the header lines, polls, prints the outcome.
    ///
    /// Moves the client to [`PollState::Terminated`] when the request fails.
    /// Once terminated, no request is sent and nothing is printed.
    pub fn cycle<W: Write>(&mut self, out: &mut W) -> io::Result<Result<PollOutcome, ProbeError>> {
        match self.state {
            PollState::Initializing => self.transition(PollState::Polling),
            PollState::Polling => {}
            PollState::Terminated => {
                return Ok(Err(ProbeError::Other {
                    message: "polling has terminated".to_string(),
                }))
            }
        }

        writeln!(
            out,
            "{} is the expiration date of a server certificate",
            self.expiry
        )?;
        writeln!(
            out,
            "{}: Connecting to a server running on {}",
            utc_now().format("%Y-%m-%d %H:%M:%S"),
            self.settings.url
        )?;

        let result = self.poll_once();
        match &result {
            Ok(outcome) => {
                writeln!(out, "Succeeded to connect a server")?;
                writeln!(out, "{}", outcome.body)?;
            }
            Err(err) => {
                writeln!(out, "Failed to connect a server")?;
                writeln!(out, "{}", err)?;
                self.transition(PollState::Terminated);
            }
        }
        out.flush()?;
        Ok(result)
    }

    /// Polls until a request fails or `max_cycles` is reached.
    ///
    /// `observe` sees every cycle's result before the wait, e.g. to push
    /// metrics.
    pub fn run<W, P, F>(
        &mut self,
        out: &mut W,
        pacer: &mut P,
        mut observe: F,
    ) -> io::Result<RunSummary>
    where
        W: Write,
        P: Pacer,
        F: FnMut(&ExpiryInfo, &Result<PollOutcome, ProbeError>),
    {
        let mut summary = RunSummary {
            cycles: 0,
            succeeded: 0,
            failure: None,
        };

        while self.state != PollState::Terminated {
            let result = self.cycle(out)?;
            summary.cycles += 1;
            observe(&self.expiry, &result);

            match result {
                Ok(_) => summary.succeeded += 1,
                Err(err) => {
                    summary.failure = Some(err);
                    break;
                }
            }

            if let Some(max) = self.settings.max_cycles {
                if summary.cycles >= max {
                    log::info!("stopping after {} cycle(s)", summary.cycles);
                    self.transition(PollState::Terminated);
                    break;
                }
            }

            writeln!(out)?;
            writeln!(
                out,
                "Waiting for {} to connect a server ...",
                describe_interval(self.settings.interval)
            )?;
            out.flush()?;
            pacer.pause(self.settings.interval);
        }

        Ok(summary)
    }

    fn transition(&mut self, next: PollState) {
        log::debug!("state {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Renders the wait interval the way the console notice reads it.
pub fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs > 0 && secs % 60 == 0 {
        format!("{} min", secs / 60)
    } else {
        format!("{} sec", secs)
    }
}
