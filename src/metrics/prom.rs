use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};
use std::collections::HashMap;

use chrono::NaiveDateTime;
use mtlsprobe::{utc_now, ExpiryInfo, PollOutcome, ProbeError};

lazy_static! {
    static ref MTLSPROBE_DAYS_BEFORE_EXPIRED: Gauge = register_gauge!(
        "mtlsprobe_days_before_expired",
        "days before the server certificate expires"
    )
    .unwrap();
    static ref MTLSPROBE_EXPIRED: Gauge = register_gauge!(
        "mtlsprobe_expired",
        "1 if the server certificate has expired, 0 otherwise"
    )
    .unwrap();
    static ref MTLSPROBE_UP: Gauge =
        register_gauge!("mtlsprobe_up", "1 if the last poll succeeded, 0 otherwise").unwrap();
    static ref MTLSPROBE_HTTP_STATUS: Gauge = register_gauge!(
        "mtlsprobe_http_status",
        "HTTP status of the last poll, 0 if the request failed"
    )
    .unwrap();
    static ref MTLSPROBE_LAST_POLL_TIMESTAMP: Gauge = register_gauge!(
        "mtlsprobe_last_poll_timestamp_seconds",
        "unix time of the last poll"
    )
    .unwrap();
}

/// Grouping key of every push; only labels that stay the same across cycles,
/// so each push replaces the previous one on the gateway.
fn grouping(target: &str) -> HashMap<String, String> {
    labels! {
        "instance".to_owned() => "mtlsprobe".to_owned(),
        "target".to_owned() => target.to_owned(),
    }
}

fn record(expiry: &ExpiryInfo, result: &Result<PollOutcome, ProbeError>, now: NaiveDateTime) {
    MTLSPROBE_DAYS_BEFORE_EXPIRED.set(expiry.days_remaining(now) as f64);
    MTLSPROBE_EXPIRED.set(if expiry.is_expired(now) { 1.0 } else { 0.0 });
    match result {
        Ok(outcome) => {
            MTLSPROBE_UP.set(1.0);
            MTLSPROBE_HTTP_STATUS.set(f64::from(outcome.status));
        }
        Err(_) => {
            MTLSPROBE_UP.set(0.0);
            MTLSPROBE_HTTP_STATUS.set(0.0);
        }
    }
    MTLSPROBE_LAST_POLL_TIMESTAMP.set(now.and_utc().timestamp() as f64);
}

/// Function to push the result of one poll cycle to prometheus
/// # Arguments
/// * `target` - Polled `host:port`, used as a grouping label
/// * `expiry` - Expiry of the server certificate
/// * `result` - Outcome of the cycle
/// * `prometheus_address` - Push gateway address
pub fn prometheus_metrics(
    target: &str,
    expiry: &ExpiryInfo,
    result: &Result<PollOutcome, ProbeError>,
    prometheus_address: &str,
) {
    record(expiry, result, utc_now());

    let metric_families = prometheus::gather();
    let prometheus_client = prometheus::push_metrics(
        "mtlsprobe",
        grouping(target),
        prometheus_address,
        metric_families,
        None,
    );

    if let Err(e) = prometheus_client {
        log::warn!("Failed to push metrics to prometheus: {}", e);
    }
}
