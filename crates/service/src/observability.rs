use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::errors::ServiceError;

// Prometheus metrics (default registry)
pub static BIND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_bind_total",
        "Bind attempts by result",
        &["result"]
    )
    .expect("register bind_total")
});

pub static UNBIND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_unbind_total",
        "Unbind attempts by result",
        &["result"]
    )
    .expect("register unbind_total")
});

pub static PROVISIONER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_provisioner_requests_total",
        "Calls to remote provisioners by method and outcome",
        &["method", "outcome"]
    )
    .expect("register provisioner_requests_total")
});

pub static BIND_COMPENSATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "broker_bind_compensations_total",
        "Binds rolled back after a late persistence failure"
    )
    .expect("register bind_compensations_total")
});

pub static DEPROVISION_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "broker_deprovision_failures_total",
        "Deprovision calls that failed and left an address granted"
    )
    .expect("register deprovision_failures_total")
});

pub static BIND_RACES_LOST_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "broker_bind_races_lost_total",
        "Binds that provisioned but found the app already recorded by a concurrent bind"
    )
    .expect("register bind_races_lost_total")
});

pub static BIND_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "broker_bind_duration_seconds",
        "Bind duration in seconds, provisioner call included",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("register bind_duration")
});

/// Result label for the bind/unbind counters.
pub fn result_label(res: &Result<(), ServiceError>) -> &'static str {
    match res {
        Ok(()) => "ok",
        Err(ServiceError::Conflict(_)) => "conflict",
        Err(ServiceError::PreconditionFailed(_)) => "precondition_failed",
        Err(ServiceError::Forbidden(_)) => "forbidden",
        Err(ServiceError::NotFound(_)) => "not_found",
        Err(ServiceError::Validation(_)) => "invalid",
        Err(ServiceError::Failure(_)) => "failure",
    }
}

/// Text exposition of the default registry.
pub fn encode_metrics() -> Result<String, ServiceError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ServiceError::Failure(format!("metrics encode error: {e}")))?;
    String::from_utf8(buffer).map_err(ServiceError::failure)
}
