//! Telemetry logic.
//! Support tracing and metrics.
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use metrics::{Unit, gauge};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle,
};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{Span, TraceError, Tracer};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::time::sleep;

const SERVICE_NAME: &str = "treino";

/// Create tracer exporting spans over OTLP.
pub fn setup_tracer() -> Result<SdkTracerProvider, TraceError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    metrics::describe_gauge!(
        "process_cpu_usage",
        Unit::Percent,
        "CPU usage of the process in percentage."
    );
    metrics::describe_gauge!(
        "process_memory_used_bytes",
        Unit::Bytes,
        "Total process memory in bytes."
    );
    metrics::describe_counter!(
        "account_login_total",
        Unit::Count,
        "Login attempts by outcome."
    );
    metrics::describe_counter!(
        "account_requests_total",
        Unit::Count,
        "Account requests by flow and outcome."
    );
    metrics::describe_counter!(
        "account_lockouts_total",
        Unit::Count,
        "Accounts locked after too many failed logins."
    );

    let mut system = System::new_with_specifics(RefreshKind::nothing());
    let pid = Pid::from_u32(std::process::id());

    // Refresh process usage every 10 seconds.
    tokio::spawn(async move {
        loop {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );

            if let Some(process) = system.process(pid) {
                gauge!("process_memory_used_bytes").set(process.memory() as f64);
                gauge!("process_cpu_usage").set(process.cpu_usage() as f64);
            }

            sleep(Duration::from_secs(10)).await;
        }
    });

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Account flow served by a route, used as a metric label.
fn flow(path: &str) -> &'static str {
    let Some(route) = path.strip_prefix("/api/users") else {
        return "service";
    };

    match route {
        "/login" => "login",
        "/register" => "register",
        "/@me" => "profile",
        route if route.starts_with("/password/reset") => "password_reset",
        route if route.starts_with("/activate") => "activation",
        route if route.ends_with("/lockout") => "operator_lockout",
        _ => "unknown",
    }
}

fn outcome(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        "failure"
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        "denied"
    } else if status.is_client_error() {
        "rejected"
    } else {
        "success"
    }
}

/// Span, request counter, latency histogram and per-flow outcome counter.
pub async fn track(req: Request, next: Next) -> impl IntoResponse {
    let mut otel_span = global::tracer("treino-http").start("account-request");

    let start = Instant::now();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |path| path.as_str().to_owned());
    let flow = flow(&path);
    let method = req.method().to_string();
    let version = format!("{:?}", req.version());

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let outcome = outcome(response.status());
    let status = response.status().as_u16().to_string();

    otel_span.set_attributes([
        KeyValue::new("http.version", version),
        KeyValue::new("http.route", path.clone()),
        KeyValue::new("http.method", method.clone()),
        KeyValue::new("http.status", status.clone()),
        KeyValue::new("account.flow", flow),
        KeyValue::new("account.outcome", outcome),
    ]);

    let labels = [
        ("method", method),
        ("path", path),
        ("status", status),
        ("flow", flow.to_owned()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);
    metrics::counter!("account_requests_total", "flow" => flow, "outcome" => outcome)
        .increment(1);

    otel_span.end();

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_labels() {
        assert_eq!(flow("/api/users/login"), "login");
        assert_eq!(flow("/api/users/register"), "register");
        assert_eq!(flow("/api/users/@me"), "profile");
        assert_eq!(flow("/api/users/password/reset"), "password_reset");
        assert_eq!(flow("/api/users/password/reset/{token}"), "password_reset");
        assert_eq!(flow("/api/users/activate/{token}"), "activation");
        assert_eq!(flow("/api/users/{id}/lockout"), "operator_lockout");
        assert_eq!(flow("/api/users/nope"), "unknown");
        assert_eq!(flow("/status.json"), "service");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(StatusCode::OK), "success");
        assert_eq!(outcome(StatusCode::CREATED), "success");
        assert_eq!(outcome(StatusCode::UNAUTHORIZED), "denied");
        assert_eq!(outcome(StatusCode::FORBIDDEN), "denied");
        assert_eq!(outcome(StatusCode::BAD_REQUEST), "rejected");
        assert_eq!(outcome(StatusCode::SERVICE_UNAVAILABLE), "failure");
    }
}
