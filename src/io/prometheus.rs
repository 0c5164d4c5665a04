//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine counters in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Scrapes read monotonic snapshots
//! only, so they never disturb the periodic logged report.

use crate::infra::metrics::{Metrics, MetricsSnapshot};
use crate::services::store::{StoreCounts, TelemetryStore};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(
    snapshot: &MetricsSnapshot,
    counts: &StoreCounts,
    site: &str,
) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "firewatch_cycles_total",
        "Total poll cycles completed",
        MetricType::Counter,
        site,
        snapshot.cycles_total,
    );
    write_metric(
        &mut output,
        "firewatch_fetch_errors_total",
        "Upstream fetches that failed",
        MetricType::Counter,
        site,
        snapshot.fetch_errors_total,
    );
    write_metric(
        &mut output,
        "firewatch_records_normalized_total",
        "Records normalized into canonical form",
        MetricType::Counter,
        site,
        snapshot.records_normalized_total,
    );
    write_metric(
        &mut output,
        "firewatch_records_dropped_total",
        "Payload elements dropped during normalization",
        MetricType::Counter,
        site,
        snapshot.records_dropped_total,
    );
    write_metric(
        &mut output,
        "firewatch_alerts_created_total",
        "Alert rows created",
        MetricType::Counter,
        site,
        snapshot.alerts_created_total,
    );
    write_metric(
        &mut output,
        "firewatch_alerts_deduped_total",
        "Alert inserts suppressed by the dedup window",
        MetricType::Counter,
        site,
        snapshot.alerts_deduped_total,
    );
    write_metric(
        &mut output,
        "firewatch_alerts_pruned_total",
        "Alert rows removed by the retention sweep",
        MetricType::Counter,
        site,
        snapshot.alerts_pruned_total,
    );
    write_metric(
        &mut output,
        "firewatch_firefighters",
        "Known firefighters",
        MetricType::Gauge,
        site,
        counts.firefighters as u64,
    );
    write_metric(
        &mut output,
        "firewatch_beacons",
        "Known beacons",
        MetricType::Gauge,
        site,
        counts.beacons as u64,
    );
    write_metric(
        &mut output,
        "firewatch_beacons_online",
        "Beacons currently online",
        MetricType::Gauge,
        site,
        counts.beacons_online as u64,
    );
    write_metric(
        &mut output,
        "firewatch_alerts",
        "Alert rows currently retained",
        MetricType::Gauge,
        site,
        counts.alerts as u64,
    );
    write_metric(
        &mut output,
        "firewatch_position_rows",
        "Position history rows held in memory",
        MetricType::Gauge,
        site,
        counts.positions as u64,
    );
    write_metric(
        &mut output,
        "firewatch_vitals_rows",
        "Vitals history rows held in memory",
        MetricType::Gauge,
        site,
        counts.vitals as u64,
    );

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    store: Arc<TelemetryStore>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body =
                format_prometheus_metrics(&metrics.snapshot(), &store.counts(), &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    store: Arc<TelemetryStore>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let store = store.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let store = store.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, store, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
