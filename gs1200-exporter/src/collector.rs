//! Scrape collector that runs one switch scrape per request and renders it.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gs1200_client::{Snapshot, TelemetryCollector};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::PrometheusConfig;
use crate::mapping::{MetricFamily, build_metric_name, snapshot_families};

/// Scrape statistics.
#[derive(Debug, Clone, Default)]
pub struct ScrapeStats {
    /// Total scrapes attempted.
    pub scrapes_total: u64,
    /// Scrapes that produced device data.
    pub scrapes_succeeded: u64,
    /// Scrapes that failed at any step.
    pub scrape_failures_total: u64,
    /// Duration of the most recent scrape.
    pub last_scrape_duration: Duration,
}

/// Runs switch scrapes and renders them in Prometheus exposition format.
///
/// The switch admits one web session at a time, so scrapes are serialised
/// behind an async mutex.
pub struct ScrapeCollector {
    telemetry: Mutex<TelemetryCollector>,
    prometheus_config: PrometheusConfig,
    stats: RwLock<ScrapeStats>,
}

impl ScrapeCollector {
    /// Create a new scrape collector.
    pub fn new(telemetry: TelemetryCollector, prometheus_config: PrometheusConfig) -> Self {
        Self {
            telemetry: Mutex::new(telemetry),
            prometheus_config,
            stats: RwLock::new(ScrapeStats::default()),
        }
    }

    /// Scrape the switch and render the result.
    ///
    /// A failed scrape renders only the exporter's own series.
    pub async fn scrape(&self) -> String {
        let telemetry = self.telemetry.lock().await;
        let started = Instant::now();
        let result = telemetry.collect().await;
        let elapsed = started.elapsed();

        // Counters are captured under the scrape lock so the response
        // describes this scrape, not one that started after it.
        let stats = {
            let mut stats = self.stats.write();
            stats.scrapes_total += 1;
            stats.last_scrape_duration = elapsed;
            match &result {
                Ok(_) => stats.scrapes_succeeded += 1,
                Err(_) => stats.scrape_failures_total += 1,
            }
            stats.clone()
        };
        drop(telemetry);

        match result {
            Ok(snapshot) => {
                debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Scrape succeeded"
                );
                self.render_with(Some(&snapshot), &stats)
            }
            Err(e) => {
                error!(error = %e, "Collect failed");
                self.render_with(None, &stats)
            }
        }
    }

    /// Get scrape statistics.
    pub fn stats(&self) -> ScrapeStats {
        self.stats.read().clone()
    }

    /// Render a scrape result in Prometheus exposition format.
    pub fn render(&self, snapshot: Option<&Snapshot>) -> String {
        let stats = self.stats();
        self.render_with(snapshot, &stats)
    }

    fn render_with(&self, snapshot: Option<&Snapshot>, stats: &ScrapeStats) -> String {
        let mut output = Vec::with_capacity(4096);

        if let Some(snapshot) = snapshot {
            let families = snapshot_families(
                snapshot,
                &self.prometheus_config.prefix,
                &self.prometheus_config.default_labels,
            );
            for family in &families {
                write_family(&mut output, family);
            }
            writeln!(output).ok();
        }

        let prefix = &self.prometheus_config.prefix;

        let up = build_metric_name(prefix, "up");
        writeln!(output, "# HELP {up} Whether the last scrape of the switch succeeded.").ok();
        writeln!(output, "# TYPE {up} gauge").ok();
        writeln!(output, "{up} {}", u8::from(snapshot.is_some())).ok();

        let scrapes = build_metric_name(prefix, "exporter_scrapes_total");
        writeln!(output, "# TYPE {scrapes} counter").ok();
        writeln!(output, "{scrapes} {}", stats.scrapes_total).ok();

        let failures = build_metric_name(prefix, "exporter_scrape_failures_total");
        writeln!(output, "# TYPE {failures} counter").ok();
        writeln!(output, "{failures} {}", stats.scrape_failures_total).ok();

        let duration = build_metric_name(prefix, "exporter_last_scrape_duration_seconds");
        writeln!(output, "# TYPE {duration} gauge").ok();
        writeln!(
            output,
            "{duration} {}",
            format_value(stats.last_scrape_duration.as_secs_f64())
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<ScrapeCollector>;

fn write_family(output: &mut Vec<u8>, family: &MetricFamily) {
    if family.samples.is_empty() {
        return;
    }

    writeln!(output, "# HELP {} {}", family.name, family.help).ok();
    writeln!(
        output,
        "# TYPE {} {}",
        family.name,
        family.metric_type.as_str()
    )
    .ok();
    for sample in &family.samples {
        writeln!(
            output,
            "{}{} {}",
            family.name,
            format_labels(&sample.labels),
            format_value(sample.value)
        )
        .ok();
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
