//! Mapping from a switch [`Snapshot`] to Prometheus metric families.

use std::collections::HashMap;

use gs1200_client::Snapshot;

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`. Invalid
/// characters become underscores, runs of underscores collapse into one and a
/// leading digit gets an underscore prefix.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        result.push('_');
        last_was_underscore = true;
    }

    for c in name.chars() {
        if c == '_' || !(c.is_ascii_alphanumeric() || c == ':') {
            if !last_was_underscore {
                result.push('_');
                last_was_underscore = true;
            }
        } else {
            result.push(c);
            last_was_underscore = false;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        return "label".to_string();
    }

    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Build a full Prometheus metric name: `{prefix}_{metric}`.
pub fn build_metric_name(prefix: &str, metric: &str) -> String {
    if prefix.is_empty() {
        sanitize_metric_name(metric)
    } else {
        sanitize_metric_name(&format!("{prefix}_{metric}"))
    }
}

/// Prometheus metric type of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrometheusType {
    Counter,
    Gauge,
}

impl PrometheusType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrometheusType::Counter => "counter",
            PrometheusType::Gauge => "gauge",
        }
    }
}

/// One labelled value of a family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// All series sharing one metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: &'static str,
    pub metric_type: PrometheusType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    fn new(prefix: &str, metric: &str, help: &'static str, metric_type: PrometheusType) -> Self {
        Self {
            name: build_metric_name(prefix, metric),
            help,
            metric_type,
            samples: Vec::new(),
        }
    }
}

/// Builds label sets, appending the configured default labels.
struct LabelSet<'a> {
    defaults: Vec<(String, &'a str)>,
}

impl<'a> LabelSet<'a> {
    fn new(default_labels: &'a HashMap<String, String>) -> Self {
        let mut defaults: Vec<_> = default_labels
            .iter()
            .map(|(k, v)| (sanitize_label_name(k), v.as_str()))
            .collect();
        defaults.sort();
        Self { defaults }
    }

    fn build(&self, labels: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut result: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        // Device labels win over configured ones with the same name.
        for (k, v) in &self.defaults {
            if !result.iter().any(|(lk, _)| lk == k) {
                result.push((k.clone(), v.to_string()));
            }
        }
        result
    }
}

/// Map one scrape onto the device metric families.
pub fn snapshot_families(
    snapshot: &Snapshot,
    prefix: &str,
    default_labels: &HashMap<String, String>,
) -> Vec<MetricFamily> {
    let labels = LabelSet::new(default_labels);
    let system = &snapshot.system;

    let mut num_ports = MetricFamily::new(
        prefix,
        "num_ports",
        "Number of ports. Mainly a placeholder for system information.",
        PrometheusType::Gauge,
    );
    num_ports.samples.push(Sample {
        labels: labels.build(&[
            ("model", system.model_name.as_str()),
            ("firmware", system.firmware_version.as_str()),
            ("ip", system.ip_address.as_str()),
            ("mac", system.mac_address.as_str()),
            ("loop", system.loop_status.as_str()),
        ]),
        value: system.max_port as f64,
    });

    let mut num_vlans = MetricFamily::new(
        prefix,
        "num_vlans",
        "Number of configured vlans.",
        PrometheusType::Gauge,
    );
    num_vlans.samples.push(Sample {
        labels: labels.build(&[("vlans", system.vlan_ids.join(",").as_str())]),
        value: system.vlan_ids.len() as f64,
    });

    let mut speed = MetricFamily::new(prefix, "speed", "Port speed.", PrometheusType::Gauge);
    let mut tx = MetricFamily::new(
        prefix,
        "packets_tx",
        "Number of packets transmitted.",
        PrometheusType::Counter,
    );
    let mut rx = MetricFamily::new(
        prefix,
        "packets_rx",
        "Number of packets received.",
        PrometheusType::Counter,
    );

    for port in &snapshot.ports {
        speed.samples.push(Sample {
            labels: labels.build(&[
                ("port", port.name.as_str()),
                ("status", port.link_status.as_str()),
                ("loop", port.loop_status.as_str()),
                ("pvlan", port.pvlan.as_str()),
                ("vlans", port.tagged_vlans.join(",").as_str()),
                ("unit", port.speed_unit.as_str()),
                ("duplex", port.duplex.as_str()),
            ]),
            value: port.speed_mbps as f64,
        });
        tx.samples.push(Sample {
            labels: labels.build(&[("port", port.name.as_str())]),
            value: port.stats.tx,
        });
        rx.samples.push(Sample {
            labels: labels.build(&[("port", port.name.as_str())]),
            value: port.stats.rx,
        });
    }

    vec![num_ports, num_vlans, speed, tx, rx]
}
