//! Integration tests for the exporter.
//!
//! A wiremock server stands in for the switch's web interface; the tests
//! verify the flow from a scrape request to the rendered exposition.

use std::sync::Arc;
use std::time::Duration;

use gs1200_client::TelemetryCollector;
use gs1200_exporter::config::PrometheusConfig;
use gs1200_exporter::{HttpServer, ScrapeCollector, SharedCollector};
use secrecy::SecretString;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SYSTEM_DATA: &str = include_str!("../../gs1200-client/tests/samples/system_data.js");
const LINK_DATA: &str = include_str!("../../gs1200-client/tests/samples/link_data.js");
const VLAN_DATA: &str = include_str!("../../gs1200-client/tests/samples/VLAN_1Q_List_data.js");

/// Mount a switch that serves the sample pages and accepts any login.
async fn start_device() -> MockServer {
    let server = MockServer::start().await;

    for (page, body) in [
        ("/system_data.js", SYSTEM_DATA),
        ("/link_data.js", LINK_DATA),
        ("/VLAN_1Q_List_data.js", VLAN_DATA),
    ] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/logout.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bye</html>"))
        .mount(&server)
        .await;

    server
}

fn create_collector(device: &MockServer) -> SharedCollector {
    let telemetry = TelemetryCollector::new(
        &device.uri(),
        SecretString::from("OFcVQl1shaUM".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    Arc::new(ScrapeCollector::new(telemetry, PrometheusConfig::default()))
}

/// Value of the sample line that starts with `series`.
fn sample_value(output: &str, series: &str) -> Option<f64> {
    output
        .lines()
        .find(|l| l.starts_with(series))
        .and_then(|l| l.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

#[tokio::test]
async fn test_scrape_renders_device_metrics() {
    let device = start_device().await;
    let collector = create_collector(&device);

    let output = collector.scrape().await;

    assert!(output.contains(
        r#"gs1200_num_ports{model="GS1200-8",firmware="V2.00(ABME.1)C0",ip="192.168.1.3",mac="BC:CF:4F:12:34:56",loop="Enable"} 8"#
    ));
    assert!(output.contains(r#"gs1200_num_vlans{vlans="1,100"} 2"#));
    assert!(output.contains(
        r#"gs1200_speed{port="port 1",status="Up",loop="Normal",pvlan="1",vlans="100",unit="Mbps",duplex="Full"} 1000"#
    ));
    assert!(output.contains(
        r#"gs1200_speed{port="port 8",status="Up",loop="Blocking",pvlan="100",vlans="",unit="Mbps",duplex=""} 1000"#
    ));
    assert_eq!(
        sample_value(&output, r#"gs1200_packets_tx{port="port 5"}"#),
        Some(1006.0)
    );
    assert_eq!(
        sample_value(&output, r#"gs1200_packets_rx{port="port 8"}"#),
        Some(1000.0)
    );

    let speed_lines = output
        .lines()
        .filter(|l| l.starts_with("gs1200_speed{"))
        .count();
    assert_eq!(speed_lines, 8);

    assert_eq!(sample_value(&output, "gs1200_up "), Some(1.0));
    assert_eq!(
        sample_value(&output, "gs1200_exporter_scrapes_total "),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_failed_scrape_emits_no_device_metrics() {
    let device = start_device().await;
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<script>alert('Incorrect password, please try again.');</script>"),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&device)
        .await;
    let collector = create_collector(&device);

    let failed = collector.scrape().await;
    assert_eq!(sample_value(&failed, "gs1200_up "), Some(0.0));
    assert!(!failed.contains("gs1200_speed"));
    assert!(!failed.contains("gs1200_num_ports"));

    // The next scrape starts again from login.
    let recovered = collector.scrape().await;
    assert_eq!(sample_value(&recovered, "gs1200_up "), Some(1.0));
    assert_eq!(
        sample_value(&recovered, "gs1200_exporter_scrapes_total "),
        Some(2.0)
    );
    assert_eq!(
        sample_value(&recovered, "gs1200_exporter_scrape_failures_total "),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_concurrent_scrapes_are_serialised() {
    let device = start_device().await;
    let collector = create_collector(&device);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let collector = collector.clone();
            tokio::spawn(async move { collector.scrape().await })
        })
        .collect();

    let mut totals = Vec::new();
    for handle in handles {
        let output = handle.await.unwrap();
        assert_eq!(sample_value(&output, "gs1200_up "), Some(1.0));
        totals.extend(sample_value(&output, "gs1200_exporter_scrapes_total "));
        assert_eq!(
            output
                .lines()
                .filter(|l| l.starts_with("gs1200_packets_rx{"))
                .count(),
            8
        );
    }

    // Every response reports the counters of its own scrape.
    totals.sort_by(f64::total_cmp);
    assert_eq!(totals, [1.0, 2.0, 3.0, 4.0]);

    let requests = device.received_requests().await.unwrap();
    let logins = requests
        .iter()
        .filter(|r| r.url.path() == "/login.cgi")
        .count();
    let logouts = requests
        .iter()
        .filter(|r| r.url.path() == "/logout.html")
        .count();
    assert_eq!(logins, 4);
    assert_eq!(logouts, 4);

    // Each login is followed by its logout before the next login.
    let sequence: Vec<_> = requests
        .iter()
        .map(|r| r.url.path())
        .filter(|p| *p == "/login.cgi" || *p == "/logout.html")
        .collect();
    for pair in sequence.chunks(2) {
        assert_eq!(pair, ["/login.cgi", "/logout.html"]);
    }
}

#[tokio::test]
async fn test_http_server_end_to_end() {
    let device = start_device().await;
    let collector = create_collector(&device);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HttpServer::new(collector, "/metrics".to_string());
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let response = client.get(format!("{base}/ready")).send().await.unwrap();
    assert_eq!(response.status(), 503);

    let response = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let body = response.text().await.unwrap();
    assert_eq!(sample_value(&body, "gs1200_up "), Some(1.0));
    assert!(body.contains("# TYPE gs1200_packets_tx counter"));

    let response = client.get(format!("{base}/ready")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
