//! Integration tests for a full scrape against a simulated switch.

use std::time::Duration;

use secrecy::SecretString;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use gs1200_client::{AuthFailure, CollectError, PortStats, TelemetryCollector};

const SYSTEM_DATA: &str = include_str!("samples/system_data.js");
const LINK_DATA: &str = include_str!("samples/link_data.js");
const VLAN_DATA: &str = include_str!("samples/VLAN_1Q_List_data.js");

const PASSWORD: &str = "OFcVQl1shaUM";
const WRONG_PASSWORD_PAGE: &str =
    "<html><script>alert('Incorrect password, please try again.');</script></html>";

/// Accepts a login form whose password decodes to the expected value.
struct PasswordForm {
    expected: &'static str,
    obfuscated: bool,
}

impl Match for PasswordForm {
    fn matches(&self, request: &Request) -> bool {
        let Some(submitted) = url::form_urlencoded::parse(&request.body)
            .find(|(key, _)| key == "password")
            .map(|(_, value)| value.into_owned())
        else {
            return false;
        };

        let revealed = if self.obfuscated {
            let chars: Vec<char> = submitted.chars().collect();
            let shift = (chars.len() / 2) as u32;
            chars
                .iter()
                .skip(1)
                .step_by(2)
                .filter_map(|c| char::from_u32(u32::from(*c) + shift))
                .collect()
        } else {
            submitted
        };
        revealed == self.expected
    }
}

fn collector(server: &MockServer, password: &str) -> TelemetryCollector {
    TelemetryCollector::new(
        &server.uri(),
        SecretString::from(password.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn mount_page(server: &MockServer, page: &str, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{page}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer, obfuscated: bool) {
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .and(PasswordForm {
            expected: PASSWORD,
            obfuscated,
        })
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Welcome</html>"))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WRONG_PASSWORD_PAGE))
        .mount(server)
        .await;
}

async fn mount_logout(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/logout.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Bye</html>"))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collect_full_snapshot() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 1).await;
    mount_page(&server, "VLAN_1Q_List_data.js", VLAN_DATA, 1).await;
    mount_login(&server, true).await;
    mount_logout(&server, 1).await;

    let snapshot = collector(&server, PASSWORD).collect().await.unwrap();

    let system = &snapshot.system;
    assert_eq!(system.max_port, 8);
    assert_eq!(system.model_name, "GS1200-8");
    assert_eq!(system.firmware_version, "V2.00(ABME.1)C0");
    assert_eq!(system.ip_address, "192.168.1.3");
    assert_eq!(system.mac_address, "BC:CF:4F:12:34:56");
    assert_eq!(system.loop_status, "Enable");
    assert_eq!(system.vlan_ids, vec!["1", "100"]);

    let ports = &snapshot.ports;
    assert_eq!(ports.len(), 8);

    assert_eq!(ports[0].name, "port 1");
    assert_eq!(ports[0].link_status, "Up");
    assert_eq!(ports[0].loop_status, "Normal");
    assert_eq!(ports[0].speed_mbps, 1000);
    assert_eq!(ports[0].speed_unit, "Mbps");
    assert_eq!(ports[0].duplex, "Full");
    assert_eq!(ports[0].pvlan, "1");
    assert_eq!(ports[0].tagged_vlans, vec!["100"]);
    assert_eq!(ports[0].stats, PortStats { tx: 60.0, rx: 220.0 });

    assert_eq!(ports[1].link_status, "Down");
    assert_eq!(ports[1].speed_mbps, 0);
    assert_eq!(ports[1].pvlan, "1");
    assert!(ports[1].tagged_vlans.is_empty());
    assert_eq!(ports[1].stats, PortStats::default());

    assert_eq!(ports[4].speed_mbps, 100);
    assert_eq!(ports[4].duplex, "Half");
    assert_eq!(ports[4].stats, PortStats {
        tx: 1006.0,
        rx: 2008.0
    });

    assert_eq!(ports[7].name, "port 8");
    assert_eq!(ports[7].loop_status, "Blocking");
    assert_eq!(ports[7].duplex, "");
    assert_eq!(ports[7].pvlan, "100");
    assert!(ports[7].tagged_vlans.is_empty());
    assert_eq!(ports[7].stats, PortStats {
        tx: 24.0,
        rx: 1000.0
    });
}

#[tokio::test]
async fn test_old_firmware_submits_plain_password() {
    let server = MockServer::start().await;
    let system = SYSTEM_DATA.replace("V2.00(ABME.1)C0", "V1.00(AAGM.0)C0");
    mount_page(&server, "system_data.js", &system, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 1).await;
    mount_page(&server, "VLAN_1Q_List_data.js", VLAN_DATA, 1).await;
    mount_login(&server, false).await;
    mount_logout(&server, 1).await;

    let snapshot = collector(&server, PASSWORD).collect().await.unwrap();
    assert_eq!(snapshot.system.firmware_version, "V1.00(AAGM.0)C0");
}

#[tokio::test]
async fn test_wrong_password() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 0).await;
    mount_login(&server, true).await;
    mount_logout(&server, 1).await;

    let result = collector(&server, "Niovei4uR2ao").collect().await;

    assert!(
        matches!(result, Err(CollectError::Auth(AuthFailure::WrongPassword))),
        "expected wrong password, got: {result:?}"
    );
}

#[tokio::test]
async fn test_already_logged_in() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>Another user is already logged in.</html>"),
        )
        .mount(&server)
        .await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(matches!(
        result,
        Err(CollectError::Auth(AuthFailure::AlreadyLoggedIn))
    ));
}

#[tokio::test]
async fn test_login_http_error_is_transport_error() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(matches!(result, Err(CollectError::Transport(_))));
}

#[tokio::test]
async fn test_missing_page_logs_out_once() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_login(&server, true).await;
    Mock::given(method("GET"))
        .and(path("/link_data.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page(&server, "VLAN_1Q_List_data.js", VLAN_DATA, 0).await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    match result {
        Err(CollectError::Fetch { path, reason }) => {
            assert_eq!(path, "link_data.js");
            assert!(reason.contains("404"));
        }
        other => panic!("expected fetch error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_html_page_instead_of_script() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_login(&server, true).await;
    mount_page(
        &server,
        "link_data.js",
        "<html><body>Please log in</body></html>",
        1,
    )
    .await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(matches!(result, Err(CollectError::Fetch { .. })));
}

#[tokio::test]
async fn test_parse_error_on_vlan_page_logs_out_once() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 1).await;
    mount_page(&server, "VLAN_1Q_List_data.js", "var qvlans = [['1','0x7f'", 1).await;
    mount_login(&server, true).await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(
        matches!(result, Err(CollectError::Parse(_))),
        "expected parse error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_missing_variable_is_parse_error() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 1).await;
    mount_page(&server, "VLAN_1Q_List_data.js", "var port_nums = 8;", 1).await;
    mount_login(&server, true).await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(matches!(
        result,
        Err(CollectError::Parse(gs1200_client::ScriptError::Missing { .. }))
    ));
}

#[tokio::test]
async fn test_port_count_beyond_data_is_decode_error() {
    let server = MockServer::start().await;
    let system = SYSTEM_DATA.replace("Max_port = 8", "Max_port = 10");
    mount_page(&server, "system_data.js", &system, 1).await;
    mount_page(&server, "link_data.js", LINK_DATA, 1).await;
    mount_page(&server, "VLAN_1Q_List_data.js", VLAN_DATA, 1).await;
    mount_login(&server, true).await;
    mount_logout(&server, 1).await;

    let result = collector(&server, PASSWORD).collect().await;

    assert!(matches!(result, Err(CollectError::Decode(_))));
}

#[tokio::test]
async fn test_consecutive_scrapes_start_from_login() {
    let server = MockServer::start().await;
    mount_page(&server, "system_data.js", SYSTEM_DATA, 2).await;
    mount_page(&server, "link_data.js", LINK_DATA, 2).await;
    mount_page(&server, "VLAN_1Q_List_data.js", VLAN_DATA, 2).await;
    mount_login(&server, true).await;
    mount_logout(&server, 2).await;

    let collector = collector(&server, PASSWORD);
    let first = collector.collect().await.unwrap();
    let second = collector.collect().await.unwrap();

    assert_eq!(first, second);
}
