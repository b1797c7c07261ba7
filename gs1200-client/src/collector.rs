//! Drives one complete scrape of the switch.

use std::time::{Duration, Instant};

use secrecy::SecretString;
use tracing::{debug, info};

use crate::error::Result;
use crate::script::ScriptEvaluator;
use crate::session::SessionClient;
use crate::telemetry::{RawTelemetry, Snapshot};

pub const SYSTEM_PAGE: &str = "system_data.js";
pub const LINK_PAGE: &str = "link_data.js";
pub const VLAN_PAGE: &str = "VLAN_1Q_List_data.js";

/// Collects telemetry from one switch.
///
/// Each [`collect`](Self::collect) call evaluates the pages in a fresh
/// [`ScriptEvaluator`]; only the session cookie outlives a scrape. Callers
/// that scrape concurrently must serialise calls, because the switch admits a
/// single session.
pub struct TelemetryCollector {
    session: SessionClient,
}

impl TelemetryCollector {
    /// Create a collector for the switch at `address`.
    pub fn new(address: &str, password: SecretString, request_timeout: Duration) -> Result<Self> {
        Ok(Self::from_session(SessionClient::new(
            address,
            password,
            request_timeout,
        )?))
    }

    pub fn from_session(session: SessionClient) -> Self {
        Self { session }
    }

    /// Log in, read the three data pages, log out and decode them.
    pub async fn collect(&self) -> Result<Snapshot> {
        let started = Instant::now();

        let raw = match self.retrieve().await {
            Ok(raw) => {
                self.session.logout().await;
                raw
            }
            Err(e) => {
                if !e.session_released() {
                    self.session.logout().await;
                }
                return Err(e);
            }
        };

        let snapshot = raw.decode()?;
        info!(
            model = %snapshot.system.model_name,
            ports = snapshot.ports.len(),
            vlans = snapshot.system.vlan_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collected switch telemetry"
        );
        Ok(snapshot)
    }

    async fn retrieve(&self) -> Result<RawTelemetry> {
        let mut vm = ScriptEvaluator::new();

        // The system page is readable without a session and carries the
        // firmware version that decides how the password is submitted.
        self.load_page(&mut vm, SYSTEM_PAGE).await?;
        let firmware = vm.get_string("sys_fmw_ver")?;

        self.session.login(&firmware).await?;
        self.load_page(&mut vm, LINK_PAGE).await?;
        self.load_page(&mut vm, VLAN_PAGE).await?;

        Ok(RawTelemetry::read(&vm)?)
    }

    async fn load_page(&self, vm: &mut ScriptEvaluator, page: &str) -> Result<()> {
        let script = self.session.fetch(page).await?;
        debug!(page, bytes = script.len(), "evaluating page");
        vm.evaluate(&script)?;
        Ok(())
    }
}
