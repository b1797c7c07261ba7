//! Client for the web management interface of Zyxel GS1200 switches.
//!
//! The switch has no API. Its status pages load small scripts that assign the
//! device state to global variables, and this crate reads those scripts:
//!
//! - [`session`] - cookie session handling (login, page fetch, logout)
//! - [`auth`] - firmware-dependent password obfuscation
//! - [`script`] - evaluator for the variable-assignment scripts
//! - [`telemetry`] - the decoded data model and the decoding rules
//! - [`collector`] - one full scrape, from login to decoded [`Snapshot`]
//! - [`error`] - error types

pub mod auth;
pub mod collector;
pub mod error;
pub mod script;
pub mod session;
pub mod telemetry;

pub use collector::TelemetryCollector;
pub use error::{AuthFailure, CollectError, DecodeError, Result};
pub use script::{ScriptError, ScriptEvaluator, ScriptValue};
pub use session::SessionClient;
pub use telemetry::{PortData, PortStats, Snapshot, SystemData};
