//! Structured switch telemetry and the decoding of raw page variables into it.

use tracing::trace;

use crate::error::DecodeError;
use crate::script::{ScriptError, ScriptEvaluator, ScriptValue};

/// Columns of a `Stats` row summed into the transmitted counter.
const TX_COLUMNS: [usize; 3] = [1, 2, 3];

/// Columns of a `Stats` row summed into the received counter.
const RX_COLUMNS: [usize; 4] = [6, 7, 8, 10];

/// Switch-wide information from one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemData {
    pub max_port: usize,
    pub model_name: String,
    pub firmware_version: String,
    pub ip_address: String,
    pub mac_address: String,
    /// Global loop-detection state as reported by the switch.
    pub loop_status: String,
    /// Configured 802.1Q VLAN ids, in device order.
    pub vlan_ids: Vec<String>,
}

/// Traffic counters for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortStats {
    pub rx: f64,
    pub tx: f64,
}

/// State of one physical port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortData {
    /// Display name, `"port 1"` for the first port.
    pub name: String,
    pub loop_status: String,
    pub link_status: String,
    pub speed_mbps: i64,
    pub speed_unit: String,
    /// Empty when the firmware does not report duplex.
    pub duplex: String,
    pub stats: PortStats,
    /// Untagged VLAN of the port, `"0"` when none is assigned.
    pub pvlan: String,
    pub tagged_vlans: Vec<String>,
}

/// Everything one scrape produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub system: SystemData,
    pub ports: Vec<PortData>,
}

/// Page variables exactly as the switch reported them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTelemetry {
    pub max_port: i64,
    pub model_name: String,
    pub firmware_version: String,
    pub ip_address: String,
    pub mac_address: String,
    pub loop_state: String,
    pub loop_status: Vec<String>,
    pub port_status: Vec<String>,
    pub speed: Vec<String>,
    pub stats: Vec<Vec<ScriptValue>>,
    /// Rows of `[id, membership mask, tagged mask]`.
    pub vlans: Vec<Vec<String>>,
}

impl RawTelemetry {
    /// Read all variables defined by the three data pages.
    pub fn read(vm: &ScriptEvaluator) -> Result<Self, ScriptError> {
        Ok(Self {
            max_port: vm.get_int("Max_port")?,
            model_name: vm.get_string("model_name")?,
            firmware_version: vm.get_string("sys_fmw_ver")?,
            ip_address: vm.get_string("sys_IP")?,
            mac_address: vm.get_string("sys_MAC")?,
            loop_state: vm.get_string("loop")?,
            loop_status: vm.get_string_array("loop_status")?,
            port_status: vm.get_string_array("portstatus")?,
            speed: vm.get_string_array("speed")?,
            stats: vm.get_mixed_matrix("Stats")?,
            vlans: vm.get_string_matrix("qvlans")?,
        })
    }

    /// Build the structured snapshot.
    ///
    /// Fails on the first inconsistency; no partial port list is produced.
    pub fn decode(self) -> Result<Snapshot, DecodeError> {
        let max_port = usize::try_from(self.max_port)
            .map_err(|_| DecodeError::NegativePortCount(self.max_port))?;

        let vlans = self
            .vlans
            .iter()
            .enumerate()
            .map(|(row, columns)| VlanRow::parse(row, columns))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ports = Vec::with_capacity(max_port);
        for index in 0..max_port {
            let name = format!("port {}", index + 1);
            let (pvlan, tagged_vlans) = port_vlans(&vlans, index);
            let (speed_mbps, speed_unit, duplex) =
                parse_speed(element(&self.speed, index, "speed")?);
            let stats = port_stats(&name, element(&self.stats, index, "Stats")?)?;

            trace!(port = %name, pvlan = %pvlan, tagged = tagged_vlans.len(), "decoded port");

            ports.push(PortData {
                loop_status: element(&self.loop_status, index, "loop_status")?.clone(),
                link_status: element(&self.port_status, index, "portstatus")?.clone(),
                name,
                speed_mbps,
                speed_unit,
                duplex,
                stats,
                pvlan,
                tagged_vlans,
            });
        }

        let system = SystemData {
            max_port,
            model_name: self.model_name,
            firmware_version: self.firmware_version,
            ip_address: self.ip_address,
            mac_address: self.mac_address,
            loop_status: self.loop_state,
            vlan_ids: vlans.into_iter().map(|v| v.id).collect(),
        };

        Ok(Snapshot { system, ports })
    }
}

/// One configured VLAN with its port bitmasks decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanRow {
    pub id: String,
    /// Bit `i` set when the VLAN applies to port `i`.
    pub members: u64,
    /// Bit `i` set when port `i` carries the VLAN tagged.
    pub tagged: u64,
}

impl VlanRow {
    /// Parse a `[id, membership mask, tagged mask]` row.
    pub fn parse(row: usize, columns: &[String]) -> Result<Self, DecodeError> {
        let what = format!("qvlans row {row}");
        let id = element(columns, 0, &what)?.clone();
        let members = parse_mask(&id, element(columns, 1, &what)?)?;
        let tagged = parse_mask(&id, element(columns, 2, &what)?)?;
        Ok(Self {
            id,
            members,
            tagged,
        })
    }

    pub fn is_member(&self, port: usize) -> bool {
        bit_set(self.members, port)
    }

    pub fn is_tagged(&self, port: usize) -> bool {
        bit_set(self.tagged, port)
    }
}

fn bit_set(mask: u64, bit: usize) -> bool {
    u32::try_from(bit)
        .ok()
        .and_then(|bit| mask.checked_shr(bit))
        .is_some_and(|shifted| shifted & 1 == 1)
}

/// Parse a hexadecimal port mask with an optional `0x` prefix.
pub fn parse_mask(vlan: &str, value: &str) -> Result<u64, DecodeError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidMask {
        vlan: vlan.to_string(),
        value: value.to_string(),
    })
}

/// Resolve the untagged VLAN and the tagged VLAN list of one port.
///
/// When several VLANs claim the port untagged, the last one wins.
pub fn port_vlans(vlans: &[VlanRow], port: usize) -> (String, Vec<String>) {
    let mut pvlan = "0".to_string();
    let mut tagged = Vec::new();

    for vlan in vlans.iter().filter(|v| v.is_member(port)) {
        if vlan.is_tagged(port) {
            tagged.push(vlan.id.clone());
        } else {
            pvlan = vlan.id.clone();
        }
    }

    (pvlan, tagged)
}

/// Split a speed field such as `"1000 Mbps Full"` into speed, unit and duplex.
///
/// Ports without link may report a non-numeric speed; those decode as 0.
pub fn parse_speed(field: &str) -> (i64, String, String) {
    let mut parts = field.split_whitespace();
    let speed = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let unit = parts.next().unwrap_or_default().to_string();
    let duplex = parts.next().unwrap_or_default().to_string();
    (speed, unit, duplex)
}

/// Sum the transmit and receive columns of a `Stats` row.
pub fn port_stats(port: &str, row: &[ScriptValue]) -> Result<PortStats, DecodeError> {
    let what = format!("Stats row of {port}");
    let sum = |columns: &[usize]| -> Result<f64, DecodeError> {
        columns.iter().try_fold(0.0, |total, &column| {
            element(row, column, &what)?
                .as_f64()
                .map(|v| total + v)
                .ok_or_else(|| DecodeError::NonNumericStat {
                    port: port.to_string(),
                    column,
                })
        })
    };

    Ok(PortStats {
        tx: sum(&TX_COLUMNS)?,
        rx: sum(&RX_COLUMNS)?,
    })
}

fn element<'a, T>(items: &'a [T], index: usize, what: &str) -> Result<&'a T, DecodeError> {
    items.get(index).ok_or_else(|| DecodeError::IndexOutOfRange {
        what: what.to_string(),
        index,
        len: items.len(),
    })
}
