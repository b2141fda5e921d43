use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

/// Default UDP port a prop listens on for JSON control datagrams
pub const DEFAULT_CONTROL_PORT: u16 = 8888;

/// Default UDP port the controller listens on for periodic status
pub const DEFAULT_STATUS_PORT: u16 = 5000;

/// The header every control request carries. Action specific fields sit
/// next to these at the top level of the object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub action: String,
    pub command_id: String,
}

/// Acknowledgement sent back to the source of every recognized request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub command_id: String,
    pub result: String,
    /// Milliseconds since the prop booted
    pub timestamp: u64,
    pub device_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReply {
    pub command_id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub device_label: String,
    pub firmware_version: String,
    pub num_leds: usize,
    pub sacn_universe: u16,
}

/// Battery readings folded into status output. Every field is optional
/// since not every prop has a battery.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatteryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_status: Option<String>,
}

/// Sent periodically to the controller, and in reply to `status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Only set when answering a `status` request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    pub device_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub device_label: String,
    pub firmware_version: String,
    pub uptime: u64,
    pub video_playing: bool,
    pub current_video: String,
    pub video_looping: bool,
    pub current_frame: usize,
    pub sacn_enabled: bool,
    pub sacn_active: bool,
    pub sacn_universe: u16,
    /// sACN packets whose sequence number skipped ahead
    pub sacn_sequence_gaps: u64,
    /// sACN packets that repeated the previous sequence number
    pub sacn_duplicates: u64,
    #[serde(flatten)]
    pub battery: BatteryInfo,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatteryReply {
    pub command_id: String,
    pub device_id: String,
    #[serde(flatten)]
    pub battery: BatteryInfo,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Still,
    Animation,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaEntry {
    pub name: String,
    pub kind: MediaKind,
    pub frames: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaListReply {
    pub command_id: String,
    pub device_id: String,
    pub videos: Vec<MediaEntry>,
}
