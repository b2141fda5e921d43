use std::time::Duration;

use common::RequestHeader;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::led::Color;
use crate::{Command, PlaybackRequest};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Missing filename")]
    MissingFilename,
}

/// A control request after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    Discovery,
    /// An LED command plus the acknowledgement text sent once it is queued
    Led {
        command: Command,
        ack: &'static str,
    },
    Video(PlaybackRequest),
    ListMedia,
    Status,
    Battery,
    ToggleSacn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command_id: String,
    pub action: ControlAction,
}

#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// Not a request we answer: bad JSON, no header or an unknown action
    Ignored,
    /// A known action with bad parameters
    Rejected {
        command_id: String,
        error: CommandError,
    },
    Accepted(Request),
}

#[derive(Deserialize)]
struct ColorParams {
    r: u8,
    g: u8,
    b: u8,
    #[serde(default)]
    w: u8,
}

impl From<ColorParams> for Color {
    fn from(p: ColorParams) -> Self {
        Color::rgbw(p.r, p.g, p.b, p.w)
    }
}

#[derive(Deserialize)]
struct BrightnessParams {
    brightness: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndividualParams {
    led_index: usize,
    r: u8,
    g: u8,
    b: u8,
    #[serde(default)]
    w: u8,
}

#[derive(Deserialize)]
struct ArrayParams {
    leds: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
struct ScannerParams {
    #[serde(default = "full")]
    r: u8,
    #[serde(default)]
    g: u8,
    #[serde(default)]
    b: u8,
    #[serde(default = "scanner_delay")]
    delay: u64,
}

#[derive(Deserialize)]
struct PulseParams {
    #[serde(default = "full")]
    r: u8,
    #[serde(default = "full")]
    g: u8,
    #[serde(default = "full")]
    b: u8,
    #[serde(default = "pulse_duration")]
    duration: u64,
}

#[derive(Deserialize)]
struct RainbowParams {
    #[serde(default = "rainbow_delay")]
    delay: u64,
}

fn full() -> u8 {
    u8::MAX
}

fn scanner_delay() -> u64 {
    100
}

fn pulse_duration() -> u64 {
    2000
}

fn rainbow_delay() -> u64 {
    10
}

/// `filename` and `loop` may sit at the top level or inside `parameters`
#[derive(Deserialize, Default)]
struct VideoParams {
    filename: Option<String>,
    #[serde(rename = "loop")]
    looping: Option<bool>,
    parameters: Option<Box<VideoParams>>,
}

impl VideoParams {
    fn filename(&self) -> Option<String> {
        self.filename
            .clone()
            .or_else(|| self.parameters.as_ref()?.filename.clone())
            .filter(|name| !name.is_empty())
    }

    fn looping(&self) -> bool {
        self.looping
            .or_else(|| self.parameters.as_ref()?.looping)
            .unwrap_or(false)
    }
}

fn params<T: DeserializeOwned>(value: &Value) -> Result<T, CommandError> {
    T::deserialize(value).map_err(|e| CommandError::InvalidParameters(e.to_string()))
}

fn led(command: Command, ack: &'static str) -> ControlAction {
    ControlAction::Led { command, ack }
}

fn action(name: &str, value: &Value) -> Option<Result<ControlAction, CommandError>> {
    let action = match name {
        "discovery" => Ok(ControlAction::Discovery),
        "set_led_color" => params::<ColorParams>(value)
            .map(|p| led(Command::SetColor(p.into()), "LED color set")),
        "set_brightness" | "set_led_brightness" => params::<BrightnessParams>(value).map(|p| {
            led(
                Command::SetBrightness {
                    level: p.brightness,
                },
                "Brightness set",
            )
        }),
        "set_individual_led" => params::<IndividualParams>(value).map(|p| {
            led(
                Command::SetIndividual {
                    index: p.led_index,
                    color: Color::rgbw(p.r, p.g, p.b, p.w),
                },
                "Individual LED set",
            )
        }),
        "set_leds_array" => params::<ArrayParams>(value).and_then(|p| {
            let pixels = p
                .leds
                .iter()
                .map(|led| match led.as_slice() {
                    [r, g, b] => Ok(Color::rgb(*r, *g, *b)),
                    [r, g, b, w] => Ok(Color::rgbw(*r, *g, *b, *w)),
                    _ => Err(CommandError::InvalidParameters(
                        "each LED needs 3 or 4 channels".into(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(led(Command::SetFrame { pixels }, "LED array set"))
        }),
        "scanner" => params::<ScannerParams>(value).map(|p| {
            led(
                Command::ScannerEffect {
                    color: Color::rgb(p.r, p.g, p.b),
                    step_delay: Duration::from_millis(p.delay),
                },
                "Scanner effect activated",
            )
        }),
        "pulse" => params::<PulseParams>(value).map(|p| {
            led(
                Command::PulseEffect {
                    color: Color::rgb(p.r, p.g, p.b),
                    duration: Duration::from_millis(p.duration),
                },
                "Pulse effect activated",
            )
        }),
        "rainbow" => params::<RainbowParams>(value).map(|p| {
            led(
                Command::RainbowEffect {
                    step_delay: Duration::from_millis(p.delay),
                },
                "Rainbow effect activated",
            )
        }),
        "play_video" => params::<VideoParams>(value).and_then(|p| {
            let source = p.filename().ok_or(CommandError::MissingFilename)?;
            Ok(ControlAction::Video(PlaybackRequest::PlayAnimation {
                source,
                looping: p.looping(),
            }))
        }),
        "display_image" => params::<VideoParams>(value).and_then(|p| {
            let source = p.filename().ok_or(CommandError::MissingFilename)?;
            Ok(ControlAction::Video(PlaybackRequest::DisplayStill { source }))
        }),
        "stop_video" => Ok(ControlAction::Video(PlaybackRequest::Stop)),
        "list_videos" => Ok(ControlAction::ListMedia),
        "status" => Ok(ControlAction::Status),
        "get_battery" => Ok(ControlAction::Battery),
        "toggle_sacn" => Ok(ControlAction::ToggleSacn),
        _ => return None,
    };
    Some(action)
}

/// Decode one control datagram
pub fn decode(datagram: &[u8]) -> Decoded {
    let Ok(value) = serde_json::from_slice::<Value>(datagram) else {
        return Decoded::Ignored;
    };
    let Ok(header) = RequestHeader::deserialize(&value) else {
        return Decoded::Ignored;
    };

    match action(&header.action, &value) {
        None => Decoded::Ignored,
        Some(Ok(action)) => Decoded::Accepted(Request {
            command_id: header.command_id,
            action,
        }),
        Some(Err(error)) => Decoded::Rejected {
            command_id: header.command_id,
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(json: &str) -> ControlAction {
        match decode(json.as_bytes()) {
            Decoded::Accepted(request) => request.action,
            other => panic!("{} was not accepted: {:?}", json, other),
        }
    }

    #[test]
    fn test_set_color() {
        assert_eq!(
            accepted(r#"{"action":"set_led_color","commandId":"1","r":255,"g":0,"b":10}"#),
            ControlAction::Led {
                command: Command::SetColor(Color::rgb(255, 0, 10)),
                ack: "LED color set",
            }
        );
    }

    #[test]
    fn test_ignored_datagrams() {
        assert_eq!(decode(b"not json"), Decoded::Ignored);
        assert_eq!(decode(br#"{"commandId":"1"}"#), Decoded::Ignored);
        assert_eq!(decode(br#"{"action":"status"}"#), Decoded::Ignored);
        assert_eq!(
            decode(br#"{"action":"self_destruct","commandId":"1"}"#),
            Decoded::Ignored
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        let Decoded::Rejected { command_id, error } =
            decode(br#"{"action":"set_led_color","commandId":"9","r":300,"g":0,"b":0}"#)
        else {
            panic!("expected a rejection");
        };
        assert_eq!(command_id, "9");
        assert!(matches!(error, CommandError::InvalidParameters(_)));

        assert!(matches!(
            decode(br#"{"action":"set_brightness","commandId":"9"}"#),
            Decoded::Rejected { .. }
        ));
        assert!(matches!(
            decode(br#"{"action":"set_leds_array","commandId":"9","leds":[[1,2]]}"#),
            Decoded::Rejected { .. }
        ));
    }

    #[test]
    fn test_effect_defaults() {
        assert_eq!(
            accepted(r#"{"action":"scanner","commandId":"1"}"#),
            ControlAction::Led {
                command: Command::ScannerEffect {
                    color: Color::rgb(255, 0, 0),
                    step_delay: Duration::from_millis(100),
                },
                ack: "Scanner effect activated",
            }
        );
        assert_eq!(
            accepted(r#"{"action":"pulse","commandId":"1","duration":500}"#),
            ControlAction::Led {
                command: Command::PulseEffect {
                    color: Color::rgb(255, 255, 255),
                    duration: Duration::from_millis(500),
                },
                ack: "Pulse effect activated",
            }
        );
    }

    #[test]
    fn test_rainbow() {
        assert_eq!(
            accepted(r#"{"action":"rainbow","commandId":"1"}"#),
            ControlAction::Led {
                command: Command::RainbowEffect {
                    step_delay: Duration::from_millis(10),
                },
                ack: "Rainbow effect activated",
            }
        );
        assert!(matches!(
            decode(br#"{"action":"rainbow","commandId":"1","delay":-5}"#),
            Decoded::Rejected { .. }
        ));
    }

    #[test]
    fn test_play_video_filename_locations() {
        let expected = ControlAction::Video(PlaybackRequest::PlayAnimation {
            source: "bats".into(),
            looping: true,
        });
        assert_eq!(
            accepted(r#"{"action":"play_video","commandId":"1","filename":"bats","loop":true}"#),
            expected
        );
        assert_eq!(
            accepted(
                r#"{"action":"play_video","commandId":"1","parameters":{"filename":"bats","loop":true}}"#
            ),
            expected
        );
        assert_eq!(
            decode(br#"{"action":"display_image","commandId":"1"}"#),
            Decoded::Rejected {
                command_id: "1".into(),
                error: CommandError::MissingFilename
            }
        );
    }

    #[test]
    fn test_leds_array() {
        assert_eq!(
            accepted(r#"{"action":"set_leds_array","commandId":"1","leds":[[1,2,3],[4,5,6,7]]}"#),
            ControlAction::Led {
                command: Command::SetFrame {
                    pixels: vec![Color::rgb(1, 2, 3), Color::rgbw(4, 5, 6, 7)]
                },
                ack: "LED array set",
            }
        );
    }
}
