use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::{debug, info};
use thiserror::Error;

use crate::led::Color;
use crate::Command;
use pack::{FramingTailPack, RootLayerPack, ACN_PID, DMX_DATA_OFFSET, DMX_MAX_SLOTS};

pub mod pack;

/// DMX keeps priority over UDP colour commands until it has been silent
/// for longer than this
pub const PRIORITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DmxReject {
    #[error("packet is {0} bytes, shorter than an E1.31 header")]
    TooShort(usize),
    #[error("ACN packet identifier mismatch")]
    BadIdentifier,
    #[error("universe {0} is not patched here")]
    WrongUniverse(u16),
    #[error("payload of {have} slots does not reach slot {need}")]
    ShortPayload { have: usize, need: usize },
}

/// A validated E1.31 data packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmxFrame {
    pub universe: u16,
    pub sequence: u8,
    /// Slots 1..=512, zero past `slot_count`
    pub channel_data: [u8; DMX_MAX_SLOTS],
    pub slot_count: usize,
}

/// Which slots of which universe drive the strip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Patch {
    pub universe: u16,
    /// 1-based DMX address of the first fixture's red channel
    pub start_address: u16,
    pub fixtures: usize,
}

impl Patch {
    fn first_slot(&self) -> usize {
        usize::from(self.start_address.max(1)) - 1
    }

    /// Number of slots the payload must carry to cover every fixture
    pub fn slots_needed(&self) -> usize {
        self.first_slot() + 3 * self.fixtures
    }
}

/// Multicast group carrying `universe`
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// Validate a datagram from the sACN port. The checks run in order: length,
/// packet identifier, universe, payload coverage.
pub fn parse_frame(packet: &[u8], patch: &Patch) -> Result<DmxFrame, DmxReject> {
    if packet.len() < DMX_DATA_OFFSET {
        return Err(DmxReject::TooShort(packet.len()));
    }

    let root = RootLayerPack::unpack_from(packet).map_err(|_| DmxReject::TooShort(packet.len()))?;
    if root.acn_pid != ACN_PID {
        return Err(DmxReject::BadIdentifier);
    }

    let tail =
        FramingTailPack::unpack_from(packet).map_err(|_| DmxReject::TooShort(packet.len()))?;
    if tail.universe != patch.universe {
        return Err(DmxReject::WrongUniverse(tail.universe));
    }

    let end = packet.len().min(DMX_DATA_OFFSET + DMX_MAX_SLOTS);
    let slots = &packet[DMX_DATA_OFFSET..end];
    let need = patch.slots_needed();
    if slots.len() < need {
        return Err(DmxReject::ShortPayload {
            have: slots.len(),
            need,
        });
    }

    let mut channel_data = [0; DMX_MAX_SLOTS];
    channel_data[..slots.len()].copy_from_slice(slots);
    Ok(DmxFrame {
        universe: tail.universe,
        sequence: tail.sequence,
        channel_data,
        slot_count: slots.len(),
    })
}

/// Tracks whether DMX currently owns the strip
#[derive(Debug, Default, Clone)]
pub struct PriorityState {
    dmx_active: bool,
    last_dmx_frame_at: Option<Instant>,
}

impl PriorityState {
    pub fn mark(&mut self, now: Instant) {
        self.dmx_active = true;
        self.last_dmx_frame_at = Some(now);
    }

    /// Drop priority once DMX has been silent for strictly longer than
    /// [`PRIORITY_TIMEOUT`]. Returns true on the transition.
    pub fn expire(&mut self, now: Instant) -> bool {
        if !self.dmx_active {
            return false;
        }
        let silent = self
            .last_dmx_frame_at
            .map_or(true, |at| now.saturating_duration_since(at) > PRIORITY_TIMEOUT);
        if silent {
            self.dmx_active = false;
        }
        silent
    }

    pub fn is_active(&self) -> bool {
        self.dmx_active
    }

    pub fn clear(&mut self) {
        self.dmx_active = false;
    }
}

/// No sACN socket is bound, so reception cannot be switched on
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no sACN socket is bound")]
pub struct SacnUnavailable;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DmxStats {
    pub accepted: u64,
    pub rejected: u64,
    pub sequence_gaps: u64,
    pub duplicates: u64,
}

pub struct DmxReceiver {
    patch: Patch,
    enabled: bool,
    /// False once we know there is no socket to receive on
    available: bool,
    priority: PriorityState,
    last_sequence: Option<u8>,
    stats: DmxStats,
}

impl DmxReceiver {
    pub fn new(patch: Patch, enabled: bool) -> Self {
        Self {
            patch,
            enabled,
            available: true,
            priority: PriorityState::default(),
            last_sequence: None,
            stats: DmxStats::default(),
        }
    }

    /// Handle one datagram. Returns the frame command to queue when the
    /// packet is accepted.
    pub fn receive(&mut self, packet: &[u8], now: Instant) -> Option<Command> {
        if !self.enabled {
            return None;
        }

        let frame = match parse_frame(packet, &self.patch) {
            Ok(frame) => frame,
            Err(reject) => {
                self.stats.rejected += 1;
                debug!("Dropping sACN packet: {}", reject);
                return None;
            }
        };

        self.observe_sequence(frame.sequence);
        self.stats.accepted += 1;
        if !self.priority.is_active() {
            info!("sACN universe {} took control of the strip", frame.universe);
        }
        self.priority.mark(now);

        Some(Command::SetFrame {
            pixels: self.decompose(&frame),
        })
    }

    /// One RGB colour per fixture, starting at the patched address
    pub fn decompose(&self, frame: &DmxFrame) -> Vec<Color> {
        let slots = frame
            .channel_data
            .get(self.patch.first_slot()..frame.slot_count)
            .unwrap_or_default();
        slots
            .chunks_exact(3)
            .take(self.patch.fixtures)
            .map(|rgb| Color::rgb(rgb[0], rgb[1], rgb[2]))
            .collect()
    }

    pub fn expire(&mut self, now: Instant) -> bool {
        let expired = self.priority.expire(now);
        if expired {
            info!("sACN silent for {:?}, UDP commands resume", PRIORITY_TIMEOUT);
        }
        expired
    }

    pub fn is_priority_active(&self) -> bool {
        self.priority.is_active()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record that the sACN socket could not be bound. Reception stays off
    /// for the rest of the run.
    pub fn set_unavailable(&mut self) {
        self.available = false;
        self.enabled = false;
        self.priority.clear();
        self.last_sequence = None;
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Flip reception on or off. Turning it off releases priority at once.
    pub fn toggle(&mut self) -> Result<bool, SacnUnavailable> {
        if !self.available {
            return Err(SacnUnavailable);
        }
        self.enabled = !self.enabled;
        if !self.enabled {
            self.priority.clear();
            self.last_sequence = None;
        }
        info!(
            "sACN reception {}",
            if self.enabled { "enabled" } else { "disabled" }
        );
        Ok(self.enabled)
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn stats(&self) -> DmxStats {
        self.stats
    }

    fn observe_sequence(&mut self, sequence: u8) {
        if let Some(last) = self.last_sequence {
            if sequence == last {
                self.stats.duplicates += 1;
            } else if sequence != last.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
                debug!("sACN sequence jumped from {} to {}", last, sequence);
            }
        }
        self.last_sequence = Some(sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::pack::build_packet;
    use super::*;

    fn patch() -> Patch {
        Patch {
            universe: 1,
            start_address: 1,
            fixtures: 3,
        }
    }

    #[test]
    fn test_decomposes_rgb_triplets() {
        let packet = build_packet(1, 0, "test", &[255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        let mut receiver = DmxReceiver::new(patch(), true);

        let command = receiver.receive(&packet, Instant::now());
        assert_eq!(
            command,
            Some(Command::SetFrame {
                pixels: vec![
                    Color::rgb(255, 0, 0),
                    Color::rgb(0, 255, 0),
                    Color::rgb(0, 0, 255)
                ]
            })
        );
        assert!(receiver.is_priority_active());
    }

    #[test]
    fn test_start_address_offset() {
        let patch = Patch {
            universe: 1,
            start_address: 4,
            fixtures: 1,
        };
        let packet = build_packet(1, 0, "test", &[9, 9, 9, 10, 20, 30]).unwrap();
        let frame = parse_frame(&packet, &patch).unwrap();
        let receiver = DmxReceiver::new(patch, true);
        assert_eq!(receiver.decompose(&frame), vec![Color::rgb(10, 20, 30)]);
    }

    #[test]
    fn test_rejects_identifier_mismatch() {
        let mut packet = build_packet(1, 0, "test", &[0; 9]).unwrap();
        packet[9] ^= 0xFF;
        assert_eq!(parse_frame(&packet, &patch()), Err(DmxReject::BadIdentifier));
    }

    #[test]
    fn test_rejects_other_universe() {
        let packet = build_packet(2, 0, "test", &[0; 9]).unwrap();
        assert_eq!(parse_frame(&packet, &patch()), Err(DmxReject::WrongUniverse(2)));
    }

    #[test]
    fn test_rejects_short_packets() {
        let packet = build_packet(1, 0, "test", &[0; 9]).unwrap();
        assert_eq!(
            parse_frame(&packet[..125], &patch()),
            Err(DmxReject::TooShort(125))
        );
        assert_eq!(
            parse_frame(&packet[..130], &patch()),
            Err(DmxReject::ShortPayload { have: 4, need: 9 })
        );
    }

    #[test]
    fn test_rejected_packet_keeps_priority_state() {
        let mut receiver = DmxReceiver::new(patch(), true);
        let packet = build_packet(7, 0, "test", &[0; 9]).unwrap();
        assert_eq!(receiver.receive(&packet, Instant::now()), None);
        assert!(!receiver.is_priority_active());
        assert_eq!(receiver.stats().rejected, 1);
    }

    #[test]
    fn test_sequence_gaps_counted() {
        let mut receiver = DmxReceiver::new(patch(), true);
        let now = Instant::now();
        for sequence in [254, 255, 0, 3, 3] {
            let packet = build_packet(1, sequence, "test", &[0; 9]).unwrap();
            assert!(receiver.receive(&packet, now).is_some());
        }
        let stats = receiver.stats();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.sequence_gaps, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_priority_expires_after_timeout() {
        let start = Instant::now();
        let mut priority = PriorityState::default();
        priority.mark(start);

        assert!(!priority.expire(start + PRIORITY_TIMEOUT));
        assert!(priority.is_active());
        assert!(priority.expire(start + PRIORITY_TIMEOUT + Duration::from_millis(1)));
        assert!(!priority.is_active());
        assert!(!priority.expire(start + PRIORITY_TIMEOUT * 2));
    }

    #[test]
    fn test_disabled_receiver_ignores_packets() {
        let mut receiver = DmxReceiver::new(patch(), false);
        let packet = build_packet(1, 0, "test", &[0; 9]).unwrap();
        assert_eq!(receiver.receive(&packet, Instant::now()), None);
        assert!(!receiver.is_priority_active());

        assert_eq!(receiver.toggle(), Ok(true));
        assert!(receiver.receive(&packet, Instant::now()).is_some());
        assert_eq!(receiver.toggle(), Ok(false));
        assert!(!receiver.is_priority_active());
    }

    #[test]
    fn test_unavailable_receiver_cannot_be_enabled() {
        let mut receiver = DmxReceiver::new(patch(), true);
        let packet = build_packet(1, 0, "test", &[0; 9]).unwrap();
        assert!(receiver.receive(&packet, Instant::now()).is_some());

        receiver.set_unavailable();
        assert!(!receiver.is_enabled());
        assert!(!receiver.is_priority_active());
        assert_eq!(receiver.toggle(), Err(SacnUnavailable));
        assert!(!receiver.is_enabled());
        assert_eq!(receiver.receive(&packet, Instant::now()), None);
    }

    #[test]
    fn test_multicast_group() {
        assert_eq!(multicast_group(1), Ipv4Addr::new(239, 255, 0, 1));
        assert_eq!(multicast_group(0x0203), Ipv4Addr::new(239, 255, 2, 3));
    }
}
