use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::Error;
use common::{
    BatteryInfo, BatteryReply, DiscoveryReply, MediaListReply, Response, StatusReport,
};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::channels::offer;
use crate::config::{Config, FIRMWARE_VERSION};
use crate::dmx::pack::{E131_MAX_PACKET_SIZE, SACN_PORT};
use crate::dmx::{multicast_group, DmxReceiver};
use crate::video::PlaybackStatus;
use crate::{Command, NetworkEvent, Reply, VideoMessage};
use request::{ControlAction, Decoded, Request};

pub mod request;

/// Upper bound on one wait of the network loop
pub const NETWORK_POLL: Duration = Duration::from_millis(10);
pub const MAX_CONTROL_DATAGRAM: usize = 2048;

pub const SACN_ACTIVE_REPLY: &str = "sACN active - LED command ignored";
pub const LED_QUEUE_FULL_REPLY: &str = "Failed to queue LED command";
pub const VIDEO_QUEUE_FULL_REPLY: &str = "Failed to queue video command";
pub const SACN_UNAVAILABLE_REPLY: &str = "SACN unavailable - no sACN socket";

/// A datagram ready to go out on the control socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub addr: SocketAddr,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Identity {
    device_id: String,
    device_type: String,
    label: String,
    num_leds: usize,
}

/// Owns the control and sACN sockets, answers requests and decides
/// whether UDP or DMX drives the strip
pub struct NetworkTask {
    identity: Identity,
    started: Instant,
    led: mpsc::Sender<Command>,
    video: mpsc::Sender<VideoMessage>,
    dmx: DmxReceiver,
    playback: PlaybackStatus,
    battery: BatteryInfo,
    status_addr: SocketAddr,
    status_interval: Duration,
}

fn encode<T: Serialize>(addr: SocketAddr, value: &T) -> Option<Outgoing> {
    match serde_json::to_vec(value) {
        Ok(payload) => Some(Outgoing { addr, payload }),
        Err(e) => {
            warn!("Could not encode reply: {}", e);
            None
        }
    }
}

impl NetworkTask {
    pub fn new(
        config: &Config,
        led: mpsc::Sender<Command>,
        video: mpsc::Sender<VideoMessage>,
    ) -> Self {
        Self {
            identity: Identity {
                device_id: config.device.id.clone(),
                device_type: config.device.device_type.clone(),
                label: config.device.label.clone(),
                num_leds: config.leds.count,
            },
            started: Instant::now(),
            led,
            video,
            dmx: DmxReceiver::new(config.patch(), config.sacn.enabled),
            playback: PlaybackStatus::default(),
            battery: BatteryInfo::default(),
            status_addr: config.network.status_addr,
            status_interval: config.status_interval(),
        }
    }

    pub fn dmx(&self) -> &DmxReceiver {
        &self.dmx
    }

    /// Milliseconds since the task started
    fn timestamp(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Drop DMX priority after its timeout. Called every loop iteration.
    pub fn poll_priority(&mut self, now: Instant) {
        self.dmx.expire(now);
    }

    fn response(&self, command_id: String, result: &str, addr: SocketAddr) -> Option<Outgoing> {
        encode(
            addr,
            &Response {
                command_id,
                result: result.to_string(),
                timestamp: self.timestamp(),
                device_id: self.identity.device_id.clone(),
            },
        )
    }

    pub fn status_report(&self, command_id: Option<String>, now: Instant) -> StatusReport {
        let stats = self.dmx.stats();
        StatusReport {
            command_id,
            device_id: self.identity.device_id.clone(),
            device_type: self.identity.device_type.clone(),
            device_label: self.identity.label.clone(),
            firmware_version: FIRMWARE_VERSION.to_string(),
            uptime: now.saturating_duration_since(self.started).as_secs(),
            video_playing: self.playback.playing,
            current_video: self.playback.current.clone(),
            video_looping: self.playback.looping,
            current_frame: self.playback.frame,
            sacn_enabled: self.dmx.is_enabled(),
            sacn_active: self.dmx.is_priority_active(),
            sacn_universe: self.dmx.patch().universe,
            sacn_sequence_gaps: stats.sequence_gaps,
            sacn_duplicates: stats.duplicates,
            battery: self.battery.clone(),
            timestamp: self.timestamp(),
        }
    }

    /// Handle one control datagram and return the reply to send, if any.
    /// Video requests are answered later through [`NetworkEvent`]s.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        from: SocketAddr,
        now: Instant,
    ) -> Option<Outgoing> {
        self.poll_priority(now);

        match request::decode(datagram) {
            Decoded::Ignored => {
                debug!("Ignoring {} byte datagram from {}", datagram.len(), from);
                None
            }
            Decoded::Rejected { command_id, error } => {
                debug!("Rejected request {} from {}: {}", command_id, from, error);
                self.response(command_id, &error.to_string(), from)
            }
            Decoded::Accepted(request) => self.dispatch(request, from, now),
        }
    }

    fn dispatch(&mut self, request: Request, from: SocketAddr, now: Instant) -> Option<Outgoing> {
        let Request { command_id, action } = request;
        debug!("{} {:?} from {}", command_id, action, from);

        match action {
            ControlAction::Discovery => encode(
                from,
                &DiscoveryReply {
                    command_id,
                    device_id: self.identity.device_id.clone(),
                    device_type: self.identity.device_type.clone(),
                    device_label: self.identity.label.clone(),
                    firmware_version: FIRMWARE_VERSION.to_string(),
                    num_leds: self.identity.num_leds,
                    sacn_universe: self.dmx.patch().universe,
                },
            ),
            ControlAction::Led { command, ack } => {
                if self.dmx.is_priority_active() && command.is_color_mutating() {
                    return self.response(command_id, SACN_ACTIVE_REPLY, from);
                }
                let result = if offer(&self.led, command, "LED") {
                    ack
                } else {
                    LED_QUEUE_FULL_REPLY
                };
                self.response(command_id, result, from)
            }
            ControlAction::Video(request) => {
                let reply = Reply {
                    command_id: command_id.clone(),
                    addr: from,
                };
                let message = VideoMessage::Playback {
                    request,
                    reply: Some(reply),
                };
                if offer(&self.video, message, "video") {
                    None
                } else {
                    self.response(command_id, VIDEO_QUEUE_FULL_REPLY, from)
                }
            }
            ControlAction::ListMedia => {
                let reply = Reply {
                    command_id: command_id.clone(),
                    addr: from,
                };
                if offer(&self.video, VideoMessage::ListMedia { reply }, "video") {
                    None
                } else {
                    self.response(command_id, VIDEO_QUEUE_FULL_REPLY, from)
                }
            }
            ControlAction::Status => encode(from, &self.status_report(Some(command_id), now)),
            ControlAction::Battery => encode(
                from,
                &BatteryReply {
                    command_id,
                    device_id: self.identity.device_id.clone(),
                    battery: self.battery.clone(),
                },
            ),
            ControlAction::ToggleSacn => {
                let result = match self.dmx.toggle() {
                    Ok(true) => "SACN enabled",
                    Ok(false) => "SACN disabled",
                    Err(e) => {
                        warn!("Cannot toggle sACN: {}", e);
                        SACN_UNAVAILABLE_REPLY
                    }
                };
                self.response(command_id, result, from)
            }
        }
    }

    /// Handle a datagram from the sACN socket
    pub fn handle_dmx(&mut self, packet: &[u8], now: Instant) {
        if let Some(command) = self.dmx.receive(packet, now) {
            offer(&self.led, command, "LED");
        }
    }

    pub fn handle_event(&mut self, event: NetworkEvent) -> Option<Outgoing> {
        match event {
            NetworkEvent::PlaybackResult { reply, result } => {
                let text = match result {
                    Ok(text) | Err(text) => text,
                };
                self.response(reply.command_id, &text, reply.addr)
            }
            NetworkEvent::MediaList { reply, entries } => encode(
                reply.addr,
                &MediaListReply {
                    command_id: reply.command_id,
                    device_id: self.identity.device_id.clone(),
                    videos: entries,
                },
            ),
            NetworkEvent::Playback(status) => {
                self.playback = status;
                None
            }
            NetworkEvent::Health(battery) => {
                self.battery = battery;
                None
            }
        }
    }

    /// Unsolicited status report for the status address
    pub fn periodic_status(&self, now: Instant) -> Option<Outgoing> {
        let stats = self.dmx.stats();
        if stats.sequence_gaps > 0 || stats.duplicates > 0 {
            debug!(
                "sACN: {} accepted, {} rejected, {} sequence gaps, {} duplicates",
                stats.accepted, stats.rejected, stats.sequence_gaps, stats.duplicates
            );
        }
        encode(self.status_addr, &self.status_report(None, now))
    }

    pub async fn run(
        mut self,
        control: UdpSocket,
        dmx: Option<UdpSocket>,
        mut events: mpsc::Receiver<NetworkEvent>,
    ) -> Result<(), Error> {
        let mut control_buf = vec![0u8; MAX_CONTROL_DATAGRAM];
        let mut dmx_buf = vec![0u8; E131_MAX_PACKET_SIZE];
        let mut status_timer = tokio::time::interval(self.status_interval);
        status_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if dmx.is_none() {
            warn!("No sACN socket, DMX reception disabled");
            self.dmx.set_unavailable();
        }

        info!("Network task running on {}", control.local_addr()?);
        loop {
            self.poll_priority(Instant::now());

            let outgoing = tokio::select! {
                received = control.recv_from(&mut control_buf) => match received {
                    Ok((len, from)) => self.handle_datagram(&control_buf[..len], from, Instant::now()),
                    Err(e) => {
                        warn!("Control socket receive failed: {}", e);
                        None
                    }
                },
                received = recv_dmx(dmx.as_ref(), &mut dmx_buf) => match received {
                    Ok(len) => {
                        self.handle_dmx(&dmx_buf[..len], Instant::now());
                        None
                    }
                    Err(e) => {
                        warn!("sACN socket receive failed: {}", e);
                        None
                    }
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Network event channel closed, network task exiting");
                        return Ok(());
                    }
                },
                _ = status_timer.tick() => self.periodic_status(Instant::now()),
                _ = tokio::time::sleep(NETWORK_POLL) => None,
            };

            if let Some(Outgoing { addr, payload }) = outgoing {
                if let Err(e) = control.send_to(&payload, addr).await {
                    warn!("Could not send {} bytes to {}: {}", payload.len(), addr, e);
                }
            }
        }
    }
}

async fn recv_dmx(socket: Option<&UdpSocket>, buf: &mut [u8]) -> io::Result<usize> {
    match socket {
        Some(socket) => socket.recv(buf).await,
        None => std::future::pending().await,
    }
}

/// Bind the control socket on all interfaces with broadcast enabled
pub async fn bind_control(port: u16) -> Result<UdpSocket, Error> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Bind the sACN port and join the universe's multicast group. Failing to
/// join leaves unicast sACN working; failing to bind disables sACN.
pub async fn bind_sacn(universe: u16) -> Option<UdpSocket> {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, SACN_PORT)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Could not bind sACN port {}: {}", SACN_PORT, e);
            return None;
        }
    };
    let group = multicast_group(universe);
    match socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
        Ok(()) => info!("Listening for sACN universe {} on {}", universe, group),
        Err(e) => warn!("Could not join {} ({}), unicast sACN only", group, e),
    }
    Some(socket)
}
