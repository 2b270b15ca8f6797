//! Collaborator traits for every channel the orchestrator talks through,
//! plus the two concrete robot-command links.
//!
//! The orchestrator never opens sockets itself.  It asks a
//! [`TransportFactory`] for one endpoint per channel when a session starts
//! and only ever talks to the traits below, so real links, simulators and
//! test doubles are interchangeable.
//!
//! | Channel | Trait | Direction |
//! |---|---|---|
//! | robot commands | [`CommandSender`] | out |
//! | debug annotations | [`DebugSender`] | out |
//! | debug UI input | [`DebugReceiver`] | in |
//! | referee | [`RefereeReceiver`] | in |
//! | vision | [`VisionReceiver`] | in |
//!
//! [`UdpCommandSender`] backs [`TransportKind::Network`] and
//! [`SerialCommandSender`] backs [`TransportKind::Serial`].  Both encode one
//! JSON object per [`Command`].  Serial devices are opened through
//! `serialport` in raw mode at a configured baud rate.

use std::fmt;
use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use robofleet_types::{Command, DebugAnnotation, DebugInput, FleetError, RefereeState, VisionFrame};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::debug;

pub const ROBOT_COMMAND_CHANNEL: &str = "robot_commands";

/// Baud rate of the robot radio base station.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const SERIAL_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Physical link used to reach the robots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Network,
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Network => write!(f, "network"),
            TransportKind::Serial => write!(f, "serial"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" | "udp" => Ok(TransportKind::Network),
            "serial" => Ok(TransportKind::Serial),
            other => Err(FleetError::Configuration(format!(
                "unknown transport kind '{other}'"
            ))),
        }
    }
}

/// Outbound robot command link.  Delivery is best-effort: `Ok` only means
/// the command left this process.
pub trait CommandSender: Send {
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] when the command could not be
    /// handed to the link.
    fn send(&mut self, command: &Command) -> Result<(), FleetError>;
}

/// Outbound channel for strategy annotations.
pub trait DebugSender: Send {
    fn send(&mut self, batch: &[DebugAnnotation]) -> Result<(), FleetError>;
}

/// Inbound channel from the debug UI.
pub trait DebugReceiver: Send {
    /// Take the pending input, if any.  Never blocks.
    fn receive(&mut self) -> Option<DebugInput>;
}

pub trait RefereeReceiver: Send {
    /// Newest referee state received since the last call.  Never blocks.
    fn latest(&mut self) -> Option<RefereeState>;
}

/// Sensor source with latest-wins semantics.
pub trait VisionReceiver: Send {
    /// Newest frame received so far, or `None` if nothing has ever arrived.
    /// Older frames are discarded, never queued.  Never blocks.
    fn latest_frame(&mut self) -> Option<VisionFrame>;
}

/// Builds the endpoints of one orchestrator session.
pub trait TransportFactory: Send + Sync {
    fn command_sender(&self, kind: TransportKind) -> Result<Box<dyn CommandSender>, FleetError>;
    fn debug_sender(&self) -> Result<Box<dyn DebugSender>, FleetError>;
    fn debug_receiver(&self) -> Result<Box<dyn DebugReceiver>, FleetError>;
    fn referee_receiver(&self) -> Result<Box<dyn RefereeReceiver>, FleetError>;
    fn vision_receiver(&self) -> Result<Box<dyn VisionReceiver>, FleetError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// UDP link
// ─────────────────────────────────────────────────────────────────────────────

/// Sends each command as one JSON datagram to a fixed address.
pub struct UdpCommandSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpCommandSender {
    /// Bind an ephemeral local socket and resolve `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if `target` does not resolve or the
    /// local socket cannot be bound.
    pub fn connect(target: impl ToSocketAddrs) -> Result<Self, FleetError> {
        let target = target
            .to_socket_addrs()
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))?
            .next()
            .ok_or_else(|| {
                FleetError::transport(ROBOT_COMMAND_CHANNEL, "target address did not resolve")
            })?;
        let local = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local)
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))?;
        debug!(%target, "udp command link ready");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl CommandSender for UdpCommandSender {
    fn send(&mut self, command: &Command) -> Result<(), FleetError> {
        let payload = serde_json::to_vec(command)
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))?;
        self.socket
            .send_to(&payload, self.target)
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serial link
// ─────────────────────────────────────────────────────────────────────────────

/// Writes newline-delimited JSON commands to a byte sink, typically a serial
/// port opened with [`SerialCommandSender::open`].
pub struct SerialCommandSender<W: Write + Send> {
    sink: W,
}

impl<W: Write + Send> SerialCommandSender<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl SerialCommandSender<Box<dyn SerialPort>> {
    /// Open the serial device at `path` at `baud_rate` (8N1, no flow
    /// control).
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if the device cannot be opened or
    /// configured.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .timeout(SERIAL_WRITE_TIMEOUT)
            .open()
            .map_err(|e| {
                FleetError::transport(
                    ROBOT_COMMAND_CHANNEL,
                    format!("cannot open {} at {baud_rate} baud: {e}", path.display()),
                )
            })?;
        debug!(path = %path.display(), baud_rate, "serial command link ready");
        Ok(Self::new(port))
    }
}

impl<W: Write + Send> CommandSender for SerialCommandSender<W> {
    fn send(&mut self, command: &Command) -> Result<(), FleetError> {
        let mut line = serde_json::to_vec(command)
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))?;
        line.push(b'\n');
        self.sink
            .write_all(&line)
            .and_then(|()| self.sink.flush())
            .map_err(|e| FleetError::transport(ROBOT_COMMAND_CHANNEL, e.to_string()))
    }
}
