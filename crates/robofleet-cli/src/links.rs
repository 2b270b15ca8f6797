//! Bench wiring: simulated vision, referee and debug channels, with robot
//! commands optionally mirrored onto a real UDP or serial link.

use robofleet_hal::{
    CommandSender, DebugReceiver, DebugSender, RefereeReceiver, SerialCommandSender, SimTransports,
    TransportFactory, TransportKind, UdpCommandSender, VisionReceiver,
};
use robofleet_types::{Command, FleetError};
use tracing::info;

use crate::config::{Config, Link};

pub struct BenchTransports {
    sim: SimTransports,
    link: Link,
    command_addr: String,
    serial_path: std::path::PathBuf,
    baud_rate: u32,
}

impl BenchTransports {
    pub fn new(sim: SimTransports, cfg: &Config) -> Self {
        Self {
            sim,
            link: cfg.transport,
            command_addr: cfg.command_addr.clone(),
            serial_path: cfg.serial_path.clone(),
            baud_rate: cfg.baud_rate,
        }
    }

    fn hardware_sender(&self, kind: TransportKind) -> Result<Box<dyn CommandSender>, FleetError> {
        match kind {
            TransportKind::Network => {
                let sender = UdpCommandSender::connect(self.command_addr.as_str())?;
                info!(addr = %sender.target(), "robot commands over udp");
                Ok(Box::new(sender))
            }
            TransportKind::Serial => {
                let sender = SerialCommandSender::open(&self.serial_path, self.baud_rate)?;
                info!(
                    path = %self.serial_path.display(),
                    baud = self.baud_rate,
                    "robot commands over serial"
                );
                Ok(Box::new(sender))
            }
        }
    }
}

/// Sends every command to the hardware link and to the simulation, so the
/// simulated robots follow what the real ones are told.
struct Mirror {
    hardware: Box<dyn CommandSender>,
    sim: Box<dyn CommandSender>,
}

impl CommandSender for Mirror {
    fn send(&mut self, command: &Command) -> Result<(), FleetError> {
        let hardware = self.hardware.send(command);
        self.sim.send(command)?;
        hardware
    }
}

impl TransportFactory for BenchTransports {
    fn command_sender(&self, kind: TransportKind) -> Result<Box<dyn CommandSender>, FleetError> {
        let sim = self.sim.command_sender(kind)?;
        if self.link == Link::Sim {
            return Ok(sim);
        }
        Ok(Box::new(Mirror {
            hardware: self.hardware_sender(kind)?,
            sim,
        }))
    }

    fn debug_sender(&self) -> Result<Box<dyn DebugSender>, FleetError> {
        self.sim.debug_sender()
    }

    fn debug_receiver(&self) -> Result<Box<dyn DebugReceiver>, FleetError> {
        self.sim.debug_receiver()
    }

    fn referee_receiver(&self) -> Result<Box<dyn RefereeReceiver>, FleetError> {
        self.sim.referee_receiver()
    }

    fn vision_receiver(&self) -> Result<Box<dyn VisionReceiver>, FleetError> {
        self.sim.vision_receiver()
    }
}
