//! Provisioning of a whole fleet, one biosensor after the other.
//!
//! The operator connects the biosensors one at a time, so the run is strictly
//! sequential: biosensor `i + 1` is only asked for once biosensor `i` is done,
//! and its serial port is closed by then. The first biosensor that does not
//! end up [`Flashed`](DeviceResult::Flashed) stops the run; a fleet with a
//! misconfigured biosensor is not considered deployed.

use std::io;

use console::style;
use log::{info, warn};

use crate::broker::{self, BrokerProbe};
use crate::error::{Error, Result};
use crate::flasher::Toolchain;
use crate::provisioning::{DeviceOutcome, DeviceResult, ProvisioningSession, SessionContext};
use crate::store::FleetStore;
use crate::utils::{wait_for_answer, Answer, Connector, PortEnumerator};
use crate::{Config, Settings};

// =============================================================================
// Public Interface
// =============================================================================

/// The human doing the provisioning.
pub trait Operator {
    /// Returns once biosensor `index` (out of `size`) is connected, or
    /// [`Error::Aborted`] if the operator gave up.
    fn device_ready(&self, index: u32, size: u32) -> Result<()>;
}

/// Asks on the terminal: `Enter` when the biosensor is plugged, `Esc` to stop.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermOperator;
impl Operator for TermOperator {
    fn device_ready(&self, index: u32, size: u32) -> Result<()> {
        println!(
            "[HK] 🔌 Please insert biosensor #{}/{} and press {} ({} to abort)...",
            style(index).cyan(),
            size,
            style("Enter").cyan(),
            style("Esc").cyan()
        );
        match wait_for_answer() {
            Ok(Answer::Proceed) => Ok(()),
            Ok(Answer::Cancel) => Err(Error::Aborted { index }),
            Err(e) => Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                e.to_string(),
            ))),
        }
    }
}

/// Runs a [`ProvisioningSession`] for every biosensor of a fleet.
pub struct FleetOrchestrator<'a> {
    settings: &'a Settings,
    ports: &'a dyn PortEnumerator,
    toolchain: &'a dyn Toolchain,
    connector: &'a dyn Connector,
    operator: &'a dyn Operator,
}
impl<'a> FleetOrchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        ports: &'a dyn PortEnumerator,
        toolchain: &'a dyn Toolchain,
        connector: &'a dyn Connector,
        operator: &'a dyn Operator,
    ) -> Self {
        FleetOrchestrator {
            settings,
            ports,
            toolchain,
            connector,
            operator,
        }
    }

    /// Gets everything ready before the first biosensor is flashed: checks that
    /// the broker can be reached, when a probe is given, then generates the
    /// firmware header of `config` and installs it in the firmware project.
    pub fn prepare(
        &self,
        config: &Config,
        store: &FleetStore,
        probe: Option<&dyn BrokerProbe>,
    ) -> Result<()> {
        if let Some(probe) = probe {
            info!("Checking broker {}", probe.address());
            broker::ensure_reachable(probe, config.broker())?;
        }
        store.install_header(config, &self.settings.project_dir)?;
        Ok(())
    }

    /// Provisions biosensors `1..=size` in order and returns their outcomes.
    ///
    /// Stops right after the first outcome that is not
    /// [`DeviceResult::Flashed`]; that outcome is the last one returned.
    pub fn run(&mut self, config: &Config) -> Result<Vec<DeviceOutcome>> {
        let size = config.size();
        let mut outcomes = Vec::with_capacity(size as usize);

        info!(
            "Provisioning {} biosensors of network {} (verify connectivity: {})",
            size,
            config.name(),
            self.settings.verify_connectivity
        );

        for index in 1..=size {
            self.operator.device_ready(index, size)?;

            let outcome = ProvisioningSession::new(SessionContext {
                index,
                settings: self.settings,
                ports: self.ports,
                toolchain: self.toolchain,
                connector: self.connector,
            })
            .run();

            let done = outcome.is_done();
            outcomes.push(outcome);
            if !done {
                warn!("Stopping the run after biosensor #{}", index);
                return Ok(outcomes);
            }
        }

        println!(
            "[HK] 🐝 All {} biosensors of {} have been programmed!",
            size,
            style(config.name()).green()
        );
        Ok(outcomes)
    }
}

/// The first failed outcome of a run, if any.
pub fn first_failure(outcomes: &[DeviceOutcome]) -> Option<&DeviceOutcome> {
    outcomes
        .iter()
        .find(|outcome| outcome.result != DeviceResult::Flashed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{FixedPorts, LoopbackConnector, ScriptedTransport};
    use crate::utils::PortDescriptor;
    use crate::SettingsBuilder;
    use std::cell::{Cell, RefCell};

    /// Fails the upload of the given biosensor numbers.
    struct FlakyToolchain {
        failing: Vec<u32>,
        flashed: RefCell<Vec<u32>>,
    }
    impl Toolchain for FlakyToolchain {
        fn build_and_flash(&self, index: u32, _port: &PortDescriptor) -> io::Result<Option<i32>> {
            self.flashed.borrow_mut().push(index);
            Ok(Some(if self.failing.contains(&index) { 1 } else { 0 }))
        }
    }

    struct CountingOperator {
        asked: Cell<u32>,
        abort_at: Option<u32>,
    }
    impl Operator for CountingOperator {
        fn device_ready(&self, index: u32, _size: u32) -> Result<()> {
            self.asked.set(self.asked.get() + 1);
            match self.abort_at {
                Some(at) if at == index => Err(Error::Aborted { index }),
                _ => Ok(()),
            }
        }
    }

    fn config(size: u32) -> Config {
        Config::new("hive1", size, "bees", "honey", "alice", "s3cret").unwrap()
    }

    #[test]
    fn every_device_gets_its_own_number() {
        let settings = SettingsBuilder::new().finalize();
        let toolchain = FlakyToolchain {
            failing: vec![],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: None,
        };
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let connector = LoopbackConnector::new(vec![]);
        let mut fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        let outcomes = fleet.run(&config(4)).unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(DeviceOutcome::is_done));
        assert_eq!(*toolchain.flashed.borrow(), vec![1, 2, 3, 4]);
        assert_eq!(operator.asked.get(), 4);
        assert_eq!(first_failure(&outcomes), None);
    }

    #[test]
    fn running_twice_gives_the_same_outcomes() {
        let settings = SettingsBuilder::new().finalize();
        let toolchain = FlakyToolchain {
            failing: vec![],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: None,
        };
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let connector = LoopbackConnector::new(vec![]);
        let mut fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        let first = fleet.run(&config(2)).unwrap();
        let second = fleet.run(&config(2)).unwrap();

        assert_eq!(first, second);
        assert_eq!(*toolchain.flashed.borrow(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn flash_failure_stops_the_run() {
        let settings = SettingsBuilder::new().finalize();
        let toolchain = FlakyToolchain {
            failing: vec![2],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: None,
        };
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let connector = LoopbackConnector::new(vec![]);
        let mut fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        let outcomes = fleet.run(&config(3)).unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_done());
        assert_eq!(outcomes[1].index, 2);
        assert!(matches!(outcomes[1].result, DeviceResult::FlashFailed(_)));
        assert_eq!(*toolchain.flashed.borrow(), vec![1, 2]);
        assert_eq!(operator.asked.get(), 2);
        assert_eq!(first_failure(&outcomes).map(|o| o.index), Some(2));
    }

    #[test]
    fn handshake_failure_stops_the_run() {
        let settings = SettingsBuilder::new()
            .verify_connectivity(true)
            .settle_delay(std::time::Duration::from_millis(0))
            .finalize();
        let toolchain = FlakyToolchain {
            failing: vec![],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: None,
        };
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let connector = LoopbackConnector::new(vec![
            ScriptedTransport::new("WifiConnected\nMqttConnected\n"),
            ScriptedTransport::new("WifiTimeout\n"),
            ScriptedTransport::new("WifiConnected\nMqttConnected\n"),
        ]);
        let mut fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        let outcomes = fleet.run(&config(3)).unwrap();

        assert_eq!(
            outcomes.iter().map(|o| o.result.clone()).collect::<Vec<_>>(),
            vec![DeviceResult::Flashed, DeviceResult::WifiFailed]
        );
    }

    #[test]
    fn operator_abort_is_an_error() {
        let settings = SettingsBuilder::new().finalize();
        let toolchain = FlakyToolchain {
            failing: vec![],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: Some(2),
        };
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let connector = LoopbackConnector::new(vec![]);
        let mut fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        let err = fleet.run(&config(3)).unwrap_err();
        assert!(matches!(err, Error::Aborted { index: 2 }));
        assert_eq!(*toolchain.flashed.borrow(), vec![1]);
    }

    #[test]
    fn prepare_installs_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsBuilder::new()
            .project_dir(dir.path().join("ESPCode"))
            .finalize();
        let store = FleetStore::new(dir.path().join("fleets"));
        let toolchain = FlakyToolchain {
            failing: vec![],
            flashed: RefCell::new(vec![]),
        };
        let operator = CountingOperator {
            asked: Cell::new(0),
            abort_at: None,
        };
        let ports = FixedPorts(vec![]);
        let connector = LoopbackConnector::new(vec![]);
        let fleet = FleetOrchestrator::new(&settings, &ports, &toolchain, &connector, &operator);

        fleet.prepare(&config(2), &store, None).unwrap();

        assert!(dir
            .path()
            .join("ESPCode/include/BiosensorsNetwork.h")
            .is_file());
        assert!(store.header_path("hive1").is_file());
    }
}
