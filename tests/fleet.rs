use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Cursor, Read, Write},
    rc::Rc,
    time::Duration,
};

use hivekit::{
    Config, Connector, DeviceResult, Error, FleetOrchestrator, FleetStore, Operator,
    PortDescriptor, PortEnumerator, Result, Settings, SettingsBuilder, Toolchain, Transport,
};

// =============================================================================
// Test doubles
// =============================================================================

struct OnePort;
impl PortEnumerator for OnePort {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(vec![PortDescriptor::new("/dev/ttyACM0")])
    }
}

/// Records the device numbers it was asked to build, fails the listed ones.
#[derive(Default)]
struct RecordingToolchain {
    failing: Vec<u32>,
    builds: RefCell<Vec<u32>>,
}
impl Toolchain for RecordingToolchain {
    fn build_and_flash(&self, index: u32, port: &PortDescriptor) -> io::Result<Option<i32>> {
        assert_eq!(port.path(), "/dev/ttyACM0");
        self.builds.borrow_mut().push(index);
        Ok(Some(if self.failing.contains(&index) { 2 } else { 0 }))
    }
}

struct Firmware {
    output: Cursor<Vec<u8>>,
    commands: Rc<RefCell<Vec<u8>>>,
}
impl Read for Firmware {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.output.read(buf)
    }
}
impl Write for Firmware {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commands.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One scripted firmware per opened port.
#[derive(Default)]
struct ScriptedDevices {
    scripts: RefCell<VecDeque<&'static str>>,
    commands: Rc<RefCell<Vec<u8>>>,
}
impl ScriptedDevices {
    fn new(scripts: &[&'static str]) -> Self {
        ScriptedDevices {
            scripts: RefCell::new(scripts.iter().copied().collect()),
            commands: Rc::default(),
        }
    }

    fn commands(&self) -> String {
        String::from_utf8(self.commands.borrow().clone()).unwrap()
    }
}
impl Connector for ScriptedDevices {
    fn open(&self, _port: &PortDescriptor) -> Result<Box<dyn Transport>> {
        match self.scripts.borrow_mut().pop_front() {
            Some(script) => Ok(Box::new(Firmware {
                output: Cursor::new(script.as_bytes().to_vec()),
                commands: Rc::clone(&self.commands),
            })),
            None => Err(Error::NoDeviceFound { index: None }),
        }
    }
}

struct AlwaysReady;
impl Operator for AlwaysReady {
    fn device_ready(&self, _index: u32, _size: u32) -> Result<()> {
        Ok(())
    }
}

fn hive1(size: u32) -> Config {
    Config::new("hive1", size, "bees", "honey", "alice", "s3cret").unwrap()
}

fn verifying() -> Settings {
    SettingsBuilder::new()
        .verify_connectivity(true)
        .settle_delay(Duration::from_millis(0))
        .finalize()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn build_parameter_is_the_device_number() {
    let settings = SettingsBuilder::new().finalize();
    let toolchain = RecordingToolchain::default();
    let devices = ScriptedDevices::default();
    let mut fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);

    let outcomes = fleet.run(&hive1(3)).unwrap();

    assert_eq!(*toolchain.builds.borrow(), vec![1, 2, 3]);
    assert_eq!(
        outcomes.iter().map(|o| o.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(hivekit::first_failure(&outcomes).is_none());
    assert_eq!(hivekit::build_flags(2), "-DDEVICE_NUMBER=2");
}

#[test]
fn second_flash_failure_leaves_two_outcomes() {
    let settings = SettingsBuilder::new().finalize();
    let toolchain = RecordingToolchain {
        failing: vec![2],
        ..Default::default()
    };
    let devices = ScriptedDevices::default();
    let mut fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);

    let outcomes = fleet.run(&hive1(3)).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result, DeviceResult::Flashed);
    assert_eq!(
        outcomes[1].result,
        DeviceResult::FlashFailed("exit code 2".into())
    );
    let err = hivekit::first_failure(&outcomes)
        .cloned()
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(err.exit_code(), 6);
}

#[test]
fn verified_fleet_talks_to_every_device() {
    let settings = verifying();
    let toolchain = RecordingToolchain::default();
    let devices = ScriptedDevices::new(&[
        "[DEBUG] booting\nWifiConnected\nMqttConnected!\n",
        "\nWifiConnected\n[DEBUG] MQTT Error code: -2\nMqttConnected\n",
    ]);
    let mut fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);

    let outcomes = fleet.run(&hive1(2)).unwrap();

    assert!(outcomes.iter().all(|o| o.is_done()));
    assert_eq!(
        devices.commands(),
        "managedMode\nconnectWifi\nconnectMqtt\n".repeat(2)
    );
}

#[test]
fn wifi_timeout_never_reaches_the_broker() {
    let settings = verifying();
    let toolchain = RecordingToolchain::default();
    let devices = ScriptedDevices::new(&["[DEBUG] Connecting to WiFi...\nWifiTimeout\n"]);
    let mut fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);

    let outcomes = fleet.run(&hive1(2)).unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, DeviceResult::WifiFailed);
    assert!(!devices.commands().contains("connectMqtt"));
    assert_eq!(*toolchain.builds.borrow(), vec![1]);
}

#[test]
fn repeated_runs_are_identical() {
    let settings = SettingsBuilder::new().finalize();
    let toolchain = RecordingToolchain::default();
    let devices = ScriptedDevices::default();
    let mut fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);

    let first = fleet.run(&hive1(2)).unwrap();
    let second = fleet.run(&hive1(2)).unwrap();

    assert_eq!(first, second);
}

#[test]
fn prepared_fleet_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let settings = SettingsBuilder::new()
        .project_dir(dir.path().join("ESPCode"))
        .finalize();
    let store = FleetStore::new(dir.path());
    let config = hive1(4);
    assert_eq!(config.broker().topic_prefix(), "alice/hive1/");

    store.save(&config).unwrap();
    let toolchain = RecordingToolchain::default();
    let devices = ScriptedDevices::default();
    let fleet = FleetOrchestrator::new(&settings, &OnePort, &toolchain, &devices, &AlwaysReady);
    fleet.prepare(&config, &store, None).unwrap();

    let loaded = store.load("hive1").unwrap().unwrap();
    assert_eq!(loaded, config);
    let header =
        std::fs::read_to_string(dir.path().join("ESPCode/include/BiosensorsNetwork.h")).unwrap();
    assert!(header.contains("#define TOPIC_PREFIX \"alice/hive1/\""));
    assert!(header.contains("#define N_SIZE 4"));
}
