//! Builds the firmware for one biosensor and uploads it.
//!
//! Every biosensor of a fleet runs the same firmware, except for its number in
//! the fleet which is compiled in as `DEVICE_NUMBER`. The number is handed to
//! the toolchain for each invocation and only ever reaches the environment of
//! the child process, never the one of `hivekit` itself.

use std::{
    io,
    path::PathBuf,
    process::{Command, Stdio},
};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::utils::PortDescriptor;
use crate::Settings;

// =============================================================================
// Public Interface
// =============================================================================

/// Environment variable read by PlatformIO for extra compiler flags.
pub const BUILD_FLAGS_VAR: &str = "PLATFORMIO_BUILD_FLAGS";

/// The external build-and-flash toolchain.
pub trait Toolchain {
    /// Builds the firmware with `device_index` as the device number, uploads it
    /// through `port` and waits for completion.
    ///
    /// Returns the exit code of the toolchain, `None` when it was terminated
    /// by a signal.
    fn build_and_flash(&self, device_index: u32, port: &PortDescriptor) -> io::Result<Option<i32>>;
}

/// Runs `pio run -t upload` in the firmware project.
#[derive(Debug, Clone)]
pub struct PlatformIo {
    project_dir: PathBuf,
    build_env: Option<String>,
}
impl PlatformIo {
    pub fn new(settings: &Settings) -> Self {
        PlatformIo {
            project_dir: settings.project_dir.clone(),
            build_env: settings.build_env.clone(),
        }
    }

    fn command(&self, device_index: u32, port: &PortDescriptor) -> Command {
        let mut cmd = Command::new("pio");
        cmd.args(&["run", "-t", "upload", "--upload-port", port.path()]);
        if let Some(env) = &self.build_env {
            cmd.args(&["-e", env.as_str()]);
        }
        cmd.env(BUILD_FLAGS_VAR, build_flags(device_index))
            .current_dir(&self.project_dir)
            .stdin(Stdio::null());
        cmd
    }
}
impl Toolchain for PlatformIo {
    fn build_and_flash(&self, device_index: u32, port: &PortDescriptor) -> io::Result<Option<i32>> {
        let mut cmd = self.command(device_index, port);
        debug!("{:?}", cmd);
        let status = cmd.status()?;
        Ok(status.code())
    }
}

/// The compiler flags giving a biosensor its number.
pub fn build_flags(device_index: u32) -> String {
    format!("-DDEVICE_NUMBER={}", device_index)
}

/// Flashes biosensors through a [`Toolchain`], turning anything but a clean
/// exit into [`Error::FlashFailed`].
pub struct BuildFlashInvoker<'a> {
    toolchain: &'a dyn Toolchain,
}
impl<'a> BuildFlashInvoker<'a> {
    pub fn new(toolchain: &'a dyn Toolchain) -> Self {
        BuildFlashInvoker { toolchain }
    }

    /// Flashes biosensor number `device_index` (1-based) attached to `port`.
    /// A failed upload is never retried, a half written flash needs the
    /// operator's attention.
    pub fn flash(&self, device_index: u32, port: &PortDescriptor) -> Result<()> {
        info!("Flashing biosensor #{} on {}", device_index, port);
        let status = match self.toolchain.build_and_flash(device_index, port) {
            Ok(Some(0)) => return Ok(()),
            Ok(Some(code)) => format!("exit code {}", code),
            Ok(None) => "toolchain terminated by a signal".to_string(),
            Err(e) => format!("could not run the toolchain: {}", e),
        };
        debug!("upload failed: {}", status);
        Err(Error::FlashFailed {
            index: device_index,
            status,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SettingsBuilder;
    use std::{cell::RefCell, ffi::OsStr};

    struct Recorder {
        exit: io::Result<Option<i32>>,
        calls: RefCell<Vec<(u32, String)>>,
    }
    impl Recorder {
        fn exiting(exit: io::Result<Option<i32>>) -> Self {
            Recorder {
                exit,
                calls: RefCell::new(Vec::new()),
            }
        }
    }
    impl Toolchain for Recorder {
        fn build_and_flash(&self, index: u32, port: &PortDescriptor) -> io::Result<Option<i32>> {
            self.calls.borrow_mut().push((index, port.path().to_string()));
            match &self.exit {
                Ok(code) => Ok(*code),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn zero_exit_is_success() {
        let toolchain = Recorder::exiting(Ok(Some(0)));
        let port = PortDescriptor::new("/dev/ttyUSB0");
        BuildFlashInvoker::new(&toolchain).flash(4, &port).unwrap();
        assert_eq!(*toolchain.calls.borrow(), vec![(4, "/dev/ttyUSB0".to_string())]);
    }

    #[test]
    fn non_zero_exit_is_flash_failed() {
        let toolchain = Recorder::exiting(Ok(Some(1)));
        let port = PortDescriptor::new("/dev/ttyUSB0");
        match BuildFlashInvoker::new(&toolchain).flash(2, &port) {
            Err(Error::FlashFailed { index, status }) => {
                assert_eq!(index, 2);
                assert_eq!(status, "exit code 1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_toolchain_is_flash_failed() {
        let toolchain = Recorder::exiting(Err(io::Error::new(io::ErrorKind::NotFound, "pio")));
        let port = PortDescriptor::new("/dev/ttyUSB0");
        let err = BuildFlashInvoker::new(&toolchain).flash(1, &port).unwrap_err();
        assert!(matches!(err, Error::FlashFailed { index: 1, .. }));
    }

    #[test]
    fn device_number_only_reaches_the_child_environment() {
        let settings = SettingsBuilder::new()
            .project_dir("ESPCode")
            .build_env("debug")
            .finalize();
        let pio = PlatformIo::new(&settings);
        let port = PortDescriptor::new("/dev/ttyUSB0");

        let cmd = pio.command(7, &port);
        let envs: Vec<_> = cmd.get_envs().collect();
        assert_eq!(
            envs,
            vec![(OsStr::new(BUILD_FLAGS_VAR), Some(OsStr::new("-DDEVICE_NUMBER=7")))]
        );
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec!["run", "-t", "upload", "--upload-port", "/dev/ttyUSB0", "-e", "debug"]
        );
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("ESPCode")));

        // A second device gets its own number, nothing carried over.
        let cmd = pio.command(8, &port);
        let envs: Vec<_> = cmd.get_envs().collect();
        assert_eq!(envs[0].1, Some(OsStr::new("-DDEVICE_NUMBER=8")));
    }
}
