//! Persistence of fleet configurations.
//!
//! Each fleet gets its own directory, named after the fleet, under the fleets
//! directory:
//!
//! ```text
//! <fleets_dir>/
//!   hive1/
//!     config.toml          [Network] size, [WIFI] SSID/password, [MQTT] username/password
//!     BiosensorsNetwork.h  generated firmware header
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::config::{validate_name, ConfigSource};
use crate::error::{Error, Result};
use crate::header::{self, HEADER_FILENAME};
use crate::utils::{Connector, PortDescriptor, Transport};
use crate::Config;

pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct FleetStore {
    root: PathBuf,
}
impl FleetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FleetStore { root: root.into() }
    }

    pub fn fleet_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.fleet_dir(name).join(CONFIG_FILENAME)
    }

    pub fn header_path(&self, name: &str) -> PathBuf {
        self.fleet_dir(name).join(HEADER_FILENAME)
    }

    /// `true` when a configuration was saved for `name`. Never `true` for a
    /// name that is not a valid fleet name.
    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.config_path(name).is_file()
    }

    /// Loads the configuration of fleet `name`.
    ///
    /// Returns `Ok(None)` when the fleet is unknown. A fleet directory without
    /// a readable `config.toml` is reported as [`Error::ConfigCorrupted`], and
    /// a name that cannot be a fleet directory as [`Error::InvalidConfig`].
    pub fn load(&self, name: &str) -> Result<Option<Config>> {
        validate_name(name)?;
        let path = self.config_path(name);
        if !path.exists() {
            if !self.fleet_dir(name).exists() {
                return Ok(None);
            }
            return Err(Error::ConfigCorrupted {
                name: name.to_string(),
                reason: format!(
                    "{} is missing, the other files are still in {}",
                    CONFIG_FILENAME,
                    self.fleet_dir(name).display()
                ),
            });
        }
        debug!("loading {}", path.display());
        ConfigSource::FromFile(path).resolve(&NoDevice, None).map(Some)
    }

    /// Saves `config`, replacing any previous configuration with that name.
    pub fn save(&self, config: &Config) -> Result<PathBuf> {
        let dir = self.fleet_dir(config.name());
        fs::create_dir_all(&dir)?;
        let path = dir.join(CONFIG_FILENAME);
        fs::write(&path, toml::to_string(&config.to_file())?)?;
        info!("saved {}", path.display());
        Ok(path)
    }

    /// Removes the whole directory of fleet `name`. Returns `false` when there
    /// was nothing to delete.
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let dir = self.fleet_dir(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        info!("deleted {}", dir.display());
        Ok(true)
    }

    /// Generates the firmware header of `config` in the fleet directory.
    pub fn write_header(&self, config: &Config) -> Result<PathBuf> {
        let dir = self.fleet_dir(config.name());
        fs::create_dir_all(&dir)?;
        let path = dir.join(HEADER_FILENAME);
        if path.exists() {
            info!("Regenerating header file {}", path.display());
        } else {
            info!("Generating header file {}", path.display());
        }
        fs::write(&path, header::render(config))?;
        Ok(path)
    }

    /// Generates the header and copies it into the `include` directory of the
    /// firmware project, where the build picks it up.
    pub fn install_header(&self, config: &Config, project_dir: &Path) -> Result<PathBuf> {
        let generated = self.write_header(config)?;
        let include = project_dir.join("include");
        fs::create_dir_all(&include)?;
        let target = include.join(HEADER_FILENAME);
        fs::copy(&generated, &target)?;
        info!("installed {}", target.display());
        Ok(target)
    }
}

/// Files never need a device.
struct NoDevice;
impl Connector for NoDevice {
    fn open(&self, _port: &PortDescriptor) -> Result<Box<dyn Transport>> {
        Err(Error::NoDeviceFound { index: None })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
