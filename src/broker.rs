//! Reachability check of the MQTT broker, done once before any biosensor is
//! flashed.
//!
//! `hivekit` does not speak MQTT. The check only tells whether this host can
//! open a connection to the broker at all; whether the credentials are right
//! is confirmed later by the biosensors themselves during the handshake.

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info};

use crate::config::BrokerCredentials;
use crate::error::{Error, Result};
use crate::Settings;

pub trait BrokerProbe {
    /// Attempts a connection to the broker on behalf of `credentials`.
    fn test_connection(&self, credentials: &BrokerCredentials) -> bool;

    /// Address shown to the operator when the broker cannot be reached.
    fn address(&self) -> String;
}

/// Opens a TCP connection to the broker host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}
impl TcpProbe {
    pub fn new(settings: &Settings) -> Self {
        TcpProbe {
            host: settings.broker_host.clone(),
            port: settings.broker_port,
            timeout: Duration::from_secs(5),
        }
    }
}
impl BrokerProbe for TcpProbe {
    fn test_connection(&self, credentials: &BrokerCredentials) -> bool {
        debug!(
            "checking broker {} for user {}",
            self.address(),
            credentials.username()
        );
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                info!("could not resolve {}: {}", self.host, e);
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(e) => info!("connection to {} failed: {}", addr, e),
            }
        }
        false
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Fails with [`Error::BrokerUnreachable`] when the probe cannot connect.
pub fn ensure_reachable(probe: &dyn BrokerProbe, credentials: &BrokerCredentials) -> Result<()> {
    if probe.test_connection(credentials) {
        Ok(())
    } else {
        Err(Error::BrokerUnreachable {
            address: probe.address(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, SettingsBuilder};
    use std::net::TcpListener;

    fn credentials() -> BrokerCredentials {
        Config::new("hive1", 1, "bees", "honey", "alice", "s3cret")
            .unwrap()
            .broker()
            .clone()
    }

    #[test]
    fn listening_broker_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let settings = SettingsBuilder::new().broker("127.0.0.1", port).finalize();

        ensure_reachable(&TcpProbe::new(&settings), &credentials()).unwrap();
    }

    #[test]
    fn closed_port_is_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let settings = SettingsBuilder::new().broker("127.0.0.1", port).finalize();

        match ensure_reachable(&TcpProbe::new(&settings), &credentials()) {
            Err(Error::BrokerUnreachable { address }) => {
                assert_eq!(address, format!("127.0.0.1:{}", port))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
