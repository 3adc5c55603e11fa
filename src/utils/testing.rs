//! In-memory stand-ins for the serial ports, used by the unit tests.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Cursor, ErrorKind, Read, Write},
    rc::Rc,
    thread,
    time::Duration,
};

use super::ports::{Connector, PortDescriptor, PortEnumerator, Transport};
use crate::error::{Error, Result};

/// A transport replaying a fixed input and recording everything written.
pub(crate) struct ScriptedTransport {
    input: Cursor<Vec<u8>>,
    written: Rc<RefCell<Vec<u8>>>,
    /// Once the input is replayed, time out like an idle serial port instead
    /// of reporting the end of the stream.
    silent_at_end: bool,
}
impl ScriptedTransport {
    pub(crate) fn new(input: impl Into<Vec<u8>>) -> Self {
        ScriptedTransport {
            input: Cursor::new(input.into()),
            written: Rc::new(RefCell::new(Vec::new())),
            silent_at_end: false,
        }
    }

    pub(crate) fn then_silent(mut self) -> Self {
        self.silent_at_end = true;
        self
    }

    /// Shared view on the bytes written to the transport.
    pub(crate) fn written(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.written)
    }
}
impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.input.read(buf)? {
            0 if self.silent_at_end => {
                thread::sleep(Duration::from_millis(5));
                Err(io::Error::new(ErrorKind::TimedOut, "no data"))
            }
            n => Ok(n),
        }
    }
}
impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out the queued transports, one per `open`.
pub(crate) struct LoopbackConnector {
    transports: RefCell<VecDeque<ScriptedTransport>>,
}
impl LoopbackConnector {
    pub(crate) fn new(transports: Vec<ScriptedTransport>) -> Self {
        LoopbackConnector {
            transports: RefCell::new(transports.into()),
        }
    }
}
impl Connector for LoopbackConnector {
    fn open(&self, _port: &PortDescriptor) -> Result<Box<dyn Transport>> {
        match self.transports.borrow_mut().pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::NoDeviceFound { index: None }),
        }
    }
}

/// Always reports the same list of ports.
pub(crate) struct FixedPorts(pub(crate) Vec<&'static str>);
impl PortEnumerator for FixedPorts {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(self.0.iter().map(|path| PortDescriptor::new(*path)).collect())
    }
}
