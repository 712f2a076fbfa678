//! Everything a command handler works with: the settings, the registered
//! commands, the flash device and the link to the host.

use std::time::Duration;

use crate::{
    commands::Registry,
    error::Result,
    layout::MemoryLayout,
    platform::{Flash, Transport},
    settings::Settings,
};

/// Reply to a command that completed.
pub const TXT_SUCCESS: &str = "\r\nOK\r\n";
/// Sent right before the device expects a block of raw bytes.
pub const TXT_READY: &str = "\r\nready\r\n";
/// Sent before every command line is read.
pub const TXT_PROMPT: &str = "\r\n> ";
/// Last words before the shell hands over to the application.
pub const TXT_FAREWELL: &str = "Exiting\r\n\r\n";

pub struct Session {
    settings: Settings,
    registry: Registry,
    flash: Box<dyn Flash>,
    transport: Box<dyn Transport>,
}
impl Session {
    /// A session serving the standard set of commands.
    pub fn new(settings: Settings, flash: Box<dyn Flash>, transport: Box<dyn Transport>) -> Self {
        Session::with_registry(settings, Registry::standard(), flash, transport)
    }

    pub fn with_registry(
        settings: Settings,
        registry: Registry,
        flash: Box<dyn Flash>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Session {
            settings,
            registry,
            flash,
            transport,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.settings.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn flash(&self) -> &dyn Flash {
        self.flash.as_ref()
    }

    pub fn flash_mut(&mut self) -> &mut dyn Flash {
        self.flash.as_mut()
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.send(bytes)?;
        Ok(())
    }

    pub fn reply(&mut self, text: &str) -> Result<()> {
        self.send(text.as_bytes())
    }

    /// Fill `buf` from the host, waiting at most `timeout` (forever when
    /// `None`).
    pub fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<()> {
        self.transport.receive(buf, timeout)?;
        Ok(())
    }

    /// Fill `buf` with transfer payload, bounded by the transfer timeout.
    pub fn receive_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        let timeout = self.settings.transfer_timeout;
        self.receive(buf, Some(timeout))
    }

    pub fn into_parts(self) -> (Settings, Box<dyn Flash>, Box<dyn Transport>) {
        (self.settings, self.flash, self.transport)
    }
}
