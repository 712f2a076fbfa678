//! A session wired to a simulated flash and a scripted host, for unit tests.

use std::{sync::Arc, time::Duration};

use crate::{
    platform::{FlashStats, MemoryTransport, SimFlash},
    session::Session,
    settings::SettingsBuilder,
};

pub(crate) struct TestBench {
    pub session: Session,
    pub host: MemoryTransport,
    pub stats: Arc<FlashStats>,
}
impl TestBench {
    pub fn new() -> Self {
        TestBench::with_chunk_size(64)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        let settings = SettingsBuilder::new()
            .chunk_size(chunk_size)
            .transfer_timeout(Duration::from_millis(10))
            .finalize();
        let flash = SimFlash::new(settings.layout.sectors.clone());
        let stats = flash.stats();
        let host = MemoryTransport::new();
        let session = Session::new(settings, Box::new(flash), Box::new(host.clone()));
        TestBench {
            session,
            host,
            stats,
        }
    }

    pub fn read(&self, address: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.session.flash().read(address, &mut buf).unwrap();
        buf
    }

    /// Program bytes straight into flash, bypassing the protocol.
    pub fn preload(&mut self, address: u32, bytes: &[u8]) {
        self.session.flash_mut().program(address, bytes).unwrap();
    }
}
