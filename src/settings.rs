//! Settings of the serial link, the simulated flash device and the update
//! protocol.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::layout::MemoryLayout;

/// Largest block of data the device buffers in RAM before programming it.
pub const DEFAULT_CHUNK_SIZE: usize = 5120;

/// Longest command line accepted, terminator included.
pub const DEFAULT_MAX_LINE_LEN: usize = 128;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by the shell and its collaborators.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// File holding the content of the simulated flash device. Created fully
    /// erased when missing.
    pub flash_image: Option<String>,

    /// Size of one transfer chunk, always a non-zero multiple of 4 so that
    /// every chunk but the last one can be fed to CRC-32 as is.
    pub chunk_size: usize,
    /// Maximum length of a command line, terminator included.
    pub max_line_len: usize,
    /// How long to wait for the bytes of one chunk or of a digest.
    pub transfer_timeout: Duration,
    /// How long to wait for the next command line. `None` waits forever.
    pub line_timeout: Option<Duration>,

    /// Placement of the boot record and of the application slots.
    pub layout: MemoryLayout,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values, no path for the
    /// port and the STM32F407 memory layout.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                flash_image: None,
                chunk_size: DEFAULT_CHUNK_SIZE,
                max_line_len: DEFAULT_MAX_LINE_LEN,
                transfer_timeout: Duration::from_secs(10),
                line_timeout: None,
                layout: MemoryLayout::default(),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the file backing the simulated flash
    pub fn flash_image<'a>(mut self, flash_image: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.flash_image = Some(flash_image.into().as_ref().to_owned());
        self
    }

    /// Set the transfer chunk size. Rounded down to a multiple of 4, with 4
    /// as the smallest accepted value.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.settings.chunk_size = (chunk_size & !3).max(4);
        self
    }

    /// Set the maximum command line length
    pub fn max_line_len(mut self, max_line_len: usize) -> Self {
        self.settings.max_line_len = max_line_len.max(3);
        self
    }

    /// Set how long to wait for chunk and digest data
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.settings.transfer_timeout = timeout;
        self
    }

    /// Set how long to wait for a command line
    pub fn line_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.line_timeout = timeout;
        self
    }

    /// Set the flash memory layout
    pub fn layout(mut self, layout: MemoryLayout) -> Self {
        self.settings.layout = layout;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        SettingsBuilder::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flash_image: None,
            chunk_size: 5120,
            max_line_len: 128,
            transfer_timeout: Duration::from_secs(10),
            line_timeout: None,
            layout: MemoryLayout::stm32f407(),
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 96_000;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn serial_framing() {
    let settings = SettingsBuilder::new()
        .data_bits(DataBits::Seven)
        .flow_control(FlowControl::Hardware)
        .stop_bits(StopBits::Two)
        .parity(Parity::Even)
        .finalize();
    assert_eq!(settings.data_bits, DataBits::Seven);
    assert_eq!(settings.flow_control, FlowControl::Hardware);
    assert_eq!(settings.stop_bits, StopBits::Two);
    assert_eq!(settings.parity, Parity::Even);
}

#[test]
fn flash_image() {
    let settings = SettingsBuilder::new().flash_image("flash.bin").finalize();
    assert_eq!(settings.flash_image.unwrap(), "flash.bin");
}

#[test]
fn chunk_size_is_word_aligned() {
    assert_eq!(SettingsBuilder::new().chunk_size(1027).finalize().chunk_size, 1024);
    assert_eq!(SettingsBuilder::new().chunk_size(64).finalize().chunk_size, 64);
    assert_eq!(SettingsBuilder::new().chunk_size(3).finalize().chunk_size, 4);
    assert_eq!(SettingsBuilder::new().chunk_size(0).finalize().chunk_size, 4);
}

#[test]
fn timeouts() {
    let settings = SettingsBuilder::new()
        .transfer_timeout(Duration::from_millis(250))
        .line_timeout(Some(Duration::from_secs(1)))
        .finalize();
    assert_eq!(settings.transfer_timeout, Duration::from_millis(250));
    assert_eq!(settings.line_timeout, Some(Duration::from_secs(1)));
}
