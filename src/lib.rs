//! # Rust ADE7753 Single-Phase Multifunction Metering IC with SPI Driver
//!
//! This is a platform-agnostic Rust driver for the ADE7753 Single-Phase Multifunction Metering IC,
//! using the [`embedded-hal`](https://github.com/rust-embedded/embedded-hal) traits.
//!
//! This driver allows you to:
//!
//! - Initialize and configure the device, including a software reset.
//! - Read and write every register of the chip with the right width and signedness.
//! - Enable/disable the filters, the converters and the other MODE features.
//! - Enable/disable interrupt sources and consume status events without losing them.
//! - Get RMS values, line frequency, energies and the power factor from the chip.
//! - Keep the latest measurements in a small circular buffer (see the `display` module).
//!
//! ## The device
//!
//! The ADE7753 features proprietary ADCs and DSP for high accuracy over large variations in
//! environmental conditions and time. It provides active, reactive and apparent energy
//! measurement, line-cycle energy accumulation, RMS calculation on the current and voltage
//! channels, zero-crossing detection, period measurement and an on-chip temperature sensor. All
//! of it is accessed through a 8/16/24-bit register map over SPI.
//!
//! ##### Datasheets:
//!
//! - [ADE7753 (Rev. C)](https://www.analog.com/media/en/technical-documentation/data-sheets/ADE7753.pdf)
//!
//! ## Usage
//!
//! The raw RMS and energy registers have board-dependent units. The scale factors in
//! [`Calibration`] default to `1.0`, so that the readings are raw register values until a
//! calibration against a reference load is done.
//!
//! ```ignore
//! use ade7753::*;
//! use ade7753::display::{DisplayBuffer, Slot};
//!
//! // Initialization
//! let config = Config::default();
//! let calibration = Calibration::default();
//! let mut meter = Ade7753::new(spi, cs);
//! meter.init(&mut delay, config, calibration).unwrap();
//!
//! // Measurement over 100 half line cycles
//! let mut buffer = DisplayBuffer::<4>::new();
//! let measurement = meter.measure(&mut delay, &mut clock, 100).unwrap();
//! buffer.update(measurement, Slot::Next, true);
//! ```
//!

#![no_std]

use embedded_hal::blocking::spi;
use embedded_hal::digital::v2::OutputPin;

pub use measurement::LineCycleReading;
pub use register::*;

pub mod display;
mod ade7753;
mod measurement;
mod register;

/// Millisecond timestamp used by the driver.
pub type Instant = fugit::TimerInstantU32<1_000>;

/// Millisecond duration used by the driver.
pub type Duration = fugit::MillisDurationU32;

/// Source of the timestamps stored in measurements and returned when line cycle accumulation
/// starts.
pub trait Clock {
    /// Returns the current time.
    fn now(&mut self) -> Instant;
}

/// Downstream consumer of the measurements, e.g. a message broker client. The wire format is
/// entirely up to the implementation.
pub trait Publisher {
    type Error;

    /// Serializes and sends a measurement to the given topic.
    fn publish(&mut self, topic: &str, measurement: &Measurement) -> Result<(), Self::Error>;
}

/// Represents a single ADE7753 Single-Phase Multifunction Metering IC with SPI.
pub struct Ade7753<SPI, CS> {
    spi: SPI,
    cs: CS,
    config: Config,
    calibration: Calibration,
    mode: ModeBits,
    irqen: InterruptBits,
    pending: InterruptBits
}

impl<SPI, CS, S, P> Ade7753<SPI, CS>
    where
        SPI: spi::Transfer<u8, Error=S>,
        CS: OutputPin<Error=P> {

    /// Creates a new [`Ade7753`] instance, given the SPI peripheral and the CS output pin. The
    /// newly created instance should be initialized using [`Self::init()`].
    /// # Arguments
    /// * `spi` - The SPI interface implementing the [`spi::Transfer`] trait.
    /// * `cs` - The CS output pin implementing the [`OutputPin`] trait.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            spi,
            cs,
            config: Config::default(),
            calibration: Calibration::default(),
            mode: ModeBits::RESET_VALUE,
            irqen: InterruptBits::RESET_VALUE,
            pending: InterruptBits::empty()
        }
    }

    /// Releases the SPI peripheral and the CS output pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Returns the configuration applied by the last [`Self::init()`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the driver-side settings (polling bounds, poll interval, CLKIN frequency) without
    /// touching the chip. The register fields of the configuration are only written by
    /// [`Self::init()`].
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Returns the calibration used to scale the readings.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Replaces the calibration used to scale the readings.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Returns the last value written to or read from the MODE register.
    pub fn mode(&self) -> ModeBits {
        self.mode
    }

    /// Returns the last value written to or read from the IRQEN register.
    pub fn interrupt_enable(&self) -> InterruptBits {
        self.irqen
    }

    /// Returns the status events read from the chip and not consumed yet.
    pub fn pending_events(&self) -> InterruptBits {
        self.pending
    }
}

/// Contains the converted metrics of one acquisition cycle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Measurement {
    /// RMS voltage, scaled with [`Calibration::voltage`].
    pub voltage: f32,
    /// RMS current, scaled with [`Calibration::current`].
    pub current: f32,
    /// Line frequency in Hz.
    pub frequency: f32,
    /// Power factor over the accumulation window, between -1 and 1.
    pub power_factor: f32,
    /// Active energy accumulated over the line cycle window (LAENERGY).
    pub active_power: i32,
    /// Reactive power derived from the active and apparent line cycle energies.
    pub reactive_power: i32,
    /// Apparent energy accumulated over the line cycle window (LVAENERGY).
    pub apparent_power: i32,
    /// Content of the active energy accumulator (AENERGY).
    pub active_energy: i32,
    /// Content of the line cycle reactive energy accumulator (LVARENERGY).
    pub reactive_energy: i32,
    /// Content of the apparent energy accumulator (VAENERGY).
    pub apparent_energy: i32,
    /// Time at which the acquisition started.
    pub timestamp: Instant,
    /// Low byte of the status events consumed during the acquisition.
    pub events: u8,
    /// Raw content of the TEMP register.
    pub temperature: i8
}

/// Contains the scale factors applied to the raw register values.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Calibration {
    /// Multiplier from VRMS LSBs to Volts.
    pub voltage: f32,
    /// Multiplier from IRMS LSBs to Amperes.
    pub current: f32,
    /// Multiplier from AENERGY/RAENERGY LSBs to the active energy unit.
    pub active_energy: f32,
    /// Multiplier from VAENERGY/RVAENERGY LSBs to the apparent energy unit.
    pub apparent_energy: f32,
    /// Multiplier from LVARENERGY LSBs to the reactive energy unit.
    pub reactive_energy: f32
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            voltage: 1.0,
            current: 1.0,
            active_energy: 1.0,
            apparent_energy: 1.0,
            reactive_energy: 1.0
        }
    }
}

/// Represents the possible errors.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq)]
pub enum Error<S, P> {
    SpiError(S),
    PinError(P),
    /// The reset-complete event was not observed after a software reset.
    ResetTimeout,
    /// No zero crossing was observed within the configured number of polls.
    ZeroCrossingTimeout,
    /// The line cycle accumulation window did not close within the configured number of polls.
    AccumulationTimeout,
    /// The register cannot be written.
    ReadOnlyRegister,
    /// The requested value is reserved or cannot be applied. Nothing was written.
    InvalidConfig,
    /// A written register did not read back with the same content.
    RegisterContentMismatch
}

impl<S: core::fmt::Debug, P: core::fmt::Debug> core::fmt::Display for Error<S, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::SpiError(e) => write!(f, "SPI error: {:?}", e),
            Error::PinError(e) => write!(f, "CS pin error: {:?}", e),
            Error::ResetTimeout => write!(f, "reset did not complete"),
            Error::ZeroCrossingTimeout => write!(f, "no zero crossing observed"),
            Error::AccumulationTimeout => write!(f, "line cycle accumulation did not end"),
            Error::ReadOnlyRegister => write!(f, "register is read-only"),
            Error::InvalidConfig => write!(f, "reserved or invalid configuration value"),
            Error::RegisterContentMismatch => write!(f, "register content mismatch after write")
        }
    }
}
