/// Configuration struct.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone)]
pub struct Config {
    /// Initial content of the MODE register, without the waveform rate and source fields. The
    /// default is the datasheet reset value, with the CF output and the sag detection disabled.
    pub mode: ModeBits,
    /// Interrupt sources routed to the IRQ pin. The status register latches every event anyway,
    /// so this only matters when the IRQ output is wired.
    pub interrupts: InterruptBits,
    /// Update rate of the WAVEFORM register.
    pub waveform_rate: WaveformDataRate,
    /// Source of the samples stored in the WAVEFORM register.
    pub waveform_source: WaveformDataSource,
    /// Number of status polls performed while waiting for a zero crossing.
    pub zero_cross_poll_limit: u32,
    /// Number of status polls performed while waiting for the end of a line cycle accumulation
    /// window.
    pub cycle_end_poll_limit: u32,
    /// Delay between two status polls, in microseconds.
    pub poll_interval_us: u32,
    /// Frequency of the clock on the CLKIN pin, in Hz.
    pub clkin_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ModeBits::DISCF | ModeBits::DISSAG,
            interrupts: InterruptBits::empty(),
            waveform_rate: WaveformDataRate::default(),
            waveform_source: WaveformDataSource::default(),
            zero_cross_poll_limit: 2_000,
            cycle_end_poll_limit: 100_000,
            poll_interval_us: 10,
            clkin_hz: CLKIN_HZ,
        }
    }
}

impl From<Config> for ModeBits {
    fn from(x: Config) -> Self {
        let fields = ModeBits::DTRT | ModeBits::WAVSEL | ModeBits::SWRST | ModeBits::TEMPSEL;
        (x.mode - fields) | x.waveform_rate.bits() | x.waveform_source.bits()
    }
}

/// Nominal CLKIN frequency of the ADE7753, in Hz.
pub const CLKIN_HZ: u32 = 3_579_545;

/// Minimum time without SPI transfers after a software reset, in microseconds.
pub const RESET_QUIESCE_US: u32 = 18;

/// The PERIOD register counts in units of CLKIN/8.
pub(crate) const PERIOD_CLKIN_DIVIDER: u32 = 8;

bitflags::bitflags! {
    /// MODE register bits (0x09).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ModeBits: u16 {
        /// HPF in Channel 1 is disabled when this bit is set.
        const DISHPF   = 1 << 0;
        /// LPF after the multiplier (LPF2) is disabled when this bit is set.
        const DISLPF2  = 1 << 1;
        /// Frequency output CF is disabled when this bit is set.
        const DISCF    = 1 << 2;
        /// Line voltage sag detection is disabled when this bit is set.
        const DISSAG   = 1 << 3;
        /// Both A/D converters are turned off when this bit is set.
        const ASUSPEND = 1 << 4;
        /// Starts a temperature conversion. Cleared by the chip once the conversion is done.
        const TEMPSEL  = 1 << 5;
        /// Software chip reset.
        const SWRST    = 1 << 6;
        /// Line cycle energy accumulation mode.
        const CYCMODE  = 1 << 7;
        /// Channel 1 inputs are internally shorted together.
        const DISCH1   = 1 << 8;
        /// Channel 2 inputs are internally shorted together.
        const DISCH2   = 1 << 9;
        /// Swaps the analog inputs of the two channels.
        const SWAP     = 1 << 10;
        /// Waveform register update rate (2-bit field).
        const DTRT     = 0b11 << 11;
        /// Waveform register source (2-bit field).
        const WAVSEL   = 0b11 << 13;
        /// Only positive active power is accumulated.
        const POAM     = 1 << 15;
    }

    /// Bits shared by the IRQEN (0x0A), STATUS (0x0B) and RSTSTATUS (0x0C) registers.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct InterruptBits: u16 {
        /// Active energy register more than half full.
        const AEHF   = 1 << 0;
        /// Sag on the line voltage.
        const SAG    = 1 << 1;
        /// End of a line cycle accumulation window.
        const CYCEND = 1 << 2;
        /// New data in the waveform register.
        const WSMP   = 1 << 3;
        /// Zero crossing of the voltage waveform.
        const ZX     = 1 << 4;
        /// Temperature conversion result available.
        const TEMP   = 1 << 5;
        /// End of a hardware or software reset. Has no effect in IRQEN.
        const RESET  = 1 << 6;
        /// Active energy register overflow.
        const AEOF   = 1 << 7;
        /// Channel 2 sample exceeded VPKLVL.
        const PKV    = 1 << 8;
        /// Channel 1 sample exceeded IPKLVL.
        const PKI    = 1 << 9;
        /// Apparent energy register more than half full.
        const VAEHF  = 1 << 10;
        /// Apparent energy register overflow.
        const VAEOF  = 1 << 11;
        /// Missing zero crossings for the ZXTOUT period.
        const ZXTO   = 1 << 12;
        /// Active power changed from negative to positive.
        const PPOS   = 1 << 13;
        /// Active power changed from positive to negative.
        const PNEG   = 1 << 14;
    }
}

impl ModeBits {
    /// Datasheet value of MODE after a reset.
    pub const RESET_VALUE: ModeBits = ModeBits::DISCF.union(ModeBits::DISSAG);
}

impl InterruptBits {
    /// Datasheet value of IRQEN after a reset.
    pub const RESET_VALUE: InterruptBits = InterruptBits::RESET;
}

#[cfg(feature = "defmt")]
impl defmt::Format for ModeBits {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ModeBits({=u16:#x})", self.bits())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InterruptBits {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "InterruptBits({=u16:#x})", self.bits())
    }
}

/// Represents the possible waveform register update rates.
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaveformDataRate {
    /// 27.9 kSPS (CLKIN/128).
    #[default]
    Ksps27_9 = 0x00,
    /// 14 kSPS (CLKIN/256).
    Ksps14 = 0x01,
    /// 7 kSPS (CLKIN/512).
    Ksps7 = 0x02,
    /// 3.5 kSPS (CLKIN/1024).
    Ksps3_5 = 0x03,
}

impl WaveformDataRate {
    /// Returns the DTRT field value in MODE register position.
    pub fn bits(self) -> ModeBits {
        ModeBits::from_bits_truncate((self as u16) << 11)
    }
}

impl TryFrom<u8> for WaveformDataRate {
    type Error = ();

    fn try_from(x: u8) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(WaveformDataRate::Ksps27_9),
            0x01 => Ok(WaveformDataRate::Ksps14),
            0x02 => Ok(WaveformDataRate::Ksps7),
            0x03 => Ok(WaveformDataRate::Ksps3_5),
            _ => Err(())
        }
    }
}

/// Represents the possible waveform register sources. Option `0x01` is reserved.
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaveformDataSource {
    /// 24 bits active power signal (output of LPF2).
    #[default]
    ActivePower = 0x00,
    /// 24 bits Channel 1.
    Channel1 = 0x02,
    /// 24 bits Channel 2.
    Channel2 = 0x03,
}

impl WaveformDataSource {
    /// Returns the WAVSEL field value in MODE register position.
    pub fn bits(self) -> ModeBits {
        ModeBits::from_bits_truncate((self as u16) << 13)
    }
}

impl TryFrom<u8> for WaveformDataSource {
    type Error = ();

    fn try_from(x: u8) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(WaveformDataSource::ActivePower),
            0x02 => Ok(WaveformDataSource::Channel1),
            0x03 => Ok(WaveformDataSource::Channel2),
            _ => Err(())
        }
    }
}

/// Chip features that can be switched on and off through a single MODE bit.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Feature {
    /// Channel 1 high-pass filter (DISHPF).
    HighPassFilter,
    /// Low-pass filter after the multiplier (DISLPF2).
    LowPassFilter2,
    /// CF frequency output (DISCF).
    FrequencyOutput,
    /// Line voltage sag detection (DISSAG).
    SagDetection,
    /// Both A/D converters (ASUSPEND).
    AdConverters,
    /// Channel 1 inputs, shorted when disabled (DISCH1).
    Channel1,
    /// Channel 2 inputs, shorted when disabled (DISCH2).
    Channel2,
    /// Swap of the Channel 1 and Channel 2 analog inputs (SWAP).
    ChannelSwap,
    /// Accumulation of positive active power only (POAM).
    OnlyPositiveAccumulation,
}

impl Feature {
    /// Returns the MODE bit controlling the feature.
    pub fn mask(self) -> ModeBits {
        match self {
            Feature::HighPassFilter => ModeBits::DISHPF,
            Feature::LowPassFilter2 => ModeBits::DISLPF2,
            Feature::FrequencyOutput => ModeBits::DISCF,
            Feature::SagDetection => ModeBits::DISSAG,
            Feature::AdConverters => ModeBits::ASUSPEND,
            Feature::Channel1 => ModeBits::DISCH1,
            Feature::Channel2 => ModeBits::DISCH2,
            Feature::ChannelSwap => ModeBits::SWAP,
            Feature::OnlyPositiveAccumulation => ModeBits::POAM
        }
    }

    /// Returns `true` if enabling the feature sets its MODE bit, `false` if it clears it.
    ///
    /// Enabling the filter, CF or sag feature writes a 1 into its `DIS*` bit.
    pub fn sets_on_enable(self) -> bool {
        !matches!(self, Feature::AdConverters | Feature::Channel1 | Feature::Channel2)
    }
}

/// Event sources shared by the interrupt enable and the status registers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// Active energy register half full (AEHF).
    ActiveEnergyHalfFull,
    /// Line voltage sag detected (SAG).
    Sag,
    /// End of a line cycle energy accumulation window (CYCEND).
    CycleEnergyAccumulationEnd,
    /// New data in the WAVEFORM register (WSMP).
    NewWaveformData,
    /// Zero crossing of the line voltage (ZX).
    ZeroCrossing,
    /// Temperature conversion result available (TEMP).
    TemperatureResult,
    /// End of a software or hardware reset (RESET). Status only, cannot be enabled.
    Reset,
    /// Active energy register overflow (AEOF).
    ActiveEnergyOverflow,
    /// Channel 2 sample above VPKLVL (PKV).
    VoltagePeak,
    /// Channel 1 sample above IPKLVL (PKI).
    CurrentPeak,
    /// Apparent energy register half full (VAEHF).
    ApparentEnergyHalfFull,
    /// Apparent energy register overflow (VAEOF).
    ApparentEnergyOverflow,
    /// No zero crossing within ZXTOUT line cycles (ZXTO).
    ZeroCrossingTimeout,
    /// Active power changed from negative to positive (PPOS).
    PowerChangeToPositive,
    /// Active power changed from positive to negative (PNEG).
    PowerChangeToNegative,
}

impl Event {
    /// Returns the status/enable bit of the event.
    pub fn mask(self) -> InterruptBits {
        match self {
            Event::ActiveEnergyHalfFull => InterruptBits::AEHF,
            Event::Sag => InterruptBits::SAG,
            Event::CycleEnergyAccumulationEnd => InterruptBits::CYCEND,
            Event::NewWaveformData => InterruptBits::WSMP,
            Event::ZeroCrossing => InterruptBits::ZX,
            Event::TemperatureResult => InterruptBits::TEMP,
            Event::Reset => InterruptBits::RESET,
            Event::ActiveEnergyOverflow => InterruptBits::AEOF,
            Event::VoltagePeak => InterruptBits::PKV,
            Event::CurrentPeak => InterruptBits::PKI,
            Event::ApparentEnergyHalfFull => InterruptBits::VAEHF,
            Event::ApparentEnergyOverflow => InterruptBits::VAEOF,
            Event::ZeroCrossingTimeout => InterruptBits::ZXTO,
            Event::PowerChangeToPositive => InterruptBits::PPOS,
            Event::PowerChangeToNegative => InterruptBits::PNEG
        }
    }

    /// Returns `false` for events that are latched in the status register but cannot raise the
    /// IRQ output.
    pub fn is_maskable(self) -> bool {
        self != Event::Reset
    }
}

/// Energy accumulators that come with both a plain and a read-and-reset register.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Active,
    Apparent,
}

impl Accumulator {
    /// Returns the register that reads the accumulator without clearing it.
    pub fn register(self) -> Register {
        match self {
            Accumulator::Active => Register::Aenergy,
            Accumulator::Apparent => Register::Vaenergy
        }
    }

    /// Returns the register that reads the accumulator and resets it to zero.
    pub fn reset_register(self) -> Register {
        match self {
            Accumulator::Active => Register::Raenergy,
            Accumulator::Apparent => Register::Rvaenergy
        }
    }
}

/// Input channels with a peak detector.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Channel 1 (current).
    Current,
    /// Channel 2 (voltage).
    Voltage,
}

impl Channel {
    pub(crate) fn peak_register(self) -> Register {
        match self {
            Channel::Current => Register::Ipeak,
            Channel::Voltage => Register::Vpeak
        }
    }

    pub(crate) fn peak_reset_register(self) -> Register {
        match self {
            Channel::Current => Register::Rstipeak,
            Channel::Voltage => Register::Rstvpeak
        }
    }
}

/// Represents the registers of the ADE7753.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Register {
    Waveform,
    Aenergy,
    Raenergy,
    Laenergy,
    Vaenergy,
    Rvaenergy,
    Lvaenergy,
    Lvarenergy,
    Mode,
    Irqen,
    Status,
    Rststatus,
    Ch1os,
    Ch2os,
    Gain,
    Phcal,
    Apos,
    Wgain,
    Wdiv,
    Cfnum,
    Cfden,
    Irms,
    Vrms,
    Irmsos,
    Vrmsos,
    Vagain,
    Vadiv,
    Linecyc,
    Zxtout,
    Sagcyc,
    Saglvl,
    Ipklvl,
    Vpklvl,
    Ipeak,
    Rstipeak,
    Vpeak,
    Rstvpeak,
    Temp,
    Period,
    Chksum,
    Dierev
}

impl Register {
    /// Returns the address of the register.
    pub fn addr(&self) -> u8 {
        match self {
            Register::Waveform => 0x01,
            Register::Aenergy => 0x02,
            Register::Raenergy => 0x03,
            Register::Laenergy => 0x04,
            Register::Vaenergy => 0x05,
            Register::Rvaenergy => 0x06,
            Register::Lvaenergy => 0x07,
            Register::Lvarenergy => 0x08,
            Register::Mode => 0x09,
            Register::Irqen => 0x0A,
            Register::Status => 0x0B,
            Register::Rststatus => 0x0C,
            Register::Ch1os => 0x0D,
            Register::Ch2os => 0x0E,
            Register::Gain => 0x0F,
            Register::Phcal => 0x10,
            Register::Apos => 0x11,
            Register::Wgain => 0x12,
            Register::Wdiv => 0x13,
            Register::Cfnum => 0x14,
            Register::Cfden => 0x15,
            Register::Irms => 0x16,
            Register::Vrms => 0x17,
            Register::Irmsos => 0x18,
            Register::Vrmsos => 0x19,
            Register::Vagain => 0x1A,
            Register::Vadiv => 0x1B,
            Register::Linecyc => 0x1C,
            Register::Zxtout => 0x1D,
            Register::Sagcyc => 0x1E,
            Register::Saglvl => 0x1F,
            Register::Ipklvl => 0x20,
            Register::Vpklvl => 0x21,
            Register::Ipeak => 0x22,
            Register::Rstipeak => 0x23,
            Register::Vpeak => 0x24,
            Register::Rstvpeak => 0x25,
            Register::Temp => 0x26,
            Register::Period => 0x27,
            Register::Chksum => 0x3E,
            Register::Dierev => 0x3F
        }
    }

    /// Returns the number of bits transferred on the bus for the register.
    pub fn width(&self) -> u8 {
        match self {
            Register::Waveform
            | Register::Aenergy
            | Register::Raenergy
            | Register::Laenergy
            | Register::Vaenergy
            | Register::Rvaenergy
            | Register::Lvaenergy
            | Register::Lvarenergy
            | Register::Irms
            | Register::Vrms
            | Register::Ipeak
            | Register::Rstipeak
            | Register::Vpeak
            | Register::Rstvpeak => 24,
            Register::Mode
            | Register::Irqen
            | Register::Status
            | Register::Rststatus
            | Register::Apos
            | Register::Wgain
            | Register::Cfnum
            | Register::Cfden
            | Register::Irmsos
            | Register::Vrmsos
            | Register::Vagain
            | Register::Linecyc
            | Register::Zxtout
            | Register::Period => 16,
            _ => 8
        }
    }

    /// Returns `true` if the register content is a two's complement value.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Register::Waveform
                | Register::Aenergy
                | Register::Raenergy
                | Register::Laenergy
                | Register::Lvarenergy
                | Register::Ch1os
                | Register::Ch2os
                | Register::Phcal
                | Register::Apos
                | Register::Wgain
                | Register::Irmsos
                | Register::Vrmsos
                | Register::Vagain
                | Register::Temp
        )
    }

    /// Returns `true` if the register is read-only, `false` otherwise.
    pub fn is_read_only(&self) -> bool {
        self.width() == 24 ||
            matches!(
                self,
                Register::Status
                    | Register::Rststatus
                    | Register::Temp
                    | Register::Period
                    | Register::Chksum
                    | Register::Dierev
            )
    }

    /// Returns the bit mask covering the register width.
    pub fn mask(&self) -> u32 {
        (1u32 << self.width()) - 1
    }
}

/// Represent the possible SPI operations and their correspondent command bit.
#[repr(u8)]
pub(crate) enum SpiOp {
    Read = 0x00,
    Write = 0x80
}

/// Bit of CH1OS enabling the Channel 1 digital integrator.
pub(crate) const CH1OS_INTEGRATOR: u8 = 0x80;

/// Sign-extends the lowest `bits` bits of `value` to an `i32`.
pub fn sign_extend(value: u32, bits: u8) -> i32 {
    let shift = 32 - u32::from(bits);
    ((value << shift) as i32) >> shift
}

/// Sign-extends a 24-bit two's complement value, as read from the energy and waveform
/// registers.
pub fn sign_extend_24(value: u32) -> i32 {
    sign_extend(value, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extend_24_positive_is_identity() {
        for value in [0u32, 1, 0x1388, 0x7F_FFFF] {
            assert_eq!(sign_extend_24(value), value as i32);
        }
    }

    #[test]
    fn sign_extend_24_negative() {
        for value in [0x80_0000u32, 0xFF_FFFF, 0xFF_EC78] {
            assert_eq!(sign_extend_24(value), value as i32 - (1 << 24));
        }
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
        assert_eq!(sign_extend_24(0x80_0000), -(1 << 23));
    }

    #[test]
    fn sign_extend_24_roundtrip_over_range() {
        let mut value = -(1i32 << 23);
        while value < (1 << 23) {
            assert_eq!(sign_extend_24(value as u32 & 0xFF_FFFF), value);
            value += 4099;
        }
        assert_eq!(sign_extend_24(((1u32 << 23) - 1) & 0xFF_FFFF), (1 << 23) - 1);
    }

    #[test]
    fn sign_extend_ignores_upper_bits() {
        assert_eq!(sign_extend(0xABCD_FF80, 8), -128);
        assert_eq!(sign_extend(0x0000_FFFF, 16), -1);
        assert_eq!(sign_extend(0x0000_7FFF, 16), 0x7FFF);
    }

    #[test]
    fn register_map_matches_datasheet() {
        assert_eq!(Register::Waveform.addr(), 0x01);
        assert_eq!(Register::Mode.addr(), 0x09);
        assert_eq!(Register::Rststatus.addr(), 0x0C);
        assert_eq!(Register::Period.addr(), 0x27);
        assert_eq!(Register::Dierev.addr(), 0x3F);
        assert_eq!(Register::Vrms.width(), 24);
        assert!(!Register::Vrms.is_signed());
        assert!(Register::Aenergy.is_signed());
        assert!(!Register::Vaenergy.is_signed());
        assert_eq!(Register::Linecyc.width(), 16);
        assert_eq!(Register::Saglvl.width(), 8);
        assert!(Register::Laenergy.is_read_only());
        assert!(!Register::Irqen.is_read_only());
    }

    #[test]
    fn config_mode_bits() {
        let config = Config {
            waveform_rate: WaveformDataRate::Ksps7,
            waveform_source: WaveformDataSource::Channel2,
            ..Default::default()
        };
        assert_eq!(ModeBits::from(config).bits(), 0x000C | 0x1000 | 0x6000);
    }

    #[test]
    fn reserved_waveform_source_is_rejected() {
        assert_eq!(WaveformDataSource::try_from(1u8), Err(()));
        assert_eq!(WaveformDataSource::try_from(2u8), Ok(WaveformDataSource::Channel1));
        assert_eq!(WaveformDataRate::try_from(4u8), Err(()));
    }

    #[test]
    fn reset_event_is_not_maskable() {
        assert!(!Event::Reset.is_maskable());
        assert!(Event::ZeroCrossing.is_maskable());
    }
}
