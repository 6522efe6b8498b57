use embedded_hal::blocking::delay::DelayUs;

use super::*;

/// Number of status polls performed by [`Ade7753::wait_reset()`].
const RESET_POLL_LIMIT: u32 = 5;

/// Delay between two status polls in [`Ade7753::wait_reset()`], in microseconds.
const RESET_POLL_INTERVAL_US: u32 = 100;

impl<SPI, CS, S, P> Ade7753<SPI, CS>
    where
        SPI: spi::Transfer<u8, Error=S>,
        CS: OutputPin<Error = P> {

    /// Initializes the chip, applying the given configuration. The chip is software-reset first,
    /// then the MODE and IRQEN registers are written and read back. After this method, the chip
    /// is ready to use.
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    /// * `config` - The [`Config`] struct containing the configuration for the chip.
    /// * `calibration` - The [`Calibration`] struct containing the scale factors for the readings.
    pub fn init(&mut self,
                delay: &mut dyn DelayUs<u32>,
                config: Config,
                calibration: Calibration) -> Result<(), Error<S, P>> {
        self.config = config;
        self.calibration = calibration;
        self.soft_reset(delay)?;
        self.wait_reset(delay)?;
        self.write_reg_checked(Register::Mode, ModeBits::from(config).bits().into())?;
        self.write_reg_checked(Register::Irqen, config.interrupts.bits().into())?;
        #[cfg(feature = "defmt")]
        defmt::debug!("ADE7753 initialized, MODE={=u16:#x}", self.mode.bits());
        Ok(())
    }

    /// Performs a software reset of the chip. All the internal registers are reset to their
    /// default values. This method blocks for the time the chip needs before accepting a new
    /// transfer.
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    pub fn soft_reset(&mut self, delay: &mut dyn DelayUs<u32>) -> Result<(), Error<S, P>> {
        self.set_bits(Register::Mode, ModeBits::SWRST.bits())?;
        delay.delay_us(RESET_QUIESCE_US);
        self.mode = ModeBits::RESET_VALUE;
        self.irqen = InterruptBits::RESET_VALUE;
        self.pending = InterruptBits::empty();
        Ok(())
    }

    /// Waits for the reset-complete event. The function timeouts returning a
    /// [`Error::ResetTimeout`] after about 500 µs.
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    pub fn wait_reset(&mut self, delay: &mut dyn DelayUs<u32>) -> Result<(), Error<S, P>> {
        for _ in 0..RESET_POLL_LIMIT {
            if self.check_reset_ends()? {
                return Ok(())
            }
            delay.delay_us(RESET_POLL_INTERVAL_US);
        }
        Err(Error::ResetTimeout)
    }

    /// Enables a MODE feature. See [`Feature::sets_on_enable()`] for the bit polarity.
    pub fn enable_feature(&mut self, feature: Feature) -> Result<(), Error<S, P>> {
        self.switch_feature(feature, true)
    }

    /// Disables a MODE feature. See [`Feature::sets_on_enable()`] for the bit polarity.
    pub fn disable_feature(&mut self, feature: Feature) -> Result<(), Error<S, P>> {
        self.switch_feature(feature, false)
    }

    fn switch_feature(&mut self, feature: Feature, enable: bool) -> Result<(), Error<S, P>> {
        let mask = feature.mask().bits();
        if enable == feature.sets_on_enable() {
            self.set_bits(Register::Mode, mask)?;
        } else {
            self.unset_bits(Register::Mode, mask)?;
        }
        Ok(())
    }

    /// Selects the update rate of the WAVEFORM register.
    pub fn select_waveform_data_rate(&mut self, rate: WaveformDataRate) -> Result<(), Error<S, P>> {
        self.update_bits(Register::Mode, ModeBits::DTRT.bits(), rate.bits().bits())?;
        Ok(())
    }

    /// Selects the source of the WAVEFORM register.
    pub fn select_waveform_data_source(&mut self,
                                       source: WaveformDataSource) -> Result<(), Error<S, P>> {
        self.update_bits(Register::Mode, ModeBits::WAVSEL.bits(), source.bits().bits())?;
        Ok(())
    }

    /// Selects the source of the WAVEFORM register from its WAVSEL code. The reserved code `1`
    /// is rejected with [`Error::InvalidConfig`] before any transfer takes place.
    pub fn select_waveform_data_source_raw(&mut self, code: u8) -> Result<(), Error<S, P>> {
        let source = WaveformDataSource::try_from(code).map_err(|_| Error::InvalidConfig)?;
        self.select_waveform_data_source(source)
    }

    /// Places the chip in line cycle energy accumulation mode and returns the time at which the
    /// accumulation started.
    /// # Arguments
    /// * `clock` - The time source implementing the [`Clock`] trait.
    pub fn enable_accumulation_mode(&mut self, clock: &mut dyn Clock) -> Result<Instant, Error<S, P>> {
        self.set_bits(Register::Mode, ModeBits::CYCMODE.bits())?;
        Ok(clock.now())
    }

    /// Leaves the line cycle energy accumulation mode.
    pub fn disable_accumulation_mode(&mut self) -> Result<(), Error<S, P>> {
        self.unset_bits(Register::Mode, ModeBits::CYCMODE.bits())?;
        Ok(())
    }

    /// Starts a temperature conversion. The TEMPSEL bit is cleared by the chip when the result is
    /// available, which is signalled by [`Event::TemperatureResult`].
    pub fn start_temperature_measurement(&mut self) -> Result<(), Error<S, P>> {
        self.set_bits(Register::Mode, ModeBits::TEMPSEL.bits())?;
        Ok(())
    }

    /// Enables or disables the digital integrator of Channel 1, needed with di/dt current
    /// sensors. The Channel 1 offset bits are left untouched.
    pub fn set_integrator(&mut self, enable: bool) -> Result<(), Error<S, P>> {
        let mask = CH1OS_INTEGRATOR.into();
        if enable {
            self.set_bits(Register::Ch1os, mask)?;
        } else {
            self.unset_bits(Register::Ch1os, mask)?;
        }
        Ok(())
    }

    /// Routes an event to the IRQ output. [`Event::Reset`] cannot be routed and is rejected with
    /// [`Error::InvalidConfig`].
    pub fn enable_interrupt(&mut self, event: Event) -> Result<(), Error<S, P>> {
        if !event.is_maskable() { return Err(Error::InvalidConfig) }
        self.set_bits(Register::Irqen, event.mask().bits())?;
        Ok(())
    }

    /// Stops routing an event to the IRQ output. The event keeps being latched in the status
    /// register.
    pub fn disable_interrupt(&mut self, event: Event) -> Result<(), Error<S, P>> {
        if !event.is_maskable() { return Err(Error::InvalidConfig) }
        self.unset_bits(Register::Irqen, event.mask().bits())?;
        Ok(())
    }

    /// Returns the MODE register content.
    pub fn read_mode(&mut self) -> Result<ModeBits, Error<S, P>> {
        self.read(Register::Mode)?;
        Ok(self.mode)
    }

    /// Returns the STATUS register content. This read does not clear any event.
    pub fn read_status(&mut self) -> Result<InterruptBits, Error<S, P>> {
        Ok(InterruptBits::from_bits_retain(self.read16(Register::Status)?))
    }

    /// Reads the RSTSTATUS register, clearing all the events on the chip, and merges them into
    /// the pending events. Use [`Self::take_event()`] to consume them.
    pub fn poll_status(&mut self) -> Result<InterruptBits, Error<S, P>> {
        let status = InterruptBits::from_bits_retain(self.read16(Register::Rststatus)?);
        self.pending |= status;
        Ok(self.pending)
    }

    /// Reads the RSTSTATUS register and returns all the pending events, consuming them.
    pub fn read_and_reset_status(&mut self) -> Result<InterruptBits, Error<S, P>> {
        let status = self.poll_status()?;
        self.pending = InterruptBits::empty();
        Ok(status)
    }

    /// Consumes a pending event without any transfer. Returns `true` if the event was pending.
    pub fn take_event(&mut self, event: Event) -> bool {
        let set = self.pending.contains(event.mask());
        self.pending.remove(event.mask());
        set
    }

    /// Returns `true` if the event occurred since it was last consumed, consuming it. The status
    /// register is read once, the other events are kept pending.
    pub fn check_and_reset(&mut self, event: Event) -> Result<bool, Error<S, P>> {
        self.poll_status()?;
        Ok(self.take_event(event))
    }

    /// Returns `true` if the chip signals a zero-crossing timeout, or if one was already read
    /// from RSTSTATUS and is still pending. Nothing is cleared or consumed.
    pub fn check_zero_crossing_error(&mut self) -> Result<bool, Error<S, P>> {
        let status = self.read_status()?;
        Ok((status | self.pending).contains(InterruptBits::ZXTO))
    }

    /// Returns `true` if a reset completed since the event was last consumed.
    pub fn check_reset_ends(&mut self) -> Result<bool, Error<S, P>> {
        self.check_and_reset(Event::Reset)
    }

    /// Reads an 8-bit register.
    pub fn read8(&mut self, reg: Register) -> Result<u8, Error<S, P>> {
        let mut bytes = [reg.addr() | SpiOp::Read as u8, 0];
        self.exchange(&mut bytes)?;
        Ok(bytes[1])
    }

    /// Reads a 16-bit register.
    pub fn read16(&mut self, reg: Register) -> Result<u16, Error<S, P>> {
        let mut bytes = [reg.addr() | SpiOp::Read as u8, 0, 0];
        self.exchange(&mut bytes)?;
        Ok(u16::from_be_bytes([bytes[1], bytes[2]]))
    }

    /// Reads a 24-bit register.
    pub fn read24(&mut self, reg: Register) -> Result<u32, Error<S, P>> {
        let mut bytes = [reg.addr() | SpiOp::Read as u8, 0, 0, 0];
        self.exchange(&mut bytes)?;
        Ok(u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a register with its own width, as an unsigned value.
    pub fn read(&mut self, reg: Register) -> Result<u32, Error<S, P>> {
        let value = match reg.width() {
            24 => self.read24(reg)?,
            16 => self.read16(reg)?.into(),
            _ => self.read8(reg)?.into()
        };
        match reg {
            Register::Mode => self.mode = ModeBits::from_bits_retain(value as u16),
            Register::Irqen => self.irqen = InterruptBits::from_bits_retain(value as u16),
            _ => {}
        }
        Ok(value)
    }

    /// Reads a register with its own width, sign-extending the value if the register is a two's
    /// complement one.
    pub fn read_signed(&mut self, reg: Register) -> Result<i32, Error<S, P>> {
        let value = self.read(reg)?;
        Ok(if reg.is_signed() { sign_extend(value, reg.width()) } else { value as i32 })
    }

    /// Writes an 8-bit register.
    pub fn write8(&mut self, reg: Register, value: u8) -> Result<(), Error<S, P>> {
        if reg.is_read_only() { return Err(Error::ReadOnlyRegister) }
        let mut bytes = [reg.addr() | SpiOp::Write as u8, value];
        self.exchange(&mut bytes)
    }

    /// Writes a 16-bit register.
    pub fn write16(&mut self, reg: Register, value: u16) -> Result<(), Error<S, P>> {
        if reg.is_read_only() { return Err(Error::ReadOnlyRegister) }
        let [msb, lsb] = value.to_be_bytes();
        let mut bytes = [reg.addr() | SpiOp::Write as u8, msb, lsb];
        self.exchange(&mut bytes)
    }

    /// Writes a register with its own width, truncating the value to it. Returns the value that
    /// was actually written. Reserved bits are not masked.
    pub fn write(&mut self, reg: Register, value: u32) -> Result<u32, Error<S, P>> {
        let value = value & reg.mask();
        match reg.width() {
            16 => self.write16(reg, value as u16)?,
            8 => self.write8(reg, value as u8)?,
            _ => return Err(Error::ReadOnlyRegister)
        }
        match reg {
            Register::Mode => self.mode = ModeBits::from_bits_retain(value as u16),
            Register::Irqen => self.irqen = InterruptBits::from_bits_retain(value as u16),
            _ => {}
        }
        Ok(value)
    }

    /// Writes a signed value to a register with its own width. Returns the value that was
    /// actually written, sign-extended back.
    pub fn write_signed(&mut self, reg: Register, value: i32) -> Result<i32, Error<S, P>> {
        let written = self.write(reg, value as u32)?;
        Ok(sign_extend(written, reg.width()))
    }

    /// Sets the bits of `mask` in a register, reading it first. Returns the new content.
    pub fn set_bits(&mut self, reg: Register, mask: u16) -> Result<u32, Error<S, P>> {
        let value = self.read(reg)?;
        self.write(reg, value | u32::from(mask))
    }

    /// Clears the bits of `mask` in a register, reading it first. Returns the new content.
    pub fn unset_bits(&mut self, reg: Register, mask: u16) -> Result<u32, Error<S, P>> {
        let value = self.read(reg)?;
        self.write(reg, value & !u32::from(mask))
    }

    /// Replaces the bits of `field` in a register with `value`, in a single write. Returns the
    /// new content.
    pub fn update_bits(&mut self, reg: Register, field: u16, value: u16) -> Result<u32, Error<S, P>> {
        let current = self.read(reg)?;
        let field = u32::from(field);
        self.write(reg, (current & !field) | (u32::from(value) & field))
    }

    /// Performs a register writing and reads the register back to check that the data has been
    /// actually written.
    /// # Arguments
    /// * `reg` - The register as a [`Register`] value.
    /// * `content` - The content to write to the register.
    fn write_reg_checked(&mut self, reg: Register, content: u32) -> Result<(), Error<S, P>> {
        let written = self.write(reg, content)?;
        if self.read(reg)? != written {
            return Err(Error::RegisterContentMismatch);
        }
        Ok(())
    }

    /// Performs a single transaction on the SPI bus, with the CS pin held low for its whole
    /// duration. The CS pin is released even if the transfer fails.
    /// # Arguments
    /// * `bytes` - The command byte followed by the data bytes. Overwritten with the response.
    fn exchange(&mut self, bytes: &mut [u8]) -> Result<(), Error<S, P>> {
        self.cs.set_low().map_err(Error::PinError)?;
        let transfer = self.spi.transfer(bytes).map(|_| ()).map_err(Error::SpiError);
        self.cs.set_high().map_err(Error::PinError)?;
        transfer
    }
}
