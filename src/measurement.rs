use embedded_hal::blocking::delay::DelayUs;

use super::*;

/// Result of a line cycle accumulation window, see [`Ade7753::read_power_factor()`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineCycleReading {
    /// Ratio between active and apparent energy, clamped between -1 and 1.
    pub power_factor: f32,
    /// Active energy accumulated over the window (LAENERGY).
    pub active_power: i32,
    /// Apparent energy accumulated over the window (LVAENERGY).
    pub apparent_power: i32,
    /// Reactive power derived from the active and apparent values, in the same unit.
    pub reactive_power: i32,
    /// Time at which the accumulation mode was enabled.
    pub started: Instant,
    /// Time elapsed between the start of the accumulation and the end of the readings.
    pub elapsed: Duration
}

impl LineCycleReading {
    /// Derives the power factor and the reactive power from the active and apparent energies
    /// accumulated over the same window. A zero apparent energy yields a zero power factor.
    pub fn from_energies(active: i32, apparent: i32, started: Instant, elapsed: Duration) -> Self {
        let p = active as f32;
        let s = apparent as f32;
        let power_factor = if apparent == 0 { 0.0 } else { (p / s).clamp(-1.0, 1.0) };
        // 24-bit energies squared need more than the f32 mantissa
        let q_squared = (i64::from(apparent).pow(2) - i64::from(active).pow(2)).max(0);
        Self {
            power_factor,
            active_power: active,
            apparent_power: apparent,
            reactive_power: libm::round(libm::sqrt(q_squared as f64)) as i32,
            started,
            elapsed
        }
    }
}

impl<SPI, CS, S, P> Ade7753<SPI, CS>
    where
        SPI: spi::Transfer<u8, Error=S>,
        CS: OutputPin<Error = P> {

    /// Returns the RMS voltage, scaled with [`Calibration::voltage`].
    pub fn read_vrms(&mut self) -> Result<f32, Error<S, P>> {
        Ok(self.read24(Register::Vrms)? as f32 * self.calibration.voltage)
    }

    /// Returns the RMS current, scaled with [`Calibration::current`].
    pub fn read_irms(&mut self) -> Result<f32, Error<S, P>> {
        Ok(self.read24(Register::Irms)? as f32 * self.calibration.current)
    }

    /// Returns the line frequency in Hz, computed from the PERIOD register. A period of zero,
    /// i.e. no signal on Channel 2, returns 0 Hz.
    /// # Arguments
    /// * `clkin_hz` - The frequency of the clock on the CLKIN pin, in Hz.
    pub fn read_frequency(&mut self, clkin_hz: u32) -> Result<f32, Error<S, P>> {
        let period = self.read16(Register::Period)?;
        if period == 0 {
            return Ok(0.0);
        }
        Ok(clkin_hz as f32 / (PERIOD_CLKIN_DIVIDER as f32 * f32::from(period)))
    }

    /// Returns the content of an energy accumulator, scaled with the matching [`Calibration`]
    /// factor. The accumulator keeps its value.
    ///
    /// Do not mix this method and [`Self::read_and_reset_energy()`] on the same accumulator:
    /// every read-and-reset clears what this method would report.
    pub fn read_energy(&mut self, accumulator: Accumulator) -> Result<f32, Error<S, P>> {
        let raw = self.read_signed(accumulator.register())?;
        Ok(raw as f32 * self.energy_scale(accumulator))
    }

    /// Returns the content of an energy accumulator, scaled with the matching [`Calibration`]
    /// factor, and resets the accumulator to zero.
    pub fn read_and_reset_energy(&mut self, accumulator: Accumulator) -> Result<f32, Error<S, P>> {
        let raw = self.read_signed(accumulator.reset_register())?;
        Ok(raw as f32 * self.energy_scale(accumulator))
    }

    /// Returns the reactive energy accumulated over the last line cycle window, scaled with
    /// [`Calibration::reactive_energy`].
    pub fn read_reactive_energy(&mut self) -> Result<f32, Error<S, P>> {
        let raw = self.read_signed(Register::Lvarenergy)?;
        Ok(raw as f32 * self.calibration.reactive_energy)
    }

    fn energy_scale(&self, accumulator: Accumulator) -> f32 {
        match accumulator {
            Accumulator::Active => self.calibration.active_energy,
            Accumulator::Apparent => self.calibration.apparent_energy
        }
    }

    /// Returns the content of the WAVEFORM register.
    pub fn read_waveform(&mut self) -> Result<i32, Error<S, P>> {
        self.read_signed(Register::Waveform)
    }

    /// Returns the maximum sample of a channel since the peak register was last reset.
    pub fn read_peak(&mut self, channel: Channel) -> Result<u32, Error<S, P>> {
        self.read24(channel.peak_register())
    }

    /// Returns the maximum sample of a channel and resets the peak register.
    pub fn read_and_reset_peak(&mut self, channel: Channel) -> Result<u32, Error<S, P>> {
        self.read24(channel.peak_reset_register())
    }

    /// Returns the silicon revision.
    pub fn read_die_revision(&mut self) -> Result<u8, Error<S, P>> {
        self.read8(Register::Dierev)
    }

    /// Returns the checksum of the previous read.
    pub fn read_checksum(&mut self) -> Result<u8, Error<S, P>> {
        self.read8(Register::Chksum)
    }

    /// Returns the raw result of the latest temperature conversion.
    pub fn read_temperature_raw(&mut self) -> Result<i8, Error<S, P>> {
        Ok(self.read8(Register::Temp)? as i8)
    }

    /// Returns the result of the temperature conversion started with
    /// [`Self::start_temperature_measurement()`], or `None` if the conversion has not finished.
    pub fn get_temperature(&mut self) -> Result<Option<i8>, Error<S, P>> {
        if !self.check_and_reset(Event::TemperatureResult)? {
            return Ok(None);
        }
        self.read_temperature_raw().map(Some)
    }

    /// Sets the sag voltage level. Returns the value actually written.
    pub fn set_sag_level(&mut self, value: u32) -> Result<u32, Error<S, P>> {
        self.write(Register::Saglvl, value)
    }

    /// Sets the number of line cycles below the sag level before a sag is signalled. Returns the
    /// value actually written.
    pub fn set_sag_cycles(&mut self, value: u32) -> Result<u32, Error<S, P>> {
        self.write(Register::Sagcyc, value)
    }

    /// Sets the Channel 1 peak detection level. Returns the value actually written.
    pub fn set_current_peak_level(&mut self, value: u32) -> Result<u32, Error<S, P>> {
        self.write(Register::Ipklvl, value)
    }

    /// Sets the Channel 2 peak detection level. Returns the value actually written.
    pub fn set_voltage_peak_level(&mut self, value: u32) -> Result<u32, Error<S, P>> {
        self.write(Register::Vpklvl, value)
    }

    /// Sets the Channel 2 RMS offset correction. Returns the value actually written.
    pub fn set_vrms_offset(&mut self, value: i32) -> Result<i32, Error<S, P>> {
        self.write_signed(Register::Vrmsos, value)
    }

    /// Sets the Channel 1 RMS offset correction. Returns the value actually written.
    pub fn set_irms_offset(&mut self, value: i32) -> Result<i32, Error<S, P>> {
        self.write_signed(Register::Irmsos, value)
    }

    /// Sets the number of half line cycles of a line cycle accumulation window. Returns the value
    /// actually written.
    pub fn set_line_cycles(&mut self, value: u32) -> Result<u32, Error<S, P>> {
        self.write(Register::Linecyc, value)
    }

    /// Waits for the next zero crossing of the voltage waveform. A crossing already pending is
    /// discarded. The status register is polled at most [`Config::zero_cross_poll_limit`] times,
    /// then [`Error::ZeroCrossingTimeout`] is returned.
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    pub fn wait_zero_cross(&mut self, delay: &mut dyn DelayUs<u32>) -> Result<(), Error<S, P>> {
        self.take_event(Event::ZeroCrossing);
        for _ in 0..self.config.zero_cross_poll_limit {
            if self.check_and_reset(Event::ZeroCrossing)? {
                return Ok(());
            }
            delay.delay_us(self.config.poll_interval_us);
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("no zero crossing after {=u32} polls", self.config.zero_cross_poll_limit);
        Err(Error::ZeroCrossingTimeout)
    }

    /// Accumulates active and apparent energy over `half_line_cycles` half line cycles and
    /// derives the power factor and the reactive power from them. This method blocks until the
    /// accumulation window closes.
    ///
    /// The accumulation mode is left before returning, also when the window does not close in
    /// time.
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    /// * `clock` - The time source implementing the [`Clock`] trait.
    /// * `half_line_cycles` - The length of the accumulation window.
    pub fn read_power_factor(&mut self,
                             delay: &mut dyn DelayUs<u32>,
                             clock: &mut dyn Clock,
                             half_line_cycles: u16) -> Result<LineCycleReading, Error<S, P>> {
        self.write16(Register::Linecyc, half_line_cycles)?;
        let started = self.enable_accumulation_mode(clock)?;
        let energies = self.accumulate(delay);
        self.disable_accumulation_mode()?;
        let (active, apparent) = energies?;
        let elapsed = clock
            .now()
            .checked_duration_since(started)
            .unwrap_or(Duration::from_ticks(0));
        Ok(LineCycleReading::from_energies(active, apparent, started, elapsed))
    }

    fn accumulate(&mut self, delay: &mut dyn DelayUs<u32>) -> Result<(i32, i32), Error<S, P>> {
        self.wait_zero_cross(delay)?;
        self.take_event(Event::CycleEnergyAccumulationEnd);
        let mut closed = false;
        for _ in 0..self.config.cycle_end_poll_limit {
            if self.check_and_reset(Event::CycleEnergyAccumulationEnd)? {
                closed = true;
                break;
            }
            delay.delay_us(self.config.poll_interval_us);
        }
        if !closed {
            #[cfg(feature = "defmt")]
            defmt::warn!("line cycle accumulation did not end");
            return Err(Error::AccumulationTimeout);
        }
        let active = self.read_signed(Register::Laenergy)?;
        let apparent = self.read_signed(Register::Lvaenergy)?;
        Ok((active, apparent))
    }

    /// Performs a complete acquisition cycle and returns it as a [`Measurement`]. The status
    /// events consumed during the cycle, plus the ones still pending, are summarized in
    /// [`Measurement::events`].
    /// # Arguments
    /// * `delay` - The delay source implementing the [`DelayUs`] trait.
    /// * `clock` - The time source implementing the [`Clock`] trait.
    /// * `half_line_cycles` - The length of the accumulation window used for the power factor.
    pub fn measure(&mut self,
                   delay: &mut dyn DelayUs<u32>,
                   clock: &mut dyn Clock,
                   half_line_cycles: u16) -> Result<Measurement, Error<S, P>> {
        let timestamp = clock.now();
        let mut events = self.pending;
        let voltage = self.read_vrms()?;
        let current = self.read_irms()?;
        let frequency = self.read_frequency(self.config.clkin_hz)?;
        let line_cycle = self.read_power_factor(delay, clock, half_line_cycles)?;
        let active_energy = self.read_signed(Register::Aenergy)?;
        let apparent_energy = self.read_signed(Register::Vaenergy)?;
        let reactive_energy = self.read_signed(Register::Lvarenergy)?;
        let temperature = self.read_temperature_raw()?;
        // consumed while waiting for the accumulation window
        events |= InterruptBits::ZX | InterruptBits::CYCEND;
        events |= self.read_and_reset_status()?;
        Ok(Measurement {
            voltage,
            current,
            frequency,
            power_factor: line_cycle.power_factor,
            active_power: line_cycle.active_power,
            reactive_power: line_cycle.reactive_power,
            apparent_power: line_cycle.apparent_power,
            active_energy,
            reactive_energy,
            apparent_energy,
            timestamp,
            events: events.bits() as u8,
            temperature
        })
    }
}
