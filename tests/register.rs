use ade7753::*;

const FEATURES: [Feature; 9] = [
    Feature::HighPassFilter,
    Feature::LowPassFilter2,
    Feature::FrequencyOutput,
    Feature::SagDetection,
    Feature::AdConverters,
    Feature::Channel1,
    Feature::Channel2,
    Feature::ChannelSwap,
    Feature::OnlyPositiveAccumulation,
];

const EVENTS: [Event; 15] = [
    Event::ActiveEnergyHalfFull,
    Event::Sag,
    Event::CycleEnergyAccumulationEnd,
    Event::NewWaveformData,
    Event::ZeroCrossing,
    Event::TemperatureResult,
    Event::Reset,
    Event::ActiveEnergyOverflow,
    Event::VoltagePeak,
    Event::CurrentPeak,
    Event::ApparentEnergyHalfFull,
    Event::ApparentEnergyOverflow,
    Event::ZeroCrossingTimeout,
    Event::PowerChangeToPositive,
    Event::PowerChangeToNegative,
];

#[test]
fn feature_masks_are_single_distinct_bits() {
    let mut seen = ModeBits::empty();
    for feature in FEATURES {
        let mask = feature.mask();
        assert_eq!(mask.bits().count_ones(), 1);
        assert!(!seen.intersects(mask));
        seen |= mask;
    }
    assert!(!seen.intersects(ModeBits::DTRT | ModeBits::WAVSEL | ModeBits::SWRST));
}

#[test]
fn feature_polarity() {
    assert!(Feature::HighPassFilter.sets_on_enable());
    assert!(Feature::FrequencyOutput.sets_on_enable());
    assert!(Feature::ChannelSwap.sets_on_enable());
    assert!(!Feature::AdConverters.sets_on_enable());
    assert!(!Feature::Channel1.sets_on_enable());
    assert!(!Feature::Channel2.sets_on_enable());
}

#[test]
fn event_masks_follow_bit_order() {
    for (bit, event) in EVENTS.iter().enumerate() {
        assert_eq!(event.mask().bits(), 1 << bit);
    }
    assert_eq!(EVENTS.iter().filter(|event| !event.is_maskable()).count(), 1);
}

#[test]
fn waveform_fields() {
    assert_eq!(WaveformDataRate::Ksps27_9.bits(), ModeBits::empty());
    assert_eq!(WaveformDataRate::Ksps3_5.bits(), ModeBits::DTRT);
    assert_eq!(WaveformDataSource::ActivePower.bits(), ModeBits::empty());
    assert_eq!(WaveformDataSource::Channel2.bits(), ModeBits::WAVSEL);
    assert_eq!(WaveformDataSource::Channel1.bits().bits(), 0x4000);
}

#[test]
fn config_mode_ignores_fields_set_in_mode() {
    let config = Config {
        mode: ModeBits::DISCF | ModeBits::SWRST | ModeBits::DTRT | ModeBits::TEMPSEL,
        waveform_rate: WaveformDataRate::Ksps14,
        ..Default::default()
    };
    assert_eq!(ModeBits::from(config), ModeBits::DISCF | WaveformDataRate::Ksps14.bits());
}

#[test]
fn accumulator_registers() {
    assert_eq!(Accumulator::Active.register().addr(), 0x02);
    assert_eq!(Accumulator::Active.reset_register().addr(), 0x03);
    assert_eq!(Accumulator::Apparent.register().addr(), 0x05);
    assert_eq!(Accumulator::Apparent.reset_register().addr(), 0x06);
}

#[test]
fn register_masks_follow_width() {
    assert_eq!(Register::Vrms.mask(), 0xFF_FFFF);
    assert_eq!(Register::Mode.mask(), 0xFFFF);
    assert_eq!(Register::Gain.mask(), 0xFF);
    assert!(Register::Status.is_read_only());
    assert!(Register::Period.is_read_only());
    assert!(!Register::Linecyc.is_read_only());
}

#[test]
fn power_factor_from_energies() {
    let started = Instant::from_ticks(100);
    let elapsed = Duration::from_ticks(1_000);

    let reading = LineCycleReading::from_energies(0, 0, started, elapsed);
    assert_eq!(reading.power_factor, 0.0);
    assert_eq!(reading.reactive_power, 0);

    let reading = LineCycleReading::from_energies(10_000, 10_000, started, elapsed);
    assert_eq!(reading.power_factor, 1.0);
    assert_eq!(reading.reactive_power, 0);

    let reading = LineCycleReading::from_energies(12_000, 10_000, started, elapsed);
    assert_eq!(reading.power_factor, 1.0);
    assert_eq!(reading.reactive_power, 0);

    let reading = LineCycleReading::from_energies(-3_000, 5_000, started, elapsed);
    assert_eq!(reading.power_factor, -0.6);
    assert_eq!(reading.reactive_power, 4_000);
    assert_eq!(reading.started, started);
    assert_eq!(reading.elapsed, elapsed);
}

#[test]
fn reactive_power_near_unity_power_factor() {
    let started = Instant::from_ticks(0);
    let elapsed = Duration::from_ticks(500);

    let reading = LineCycleReading::from_energies(9_999_999, 10_000_000, started, elapsed);
    assert_eq!(reading.reactive_power, 4_472);

    let reading = LineCycleReading::from_energies(9_999_000, 10_000_000, started, elapsed);
    assert_eq!(reading.reactive_power, 141_418);

    let reading = LineCycleReading::from_energies(-8_388_607, 8_388_608, started, elapsed);
    assert_eq!(reading.reactive_power, 4_096);
}
