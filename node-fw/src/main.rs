#![no_std]
#![no_main]

use core::cell::RefCell;
use defmt_rtt as _;
use static_cell::StaticCell;

use embassy_executor::Spawner;
use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive, Pin};
use embassy_nrf::interrupt::{self, InterruptExt};
use embassy_nrf::saadc::{self, ChannelConfig, Gain, Reference, Resolution, Saadc};
use embassy_nrf::bind_interrupts;
use embassy_sync::blocking_mutex::ThreadModeMutex;
use embassy_time::{with_timeout, Duration, Timer};

use nrf_softdevice::ble::peripheral;
use nrf_softdevice::Softdevice;

use shared::beacon::{beacon_frame, fill_adv_data};
use shared::{
    AdcCalibration, AnalogReader, ChannelRole, Measurement, OzoneCalibration, OzoneSensor,
    RawSampler,
};

#[cfg(feature = "dev")]
use panic_probe as _;

#[cfg(not(feature = "dev"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    defmt::error!("panic!");
    cortex_m::peripheral::SCB::sys_reset();
}

#[cortex_m_rt::exception]
unsafe fn HardFault(_frame: &cortex_m_rt::ExceptionFrame) -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

/// Pause between acquisition passes.
const ACQUISITION_PERIOD: Duration = Duration::from_secs(5);

/// Advertising interval in 625 µs units.
const ADVERTISING_INTERVAL: u32 = 244;

#[derive(Clone, Copy, Default)]
struct State {
    measurement: Measurement,
}

type SharedState = ThreadModeMutex<RefCell<State>>;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = embassy_nrf::config::Config::default();
    config.hfclk_source = embassy_nrf::config::HfclkSource::Internal;
    config.lfclk_source = embassy_nrf::config::LfclkSource::InternalRC;
    config.time_interrupt_priority = interrupt::Priority::P2;

    let p = embassy_nrf::init(config);

    // set priority to avoid collisions with softdevice
    interrupt::SAADC.set_priority(interrupt::Priority::P2);

    let sd = Softdevice::enable(&softdevice_config());
    defmt::unwrap!(spawner.spawn(softdevice_task(sd)));

    let led = Output::new(p.P1_15.degrade(), Level::Low, OutputDrive::Standard);
    defmt::unwrap!(spawner.spawn(blinky(led)));

    static STATE: StaticCell<SharedState> = StaticCell::new();
    let state = STATE.init(ThreadModeMutex::new(RefCell::new(State::default())));

    // Three single-ended lines referenced to VDD/4 with 1/4 gain, so the
    // full 10-bit code range spans the 3.3 V supply.
    let mut adc_config = saadc::Config::default();
    adc_config.resolution = Resolution::_10BIT;
    let mut ozone = ChannelConfig::single_ended(p.P0_02);
    let mut reference = ChannelConfig::single_ended(p.P0_03);
    let mut temperature = ChannelConfig::single_ended(p.P0_04);
    for channel in [&mut ozone, &mut reference, &mut temperature] {
        channel.reference = Reference::VDD1_4;
        channel.gain = Gain::GAIN1_4;
    }
    let mut adc = Saadc::new(p.SAADC, Irqs, adc_config, [ozone, reference, temperature]);
    adc.calibrate().await;

    let calibration = OzoneCalibration::DEFAULT;
    defmt::assert!(calibration.response() != 0.0);

    let sensor = OzoneSensor::new(
        AnalogReader::new(SaadcSampler { adc }, AdcCalibration::DEFAULT),
        calibration,
    );
    defmt::unwrap!(spawner.spawn(sensor_task(sensor, state)));
    defmt::unwrap!(spawner.spawn(advertising_task(state, sd)));

    defmt::info!("ozone beacon node started");
}

/// Binds the logical channel roles to the SAADC channel order configured in
/// `main`.
struct SaadcSampler {
    adc: Saadc<'static, 3>,
}

impl RawSampler for SaadcSampler {
    async fn read_raw(&mut self, channel: ChannelRole) -> u16 {
        let mut codes = [0i16; 3];
        self.adc.sample(&mut codes).await;

        let code = match channel {
            ChannelRole::OzoneSignal => codes[0],
            ChannelRole::Reference => codes[1],
            ChannelRole::Temperature => codes[2],
        };
        // single-ended conversions can undershoot zero by a few counts
        code.max(0) as u16
    }
}

/// Acquires a fresh measurement every few seconds and publishes it for the
/// transport.
#[embassy_executor::task]
async fn sensor_task(mut sensor: OzoneSensor<SaadcSampler>, state: &'static SharedState) {
    loop {
        let measurement = sensor.acquire().await;
        state.lock(|c| c.borrow_mut().measurement = measurement);

        defmt::info!(
            "ozone: {=f64} ppm x 10 ({=f64} ppm), temperature: {=i16} C",
            measurement.corrected_ozone,
            measurement.corrected_ozone / 10.0,
            measurement.temperature,
        );

        Timer::after(ACQUISITION_PERIOD).await;
    }
}

/// Restarts the advertising set every second so the frame always carries
/// the latest measurement.
#[embassy_executor::task]
async fn advertising_task(state: &'static SharedState, softdevice: &'static Softdevice) {
    let mut scan_data = [0u8; 31];
    let mut scan_len = 0;
    scan_len += fill_adv_data(&mut scan_data, 0x09, b"O3-Node");
    scan_len += fill_adv_data(&mut scan_data[scan_len..], 0x0a, &[0]);

    loop {
        let mut config = peripheral::Config::default();
        config.interval = ADVERTISING_INTERVAL;

        let mut adv_data = [0u8; 31];
        let adv_len = build_adv_data(&state.lock(|c| c.borrow().measurement), &mut adv_data);

        let adv = peripheral::NonconnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data[..adv_len],
            scan_data: &scan_data[..scan_len],
        };

        match with_timeout(
            Duration::from_secs(1),
            peripheral::advertise(softdevice, adv, &config),
        )
        .await
        {
            Ok(Err(e)) => defmt::error!("advertisement error: {}", e),
            _ => {}
        }
    }
}

/// Flags plus the manufacturer frame; the name and TX power travel in the
/// scan response because the beacon frame fills the advertisement.
fn build_adv_data(measurement: &Measurement, adv_data: &mut [u8; 31]) -> usize {
    let mut adv_offset = 0;

    adv_offset += fill_adv_data(
        &mut adv_data[..],
        0x01,
        &[nrf_softdevice::raw::BLE_GAP_ADV_FLAGS_LE_ONLY_GENERAL_DISC_MODE as u8],
    );
    adv_offset += fill_adv_data(&mut adv_data[adv_offset..], 0xff, &beacon_frame(measurement));

    adv_offset
}

/// Short heartbeat pulse; kept brief to save the battery.
#[embassy_executor::task]
async fn blinky(mut led: Output<'static, AnyPin>) {
    loop {
        led.set_high();
        Timer::after_millis(40).await;
        led.set_low();
        Timer::after_secs(30).await;
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) {
    sd.run().await
}

/// Basic configuration for the softdevice: RC low-frequency clock and a
/// single peripheral-only advertising set.
fn softdevice_config() -> nrf_softdevice::Config {
    use nrf_softdevice::raw;
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_250_PPM as u8,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: b"O3-Node" as *const u8 as _,
            current_len: 7,
            max_len: 7,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}
