mod platform;

use esp_idf_hal::{delay::FreeRtos, peripherals::Peripherals};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition, sntp::EspSntp};
use log::{info, warn};
use modest_iot::{TrackerConfig, TrackingDevice};
use platform::EspPlatform;

/// Main loop idle between device ticks; the device gates itself
const LOOP_IDLE_MS: u32 = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let config = TrackerConfig::from_env()?;

    info!("=== Modest IoT Tracking Device ===");
    info!(
        "Device: {}, SSID: {}, update every {}ms (GPS {}ms, RFID {}ms)",
        config.network.device_id,
        config.network.wifi_ssid,
        config.timing.update_interval_ms,
        config.timing.gps_interval_ms,
        config.timing.rfid_interval_ms
    );

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();

    let hardware = platform::hardware(
        peripherals.uart1,
        peripherals.modem,
        sysloop,
        nvs,
        &config.pins,
    )?;

    let mut device = TrackingDevice::<EspPlatform>::new(&config, hardware);
    device.initialize();

    // Record timestamps come from system time, keep SNTP running for the
    // lifetime of the loop
    let _sntp = match EspSntp::new_default() {
        Ok(sntp) => Some(sntp),
        Err(e) => {
            warn!("SNTP unavailable, timestamps start at the epoch: {:?}", e);
            None
        }
    };

    info!("Entering main loop");
    loop {
        device.update();
        FreeRtos::delay_ms(LOOP_IDLE_MS);
    }
}
