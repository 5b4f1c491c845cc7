/// ESP32 drivers behind the framework's platform seam
use std::time::{SystemTime, UNIX_EPOCH};

use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady};
use embedded_svc::http::client::Client;
use esp_idf_hal::{
    delay::{Ets, FreeRtos, NON_BLOCK},
    gpio::{AnyInputPin, AnyOutputPin, Output, PinDriver},
    peripheral,
    uart::{config::Config, UartDriver},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    http::client::{Configuration as HttpConfiguration, EspHttpConnection},
    io::{EspIOError, Write},
    nvs::EspDefaultNvsPartition,
    sys::{esp_random, esp_timer_get_time, EspError},
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use log::{debug, info};
use modest_iot::{Clock, Hardware, HttpResponse, HttpTransport, PinConfig, Platform, WifiStation};
use rand::rngs::SmallRng;
use rand::SeedableRng;

const GPS_BAUD: u32 = 9_600;
const RESPONSE_PREVIEW: usize = 256;

/// NEO-6M UART, read without blocking
pub struct GpsUart {
    uart: UartDriver<'static>,
}

#[derive(Debug)]
pub struct UartError(EspError);

impl embedded_io::Error for UartError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for GpsUart {
    type Error = UartError;
}

impl Read for GpsUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.uart.read(buf, NON_BLOCK).map_err(UartError)
    }
}

impl ReadReady for GpsUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.uart
            .remaining_read()
            .map(|n| n > 0)
            .map_err(UartError)
    }
}

#[derive(Debug)]
pub enum WifiError {
    /// SSID or password longer than the driver accepts
    InvalidCredentials,
    Esp(EspError),
}

impl From<EspError> for WifiError {
    fn from(e: EspError) -> Self {
        WifiError::Esp(e)
    }
}

/// Station-mode WiFi; `begin` returns as soon as association has started
pub struct StationWifi {
    wifi: EspWifi<'static>,
}

impl StationWifi {
    pub fn new(
        modem: impl peripheral::Peripheral<P = esp_idf_hal::modem::Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        Ok(Self {
            wifi: EspWifi::new(modem, sysloop, nvs)?,
        })
    }
}

impl WifiStation for StationWifi {
    type Error = WifiError;

    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| WifiError::InvalidCredentials)?,
            password: password
                .try_into()
                .map_err(|_| WifiError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        if !self.wifi.is_started()? {
            info!("Starting WiFi");
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        Ok(())
    }

    /// Associated and holding a DHCP lease
    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.wifi.disconnect()?;
        Ok(())
    }
}

/// One ESP-IDF HTTP connection per request
#[derive(Default)]
pub struct EspHttp;

impl HttpTransport for EspHttp {
    type Error = EspIOError;

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, Self::Error> {
        let connection = EspHttpConnection::new(&HttpConfiguration {
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })?;
        let mut client = Client::wrap(connection);

        let content_length = body.len().to_string();
        let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
        all_headers.push(("Content-Length", content_length.as_str()));

        let mut request = client.post(url, &all_headers)?;
        request.write_all(body)?;
        request.flush()?;

        let mut response = request.submit()?;
        let status = response.status();

        let mut buf = [0u8; RESPONSE_PREVIEW];
        let mut len = 0;
        while len < buf.len() {
            match esp_idf_svc::io::Read::read(&mut response, &mut buf[len..])? {
                0 => break,
                n => len += n,
            }
        }
        debug!("HTTP {} from {} ({} bytes previewed)", status, url, len);

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&buf[..len]).into_owned(),
        })
    }
}

/// Boot timer for intervals, SNTP-disciplined system time for timestamps
#[derive(Clone, Copy, Default)]
pub struct EspClock;

impl Clock for EspClock {
    fn millis(&self) -> u64 {
        // SAFETY: reads the free-running high resolution timer
        let micros = unsafe { esp_timer_get_time() };
        (micros / 1000) as u64
    }

    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Millisecond waits yield to FreeRTOS, shorter ones spin
#[derive(Clone, Copy, Default)]
pub struct RtosDelay;

impl DelayNs for RtosDelay {
    fn delay_ns(&mut self, ns: u32) {
        Ets::delay_us(ns.div_ceil(1000));
    }

    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

pub struct EspPlatform;

impl Platform for EspPlatform {
    type Serial = GpsUart;
    type Wifi = StationWifi;
    type Http = EspHttp;
    type LedPin = PinDriver<'static, AnyOutputPin, Output>;
    type Clock = EspClock;
    type Delay = RtosDelay;
    type Rng = SmallRng;
}

/// Bring up the board peripherals named in `pins`
pub fn hardware(
    uart: impl peripheral::Peripheral<P = impl esp_idf_hal::uart::Uart> + 'static,
    modem: impl peripheral::Peripheral<P = esp_idf_hal::modem::Modem> + 'static,
    sysloop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
    pins: &PinConfig,
) -> Result<Hardware<EspPlatform>, Box<dyn std::error::Error>> {
    // SAFETY: pin numbers come from the board configuration and each one is
    // claimed exactly once here
    let (gps_tx, gps_rx, led) = unsafe {
        (
            AnyOutputPin::new(i32::from(pins.gps_tx)),
            AnyInputPin::new(i32::from(pins.gps_rx)),
            AnyOutputPin::new(i32::from(pins.led)),
        )
    };

    info!("GPS UART at {} baud", GPS_BAUD);
    let uart = UartDriver::new(
        uart,
        gps_tx,
        gps_rx,
        Option::<AnyInputPin>::None,
        Option::<AnyOutputPin>::None,
        &Config::new().baudrate(Hertz(GPS_BAUD)),
    )?;

    // SAFETY: hardware RNG, valid once the radio is up or the bootloader
    // entropy source is still enabled
    let seed = unsafe { esp_random() };

    Ok(Hardware {
        gps_serial: GpsUart { uart },
        wifi: StationWifi::new(modem, sysloop, nvs)?,
        http: EspHttp,
        led_pin: PinDriver::output(led)?,
        clock: EspClock,
        delay: RtosDelay,
        rng: SmallRng::seed_from_u64(u64::from(seed)),
    })
}
