//! Simulates a tracker on a delivery route to verify event dispatch and uploads
//!
//! The device runs against the host simulation board: NMEA sentences are fed
//! into the GPS UART, the WiFi access point can be switched off, and the
//! backend answers from a recording HTTP client.
//!
//! **Key test**: a parked vehicle keeps streaming the same fix, which must not
//! produce new GPS records, and records lost during a WiFi outage are not
//! replayed once the link comes back.
//!
//! Run with: cargo run -p modest-iot --example tracker_sim

use modest_iot::clock::Clock;
use modest_iot::sim::{rmc_sentence, SimBench};
use modest_iot::{Event, NetworkConfig, TrackerConfig, TrackingDevice};

const START_UNIX: i64 = 1_742_733_300;
const TICK_MS: u64 = 1_000;

/// Route waypoints (lat, lon), roughly one block apart
const ROUTE: [(f64, f64); 5] = [
    (40.4168, -3.7038),
    (40.4175, -3.7021),
    (40.4183, -3.7004),
    (40.4190, -3.6987),
    (40.4198, -3.6970),
];

fn main() {
    let config = TrackerConfig::new(NetworkConfig {
        wifi_ssid: "Wokwi-GUEST".to_string(),
        wifi_password: String::new(),
        tracking_endpoint: "https://example.com/api/v1/tracking".to_string(),
        rfid_endpoint: "https://example.com/api/v1/rfid".to_string(),
        device_id: "tracker-sim".to_string(),
    });

    let bench = SimBench::new(START_UNIX, 42);
    let mut device = TrackingDevice::new(&config, bench.hardware());

    println!("=== Modest IoT Tracker Simulation ===\n");
    println!("This simulates: BOOT → DRIVE → PARKED → WIFI OUTAGE → RECOVERY\n");

    // Phase 1: Boot
    println!("Phase 1: BOOT");
    device.initialize();
    println!(
        "  WiFi connected: {}, RFID codes: {:?}, t={:.1}s\n",
        device.communication_handler().is_wifi_connected(),
        device.rfid_sensor().codes(),
        seconds(&bench)
    );

    // Phase 2: Drive the route, one waypoint per GPS interval
    println!("Phase 2: DRIVE ({} waypoints)", ROUTE.len());
    let mut gps_events = 0;
    for &(lat, lon) in &ROUTE {
        gps_events += run_for(&mut device, &bench, config.timing.gps_interval_ms + TICK_MS, |b| {
            b.serial.push_str(&rmc_sentence(lat, lon))
        });
    }
    println!("  GPS events: {} (expected {})", gps_events, ROUTE.len());
    report(&bench);

    // Phase 3: Parked, the receiver keeps reporting the last waypoint
    println!("Phase 3: PARKED (30s of identical fixes)");
    let (lat, lon) = ROUTE[ROUTE.len() - 1];
    let parked_events = run_for(&mut device, &bench, 30_000, |b| {
        b.serial.push_str(&rmc_sentence(lat, lon))
    });
    if parked_events == 0 {
        println!("  ✓ PASS: no GPS records while parked");
    } else {
        println!("  ⚠️  WARNING: {} GPS records while parked", parked_events);
    }
    report(&bench);

    // Phase 4: Access point goes away
    println!("Phase 4: WIFI OUTAGE");
    bench.wifi.set_reachable(false);
    let posts_before = bench.http.post_count();
    let outage_events = run_for(&mut device, &bench, 25_000, |b| {
        b.serial.push_str(&rmc_sentence(40.4205, -3.6953))
    });
    println!(
        "  GPS events: {}, uploads during outage: {}",
        outage_events,
        bench.http.post_count() - posts_before
    );
    report(&bench);

    // Phase 5: Access point back, backend starts rejecting
    println!("Phase 5: RECOVERY (backend answering 503)");
    bench.wifi.set_reachable(true);
    bench.http.respond_with(503);
    run_for(&mut device, &bench, 12_000, |b| {
        b.serial.push_str(&rmc_sentence(40.4212, -3.6936))
    });
    println!(
        "  WiFi connected: {}, next record id: {}",
        device.communication_handler().is_wifi_connected(),
        device.communication_handler().record_id()
    );
    report(&bench);

    println!("=== Simulation Complete ===");
    println!("\nSummary:");
    println!("- One GPS record per changed fix, none while parked");
    println!("- Uploads stop while WiFi is down and resume after reconnect");
    println!("- HTTP error statuses still consume a record id");
}

/// Tick the device for `duration_ms` of simulated time, feeding the UART
/// before each tick. Returns the number of GPS events dispatched.
fn run_for<F>(
    device: &mut TrackingDevice<modest_iot::sim::SimPlatform>,
    bench: &SimBench,
    duration_ms: u64,
    mut feed: F,
) -> usize
where
    F: FnMut(&SimBench),
{
    let end = bench.clock.millis() + duration_ms;
    let mut gps_events = 0;
    while bench.clock.millis() < end {
        feed(bench);
        for event in device.update() {
            match event {
                Event::GpsData => {
                    gps_events += 1;
                    let fix = device.gps_sensor().last_data();
                    println!(
                        "  t={:.1}s: GPS {:.4}, {:.4} at {}",
                        seconds(bench),
                        fix.latitude,
                        fix.longitude,
                        fix.timestamp
                    );
                }
                Event::RfidDetected => {
                    println!(
                        "  t={:.1}s: RFID {}",
                        seconds(bench),
                        device.rfid_sensor().last_detection().rfid_code
                    );
                }
            }
        }
        bench.clock.advance(TICK_MS);
    }
    gps_events
}

fn seconds(bench: &SimBench) -> f64 {
    bench.clock.millis() as f64 / 1000.0
}

fn report(bench: &SimBench) {
    let posts = bench.http.posts();
    let gps = posts.iter().filter(|p| p.url.ends_with("/tracking")).count();
    println!(
        "  uploads so far: {} GPS, {} RFID\n",
        gps,
        posts.len() - gps
    );
}
