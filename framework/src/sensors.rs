/// Sensor abstraction shared by the GPS and RFID sensors
///
/// A sensor is polled every loop tick. `update` must not block: it reads
/// whatever the hardware has ready, and when new valid data is accepted it
/// raises an event into the sink it was given. The data itself stays in the
/// sensor as its latest snapshot.
use crate::clock::Clock;
use crate::dispatch::EventHandler;

/// GPIO pin number as wired on the board
pub type Pin = u8;

pub trait Sensor {
    /// Pin the sensor is attached to, if it uses a single GPIO
    fn pin(&self) -> Option<Pin>;

    /// Poll the hardware and raise an event for newly accepted data
    fn update(&mut self, clock: &dyn Clock, events: &mut dyn EventHandler);
}
