/// Status LED actuator driven by on/off/toggle commands
use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::dispatch::{Command, CommandHandler};

pub struct Led<P> {
    pin: P,
    state: bool,
}

impl<P: OutputPin> Led<P> {
    /// Take the pin and drive it to `initial_state` immediately
    pub fn new(pin: P, initial_state: bool) -> Self {
        let mut led = Self {
            pin,
            state: initial_state,
        };
        led.apply();
        led
    }

    /// Last commanded level (true = lit)
    pub fn state(&self) -> bool {
        self.state
    }

    pub fn set_state(&mut self, on: bool) {
        self.state = on;
        self.apply();
    }

    pub fn turn_on(&mut self) {
        self.set_state(true);
    }

    pub fn turn_off(&mut self) {
        self.set_state(false);
    }

    pub fn toggle(&mut self) {
        self.set_state(!self.state);
    }

    fn apply(&mut self) {
        let result = if self.state {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        // A stuck LED is cosmetic, keep running
        if let Err(e) = result {
            warn!("LED pin write failed: {:?}", e);
        }
    }
}

impl<P: OutputPin> CommandHandler for Led<P> {
    fn handle(&mut self, command: Command) {
        match command {
            Command::ToggleLed => self.toggle(),
            Command::TurnOn => self.turn_on(),
            Command::TurnOff => self.turn_off(),
            other => debug!("LED ignores {:?}", other),
        }
    }
}
