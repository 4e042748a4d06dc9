use std::{thread, time::Duration};

use embedded_hal::blocking::delay::DelayMs;

/// Blocking delay that parks the calling thread (a FreeRTOS task on esp-idf)
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl DelayMs<u32> for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
