use adc::SampleSource;
use current_sensor::{window_for_frequency, CurrentSensor, SensorError};
use embedded_hal::blocking::delay::DelayMs;
use serde::Serialize;
use statistics::WindowedStatistics;
use std::{
    sync::{mpsc, Arc, Mutex},
    thread::sleep,
    time::Duration,
};

pub mod adc;
pub mod clock;
pub mod config;
pub mod current_sensor;
pub mod delay;
pub mod logger;
pub mod simulation;
pub mod statistics;

#[cfg(target_arch = "riscv32")]
pub mod driver;

pub enum ControlMessage {
    /// Re-window every sensor for a different mains frequency
    SetLineFrequency(f32),
    /// Measure the zero offsets again. Only meaningful with no load connected.
    Recalibrate,
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: u8,
    pub calibrated: bool,
    pub offset_mv: f32,
    pub window_secs: f32,
    pub rms_mv: f32,
    pub current: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub channels: Vec<ChannelStatus>,
    pub reports: u64,
}

/// Polls a set of current sensors from a single thread.
///
/// Every tick feeds one sample per sensor, and every `report_every` ticks
/// the RMS currents are computed and published to the shared status.
pub struct CurrentMonitor<S, D, W>
where
    S: SampleSource,
    D: DelayMs<u32>,
    W: WindowedStatistics,
{
    sensors: Vec<CurrentSensor<S, D, W>>,
    report_every: u32,
    tick: u32,
    running: bool,

    status: Arc<Mutex<MonitorStatus>>,

    control_tx: mpsc::Sender<ControlMessage>,
    control_rx: mpsc::Receiver<ControlMessage>,
}

impl<S, D, W> CurrentMonitor<S, D, W>
where
    S: SampleSource,
    D: DelayMs<u32>,
    W: WindowedStatistics,
{
    pub fn new(sensors: Vec<CurrentSensor<S, D, W>>, report_every: u32) -> Self {
        let (tx, rx) = mpsc::channel();

        let monitor = Self {
            sensors,
            report_every: report_every.max(1),
            tick: 0,
            running: true,
            status: Default::default(),
            control_tx: tx,
            control_rx: rx,
        };
        monitor.publish();
        monitor
    }

    pub fn status(&self) -> Arc<Mutex<MonitorStatus>> {
        self.status.clone()
    }

    pub fn control_channel(&self) -> mpsc::Sender<ControlMessage> {
        self.control_tx.clone()
    }

    pub fn sensors(&self) -> &[CurrentSensor<S, D, W>] {
        &self.sensors
    }

    /// Initializes and calibrates every sensor, one after the other.
    /// Blocks for roughly 1 ms per calibration sample.
    pub fn start(&mut self) -> Result<(), SensorError> {
        for sensor in self.sensors.iter_mut() {
            sensor.begin()?;
        }
        self.calibrate_all()?;
        self.publish();
        Ok(())
    }

    /// One polling step. Returns false once shut down.
    pub fn tick(&mut self) -> bool {
        while let Ok(msg) = self.control_rx.try_recv() {
            self.handle(msg);
        }
        if !self.running {
            return false;
        }

        for sensor in self.sensors.iter_mut() {
            sensor.update();
        }

        self.tick = (self.tick + 1) % self.report_every;
        if self.tick == 0 {
            self.report();
        }
        true
    }

    /// Starts the sensors and polls them until a `Shutdown` message arrives.
    pub fn run(&mut self, interval: Duration) -> Result<(), SensorError> {
        self.start()?;
        log::info!("Monitoring {} sensor(s)", self.sensors.len());
        while self.tick() {
            sleep(interval);
        }
        log::info!("Monitor stopped");
        Ok(())
    }

    fn handle(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::SetLineFrequency(hz) => {
                let window = match window_for_frequency(hz) {
                    Ok(window) => window,
                    Err(e) => {
                        log::error!("Not changing line frequency: {}", e);
                        return;
                    }
                };
                for sensor in self.sensors.iter_mut() {
                    sensor.apply_window(window);
                }
                log::info!("Line frequency set to {} Hz", hz);
                self.publish();
            }
            ControlMessage::Recalibrate => {
                if let Err(e) = self.calibrate_all() {
                    log::error!("Recalibration failed: {}", e);
                }
                self.publish();
            }
            ControlMessage::Shutdown => {
                self.running = false;
            }
        }
    }

    fn calibrate_all(&mut self) -> Result<(), SensorError> {
        for sensor in self.sensors.iter_mut() {
            let samples = sensor.calibration_samples();
            sensor.calibrate(samples)?;
        }
        Ok(())
    }

    fn report(&mut self) {
        for (i, sensor) in self.sensors.iter_mut().enumerate() {
            sensor.current(i + 1);
        }
        if let Ok(mut status) = self.status.lock() {
            status.reports += 1;
        }
        self.publish();
    }

    fn publish(&self) {
        let channels = self
            .sensors
            .iter()
            .map(|s| ChannelStatus {
                channel: s.channel(),
                calibrated: s.is_calibrated(),
                offset_mv: s.offset(),
                window_secs: s.window_secs(),
                rms_mv: s.last_rms_mv(),
                current: s.last_current(),
            })
            .collect();
        if let Ok(mut status) = self.status.lock() {
            status.channels = channels;
        }
    }
}
