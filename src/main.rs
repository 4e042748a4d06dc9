#![allow(unexpected_cfgs)]

#[cfg(target_arch = "riscv32")]
esp_idf_sys::esp_app_desc! {}

#[cfg(target_arch = "riscv32")]
mod nvs;

/// Log lines printed with every status dump
#[cfg(target_arch = "riscv32")]
const STATUS_LOG_LINES: usize = 10;

#[cfg(target_arch = "riscv32")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use esp_idf_hal::adc::oneshot::AdcDriver;
    use esp_idf_hal::adc::ADC1;
    use trms_meter::adc::SampleSource;
    use trms_meter::clock::MonotonicClock;
    use trms_meter::current_sensor::CurrentSensor;
    use trms_meter::delay::ThreadDelay;
    use trms_meter::driver::adc::EspAdcChannel;
    use trms_meter::logger::ReportLogger;
    use trms_meter::statistics::RunningStatistics;
    use trms_meter::CurrentMonitor;

    esp_idf_svc::sys::link_patches();

    let logger: Box<ReportLogger> = Default::default();
    let history = logger.buffer.clone();
    log::set_boxed_logger(logger)?;
    log::set_max_level(log::LevelFilter::Info);
    println!("Started logger");

    let config = nvs::load_config()?;
    println!("{config:#?}");

    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let pins = peripherals.pins;
    let adc: &'static AdcDriver<'static, ADC1> =
        Box::leak(Box::new(AdcDriver::new(peripherals.adc1)?));

    // ADC1 inputs of the ESP32-C3, each can only be handed out once
    let mut gpio0 = Some(pins.gpio0);
    let mut gpio1 = Some(pins.gpio1);
    let mut gpio2 = Some(pins.gpio2);
    let mut gpio3 = Some(pins.gpio3);
    let mut gpio4 = Some(pins.gpio4);

    let clock = MonotonicClock::default();
    let mut sensors = Vec::new();
    for sensor in &config.sensors {
        let taken = |ch: u8| format!("GPIO{ch} is not a free ADC1 input");
        let source: Box<dyn SampleSource> = match sensor.channel {
            0 => Box::new(EspAdcChannel::new(adc, gpio0.take().ok_or_else(|| taken(0))?)?),
            1 => Box::new(EspAdcChannel::new(adc, gpio1.take().ok_or_else(|| taken(1))?)?),
            2 => Box::new(EspAdcChannel::new(adc, gpio2.take().ok_or_else(|| taken(2))?)?),
            3 => Box::new(EspAdcChannel::new(adc, gpio3.take().ok_or_else(|| taken(3))?)?),
            4 => Box::new(EspAdcChannel::new(adc, gpio4.take().ok_or_else(|| taken(4))?)?),
            ch => return Err(taken(ch).into()),
        };
        let stats = RunningStatistics::new(clock, 0.8);
        sensors.push(CurrentSensor::from_config(sensor, source, ThreadDelay, stats)?);
    }

    let mut monitor = CurrentMonitor::new(sensors, config.report_every);
    let status = monitor.status();
    // Printed directly so the dump does not end up in the history itself
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(5));
        let json = status.lock().map(|s| serde_json::to_string(&*s));
        if let Ok(Ok(json)) = json {
            println!("Status: {json}");
        }
        if let Ok(history) = history.lock() {
            for line in history.tail(STATUS_LOG_LINES) {
                println!("  {line}");
            }
        }
    });

    monitor.run(std::time::Duration::from_millis(config.update_interval_ms))?;
    Ok(())
}

/// Without hardware: a simulated 50 Hz load on a biased sensor
#[cfg(not(target_arch = "riscv32"))]
fn main() -> anyhow::Result<()> {
    use std::{
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    };
    use trms_meter::clock::MonotonicClock;
    use trms_meter::config::MonitorConfig;
    use trms_meter::current_sensor::CurrentSensor;
    use trms_meter::delay::ThreadDelay;
    use trms_meter::logger::ReportLogger;
    use trms_meter::simulation::{SimulatedSource, Waveform};
    use trms_meter::statistics::RunningStatistics;
    use trms_meter::{ControlMessage, CurrentMonitor};

    let logger = Box::<ReportLogger>::default();
    let history = logger.buffer.clone();
    log::set_boxed_logger(logger)?;
    log::set_max_level(log::LevelFilter::Info);

    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => MonitorConfig::from_json(r#"{"sensors": [{"channel": 1, "slope": 0.0123}], "report_every": 500}"#)?,
    };

    let clock = MonotonicClock::default();
    let adc = Arc::new(Mutex::new(SimulatedSource::new(
        clock,
        Waveform::Sine,
        2048.0,
        0.0,
        50.0,
    )));

    let mut sensors = Vec::new();
    for sensor in &config.sensors {
        let stats = RunningStatistics::new(clock, 0.8);
        sensors.push(CurrentSensor::from_config(sensor, adc.clone(), ThreadDelay, stats)?);
    }
    let mut monitor = CurrentMonitor::new(sensors, config.report_every);
    let control = monitor.control_channel();

    let load = adc.clone();
    thread::spawn(move || {
        // Wait for calibration before switching the load on
        thread::sleep(Duration::from_secs(3));
        if let Ok(mut source) = load.lock() {
            source.set_amplitude(400.0);
        }
        thread::sleep(Duration::from_secs(5));
        let _ = control.send(ControlMessage::Shutdown);
    });

    monitor.run(Duration::from_millis(config.update_interval_ms))?;

    if let Ok(history) = history.lock() {
        println!("Last {} log lines:", history.len());
        for line in history.iter() {
            println!("  {line}");
        }
    }
    Ok(())
}
