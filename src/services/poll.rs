use crate::client::ViCareApi;
use crate::entities::climate::ClimateEntity;
use crate::entities::sensor::SensorEntity;
use log::{debug, error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

pub fn run_loop<A: ViCareApi>(
    climate: &mut ClimateEntity<A>,
    sensors: &mut [SensorEntity<A>],
    interval: Duration,
) {
    loop {
        let tick_start = Instant::now();

        poll_once(climate, sensors);

        // A command left a refresh request behind: poll again right away
        // instead of waiting out the cadence.
        if climate.take_refresh_request() {
            continue;
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

/// One polling tick over all entities. Per-entity failures are logged and
/// skipped; stale state stands until the next tick.
pub fn poll_once<A: ViCareApi>(climate: &mut ClimateEntity<A>, sensors: &mut [SensorEntity<A>]) {
    match climate.update() {
        Ok(()) => info!(
            "{}: {} -> {} {}, operation={}, away={}, on={}",
            climate.name(),
            fmt_reading(climate.current_temperature()),
            fmt_reading(climate.target_temperature()),
            climate.temperature_unit(),
            climate.current_operation(),
            fmt_flag(climate.is_away_mode_on()),
            fmt_flag(climate.is_on()),
        ),
        Err(e) => error!("{}: update failed, keeping stale state: {}", climate.name(), e),
    }

    for sensor in sensors.iter_mut() {
        match sensor.update() {
            Ok(()) => {
                if let Some(value) = sensor.state() {
                    debug!("{} = {} {}", sensor.name(), value, sensor.unit_of_measurement());
                }
            }
            Err(e) => warn!("{}: update failed: {}", sensor.name(), e),
        }
    }
}

fn fmt_reading(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn fmt_flag(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
