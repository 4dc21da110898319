//! Read-only sensor entities, one per vendor metric.

use std::rc::Rc;

use crate::client::{ViCareApi, ViCareError};
use crate::models::vicare::{
    Metric, SensorValue, UNIT_CELSIUS, UNIT_KILOWATT, UNIT_KILOWATT_HOURS, UNIT_NONE,
};

pub struct SensorEntity<A> {
    api: Rc<A>,
    metric: Metric,
    unit: &'static str,
    state: Option<SensorValue>,
}

impl<A: ViCareApi> SensorEntity<A> {
    pub fn new(api: Rc<A>, metric: Metric, unit: &'static str) -> Self {
        SensorEntity {
            api,
            metric,
            unit,
            state: None,
        }
    }

    pub fn name(&self) -> String {
        format!("vicare_{}", self.metric.name())
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn unit_of_measurement(&self) -> &'static str {
        self.unit
    }

    /// Last polled reading; `None` until the first successful poll.
    pub fn state(&self) -> Option<&SensorValue> {
        self.state.as_ref()
    }

    /// Replace the reading wholesale with whatever the vendor reports.
    /// On error the previous reading is kept.
    pub fn update(&mut self) -> Result<(), ViCareError> {
        self.state = Some(self.api.read_metric(self.metric)?);
        Ok(())
    }
}

/// The full sensor registration table: every metric with its unit.
pub fn default_sensors<A: ViCareApi>(api: &Rc<A>) -> Vec<SensorEntity<A>> {
    let sensor = |metric, unit| SensorEntity::new(Rc::clone(api), metric, unit);
    vec![
        sensor(Metric::BoilerTemperature, UNIT_CELSIUS),
        sensor(Metric::Programs, UNIT_NONE),
        sensor(Metric::ActiveProgram, UNIT_NONE),
        sensor(Metric::Modes, UNIT_NONE),
        sensor(Metric::ActiveMode, UNIT_NONE),
        sensor(Metric::CurrentDesiredTemperature, UNIT_CELSIUS),
        sensor(Metric::OutsideTemperature, UNIT_CELSIUS),
        sensor(Metric::RoomTemperature, UNIT_CELSIUS),
        sensor(Metric::SupplyTemperature, UNIT_CELSIUS),
        sensor(Metric::DomesticHotWaterStorageTemperature, UNIT_CELSIUS),
        sensor(Metric::HeatingCurveSlope, UNIT_NONE),
        sensor(Metric::HeatingCurveShift, UNIT_NONE),
        sensor(Metric::MonthSinceLastService, UNIT_NONE),
        sensor(Metric::LastServiceDate, UNIT_NONE),
        sensor(Metric::GasConsumptionHeatingDays, UNIT_NONE),
        sensor(Metric::GasConsumptionHeatingToday, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionHeatingWeeks, UNIT_NONE),
        sensor(Metric::GasConsumptionHeatingThisWeek, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionHeatingMonths, UNIT_NONE),
        sensor(Metric::GasConsumptionHeatingThisMonth, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionHeatingYears, UNIT_NONE),
        sensor(Metric::GasConsumptionHeatingThisYear, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionDomesticHotWaterDays, UNIT_NONE),
        sensor(Metric::GasConsumptionDomesticHotWaterToday, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionDomesticHotWaterWeeks, UNIT_NONE),
        sensor(Metric::GasConsumptionDomesticHotWaterThisWeek, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionDomesticHotWaterMonths, UNIT_NONE),
        sensor(Metric::GasConsumptionDomesticHotWaterThisMonth, UNIT_KILOWATT_HOURS),
        sensor(Metric::GasConsumptionDomesticHotWaterYears, UNIT_NONE),
        sensor(Metric::GasConsumptionDomesticHotWaterThisYear, UNIT_KILOWATT_HOURS),
        sensor(Metric::DomesticHotWaterConfiguredTemperature, UNIT_CELSIUS),
        sensor(Metric::CurrentPower, UNIT_KILOWATT),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::mock::RecordingApi;
    use std::collections::HashSet;

    #[test]
    fn registry_lists_every_metric_exactly_once() {
        let api = Rc::new(RecordingApi::default());
        let sensors = default_sensors(&api);

        let metrics: HashSet<Metric> = sensors.iter().map(|s| s.metric()).collect();
        assert_eq!(metrics.len(), sensors.len(), "registry has duplicate metrics");
        assert_eq!(sensors.len(), 32);
    }

    #[test]
    fn names_carry_the_vendor_prefix() {
        let api = Rc::new(RecordingApi::default());
        let sensor = SensorEntity::new(Rc::clone(&api), Metric::BoilerTemperature, UNIT_CELSIUS);
        assert_eq!(sensor.name(), "vicare_BoilerTemperature");
    }

    #[test]
    fn registration_units_match_the_metric() {
        let api = Rc::new(RecordingApi::default());
        let sensors = default_sensors(&api);
        let unit_of = |metric: Metric| {
            sensors
                .iter()
                .find(|s| s.metric() == metric)
                .map(|s| s.unit_of_measurement())
                .unwrap()
        };

        assert_eq!(unit_of(Metric::BoilerTemperature), UNIT_CELSIUS);
        assert_eq!(unit_of(Metric::GasConsumptionHeatingToday), UNIT_KILOWATT_HOURS);
        assert_eq!(unit_of(Metric::GasConsumptionHeatingDays), UNIT_NONE);
        assert_eq!(unit_of(Metric::CurrentPower), UNIT_KILOWATT);
        assert_eq!(unit_of(Metric::HeatingCurveSlope), UNIT_NONE);
    }

    #[test]
    fn update_stores_the_reading_verbatim() {
        let api = Rc::new(RecordingApi::default());
        api.metrics
            .borrow_mut()
            .insert(Metric::OutsideTemperature, SensorValue::Number(-3.2));

        let mut sensor = SensorEntity::new(Rc::clone(&api), Metric::OutsideTemperature, UNIT_CELSIUS);
        sensor.update().unwrap();

        assert_eq!(sensor.state(), Some(&SensorValue::Number(-3.2)));
    }

    #[test]
    fn failed_update_leaves_state_unset() {
        let api = Rc::new(RecordingApi::default());
        let mut sensor = SensorEntity::new(Rc::clone(&api), Metric::CurrentPower, UNIT_KILOWATT);

        assert!(sensor.update().is_err());
        assert_eq!(sensor.state(), None);
    }

    #[test]
    fn failed_update_keeps_the_previous_reading() {
        let api = Rc::new(RecordingApi::default());
        api.metrics
            .borrow_mut()
            .insert(Metric::CurrentPower, SensorValue::Number(11.0));

        let mut sensor = SensorEntity::new(Rc::clone(&api), Metric::CurrentPower, UNIT_KILOWATT);
        sensor.update().unwrap();
        api.metrics.borrow_mut().clear();

        assert!(sensor.update().is_err());
        assert_eq!(sensor.state(), Some(&SensorValue::Number(11.0)));
    }
}
