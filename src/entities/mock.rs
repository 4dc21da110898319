//! Recording test double for the vendor session.

use crate::client::{ViCareApi, ViCareError};
use crate::models::vicare::*;
use std::cell::RefCell;
use std::collections::HashMap;

/// One vendor command as observed by the mock, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    ActivateProgram(String),
    SetMode(String),
    SetProgramTemperature(String, f64),
    SetReducedTemperature(f64),
}

/// Scriptable session: reads come from the cells, writes are recorded.
pub struct RecordingApi {
    pub room_temperature: RefCell<Option<f64>>,
    pub active_program: RefCell<Program>,
    pub active_mode: RefCell<HeatingMode>,
    pub desired_temperature: RefCell<Option<f64>>,
    pub metrics: RefCell<HashMap<Metric, SensorValue>>,
    pub calls: RefCell<Vec<ApiCall>>,
}

impl Default for RecordingApi {
    fn default() -> Self {
        RecordingApi {
            room_temperature: RefCell::new(Some(20.0)),
            active_program: RefCell::new(Program::from("normal")),
            active_mode: RefCell::new(HeatingMode::Standby),
            desired_temperature: RefCell::new(Some(20.0)),
            metrics: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl RecordingApi {
    pub fn taken_calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl ViCareApi for RecordingApi {
    fn room_temperature(&self) -> Result<Option<f64>, ViCareError> {
        Ok(*self.room_temperature.borrow())
    }

    fn active_program(&self) -> Result<Program, ViCareError> {
        Ok(self.active_program.borrow().clone())
    }

    fn active_mode(&self) -> Result<HeatingMode, ViCareError> {
        Ok(self.active_mode.borrow().clone())
    }

    fn current_desired_temperature(&self) -> Result<Option<f64>, ViCareError> {
        Ok(*self.desired_temperature.borrow())
    }

    fn activate_program(&self, program: &Program) -> Result<(), ViCareError> {
        self.calls.borrow_mut().push(ApiCall::ActivateProgram(program.0.clone()));
        Ok(())
    }

    fn set_mode(&self, mode: &HeatingMode) -> Result<(), ViCareError> {
        self.calls.borrow_mut().push(ApiCall::SetMode(mode.as_str().to_string()));
        Ok(())
    }

    fn set_program_temperature(&self, program: &Program, target: f64) -> Result<(), ViCareError> {
        self.calls
            .borrow_mut()
            .push(ApiCall::SetProgramTemperature(program.0.clone(), target));
        Ok(())
    }

    fn set_reduced_temperature(&self, target: f64) -> Result<(), ViCareError> {
        self.calls.borrow_mut().push(ApiCall::SetReducedTemperature(target));
        Ok(())
    }

    fn read_metric(&self, metric: Metric) -> Result<SensorValue, ViCareError> {
        self.metrics
            .borrow()
            .get(&metric)
            .cloned()
            .ok_or(ViCareError::MissingValue {
                feature: metric.name().to_string(),
                property: "value",
            })
    }
}
