//! Climate entity for one heating circuit.
//!
//! Poll-driven: the embedding layer calls [`ClimateEntity::update`] on its
//! own cadence and reads the properties afterwards. Commands mutate the local
//! flags optimistically, issue the vendor call, and leave a refresh request
//! for the poll driver; reconciliation with the vendor's true state happens
//! on the next successful poll.

use log::error;
use std::rc::Rc;

use crate::client::{ViCareApi, ViCareError};
use crate::models::vicare::{HeatingMode, Operation, PROGRAM_EXTERNAL, Program, UNIT_CELSIUS};

/// Substituted when the room sensor reports null or the error placeholder.
pub const TEMPERATURE_SENTINEL: f64 = -1.0;

const SUPPORTED_OPERATIONS: [Operation; 4] =
    [Operation::Off, Operation::Heat, Operation::Eco, Operation::Auto];

pub struct ClimateEntity<A> {
    api: Rc<A>,
    name: String,
    current_temperature: Option<f64>,
    target_temperature: Option<f64>,
    current_mode: Option<HeatingMode>,
    current_program: Option<Program>,
    away: Option<bool>,
    on: Option<bool>,
    /// Mode to restore when leaving away/off; sticky across polls.
    previous_mode: HeatingMode,
    refresh_pending: bool,
}

impl<A: ViCareApi> ClimateEntity<A> {
    pub fn new(name: impl Into<String>, api: Rc<A>) -> Self {
        ClimateEntity {
            api,
            name: name.into(),
            current_temperature: None,
            target_temperature: None,
            current_mode: None,
            current_program: None,
            away: None,
            on: None,
            previous_mode: HeatingMode::ForcedReduced,
            refresh_pending: false,
        }
    }

    /// Pull a fresh snapshot from the vendor and rederive the flags.
    pub fn update(&mut self) -> Result<(), ViCareError> {
        let room = self.api.room_temperature()?;
        self.current_temperature = Some(room.unwrap_or(TEMPERATURE_SENTINEL));
        self.current_program = Some(self.api.active_program()?);
        let mode = self.api.active_mode()?;
        self.current_mode = Some(mode.clone());
        self.target_temperature = self.api.current_desired_temperature()?;
        self.away = Some(mode == HeatingMode::ForcedReduced);
        self.on = Some(matches!(
            mode,
            HeatingMode::DhwAndHeating | HeatingMode::ForcedReduced | HeatingMode::ForcedNormal
        ));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temperature_unit(&self) -> &'static str {
        UNIT_CELSIUS
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature
    }

    pub fn current_operation(&self) -> Operation {
        match &self.current_mode {
            Some(mode) => mode.operation(),
            None => Operation::Unknown,
        }
    }

    pub fn operation_list(&self) -> &'static [Operation] {
        &SUPPORTED_OPERATIONS
    }

    pub fn is_away_mode_on(&self) -> Option<bool> {
        self.away
    }

    pub fn is_on(&self) -> Option<bool> {
        self.on
    }

    /// Consume the pending refresh request left behind by a command.
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    fn request_refresh(&mut self) {
        self.refresh_pending = true;
    }

    pub fn set_operation_mode(&mut self, operation: Operation) -> Result<(), ViCareError> {
        if !SUPPORTED_OPERATIONS.contains(&operation) {
            error!(
                "An error occurred while setting operation mode. Unsupported operation mode: {}",
                operation
            );
            return Ok(());
        }
        // A schedule would override a plain mode change; switching to the
        // external program first makes the manual mode stick.
        self.api.activate_program(&Program::from(PROGRAM_EXTERNAL))?;
        match operation.heating_mode() {
            Some(mode) => self.api.set_mode(&mode)?,
            None => error!(
                "An error occurred while setting operation mode. Unknown operation mode: {}",
                operation
            ),
        }
        self.request_refresh();
        Ok(())
    }

    /// Set the target temperature. `None` (no temperature supplied) is a
    /// silent no-op. The routing depends on the mode observed at the last
    /// poll, not on anything being set here.
    pub fn set_temperature(&mut self, temperature: Option<f64>) -> Result<(), ViCareError> {
        let Some(target) = temperature else {
            return Ok(());
        };
        self.target_temperature = Some(target);

        match &self.current_mode {
            Some(HeatingMode::DhwAndHeating) => match self.current_program.clone() {
                Some(program) => self.api.set_program_temperature(&program, target)?,
                None => error!("Cannot set the temperature: active program not yet known"),
            },
            Some(HeatingMode::ForcedNormal) | Some(HeatingMode::ForcedReduced) => {
                self.api.set_reduced_temperature(target)?
            }
            other => error!(
                "Cannot set the temperature for mode '{}'",
                other.as_ref().map(HeatingMode::as_str).unwrap_or("unknown")
            ),
        }

        self.request_refresh();
        Ok(())
    }

    pub fn turn_away_mode_on(&mut self) -> Result<(), ViCareError> {
        self.away = Some(true);
        if let Some(mode) = self.current_mode.clone() {
            self.previous_mode = mode;
        }
        self.api.set_mode(&HeatingMode::ForcedReduced)?;
        self.request_refresh();
        Ok(())
    }

    pub fn turn_away_mode_off(&mut self) -> Result<(), ViCareError> {
        self.away = Some(false);
        let mode = self.previous_mode.clone();
        self.api.set_mode(&mode)?;
        self.request_refresh();
        Ok(())
    }

    pub fn turn_on(&mut self) -> Result<(), ViCareError> {
        self.on = Some(true);
        let mode = self.previous_mode.clone();
        self.api.set_mode(&mode)?;
        self.request_refresh();
        Ok(())
    }

    pub fn turn_off(&mut self) -> Result<(), ViCareError> {
        self.on = Some(false);
        if let Some(mode) = self.current_mode.clone() {
            self.previous_mode = mode;
        }
        self.api.set_mode(&HeatingMode::Standby)?;
        self.request_refresh();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::mock::{ApiCall, RecordingApi};

    fn entity_with(api: &Rc<RecordingApi>) -> ClimateEntity<RecordingApi> {
        ClimateEntity::new("vicare", Rc::clone(api))
    }

    #[test]
    fn update_snapshots_vendor_state() {
        let api = Rc::new(RecordingApi::default());
        *api.room_temperature.borrow_mut() = Some(21.5);
        *api.active_program.borrow_mut() = Program::from("comfort");
        *api.active_mode.borrow_mut() = HeatingMode::DhwAndHeating;
        *api.desired_temperature.borrow_mut() = Some(22.0);

        let mut climate = entity_with(&api);
        climate.update().unwrap();

        assert_eq!(climate.current_temperature(), Some(21.5));
        assert_eq!(climate.target_temperature(), Some(22.0));
        assert_eq!(climate.current_operation(), Operation::Auto);
        assert_eq!(climate.is_away_mode_on(), Some(false));
        assert_eq!(climate.is_on(), Some(true));
    }

    #[test]
    fn unavailable_room_temperature_becomes_sentinel() {
        let api = Rc::new(RecordingApi::default());
        *api.room_temperature.borrow_mut() = None;

        let mut climate = entity_with(&api);
        climate.update().unwrap();

        assert_eq!(climate.current_temperature(), Some(TEMPERATURE_SENTINEL));
    }

    #[test]
    fn forced_reduced_means_away_and_on() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::ForcedReduced;

        let mut climate = entity_with(&api);
        climate.update().unwrap();

        assert_eq!(climate.is_away_mode_on(), Some(true));
        assert_eq!(climate.is_on(), Some(true));
        assert_eq!(climate.current_operation(), Operation::Eco);
    }

    #[test]
    fn standby_means_neither_away_nor_on() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::Standby;

        let mut climate = entity_with(&api);
        climate.update().unwrap();

        assert_eq!(climate.is_away_mode_on(), Some(false));
        assert_eq!(climate.is_on(), Some(false));
        assert_eq!(climate.current_operation(), Operation::Off);
    }

    #[test]
    fn operation_before_first_poll_is_unknown() {
        let api = Rc::new(RecordingApi::default());
        let climate = entity_with(&api);
        assert_eq!(climate.current_operation(), Operation::Unknown);
    }

    #[test]
    fn set_operation_mode_issues_program_then_mode() {
        let cases = [
            (Operation::Heat, "forcedNormal"),
            (Operation::Eco, "forcedReduced"),
            (Operation::Auto, "dhwAndHeating"),
            (Operation::Off, "standby"),
        ];
        for (operation, expected_mode) in cases {
            let api = Rc::new(RecordingApi::default());
            let mut climate = entity_with(&api);

            climate.set_operation_mode(operation).unwrap();

            assert_eq!(
                api.taken_calls(),
                vec![
                    ApiCall::ActivateProgram(PROGRAM_EXTERNAL.to_string()),
                    ApiCall::SetMode(expected_mode.to_string()),
                ],
                "wrong call sequence for {operation}"
            );
            assert!(climate.take_refresh_request());
        }
    }

    #[test]
    fn unsupported_operation_mode_issues_no_calls() {
        let api = Rc::new(RecordingApi::default());
        let mut climate = entity_with(&api);

        climate.set_operation_mode(Operation::Unknown).unwrap();

        assert!(api.taken_calls().is_empty());
        assert!(!climate.take_refresh_request());
    }

    #[test]
    fn set_temperature_without_value_is_a_no_op() {
        let api = Rc::new(RecordingApi::default());
        let mut climate = entity_with(&api);
        climate.update().unwrap();
        let before = climate.target_temperature();

        climate.set_temperature(None).unwrap();

        assert!(api.taken_calls().is_empty());
        assert_eq!(climate.target_temperature(), before);
        assert!(!climate.take_refresh_request());
    }

    #[test]
    fn set_temperature_routes_to_active_program_when_auto() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::DhwAndHeating;
        *api.active_program.borrow_mut() = Program::from("comfort");

        let mut climate = entity_with(&api);
        climate.update().unwrap();
        api.clear_calls();

        climate.set_temperature(Some(23.0)).unwrap();

        assert_eq!(
            api.taken_calls(),
            vec![ApiCall::SetProgramTemperature("comfort".to_string(), 23.0)]
        );
        assert_eq!(climate.target_temperature(), Some(23.0));
    }

    #[test]
    fn set_temperature_routes_to_reduced_setpoint_for_forced_modes() {
        for mode in [HeatingMode::ForcedNormal, HeatingMode::ForcedReduced] {
            let api = Rc::new(RecordingApi::default());
            *api.active_mode.borrow_mut() = mode.clone();

            let mut climate = entity_with(&api);
            climate.update().unwrap();
            api.clear_calls();

            climate.set_temperature(Some(18.5)).unwrap();

            assert_eq!(
                api.taken_calls(),
                vec![ApiCall::SetReducedTemperature(18.5)],
                "wrong routing for mode {mode}"
            );
        }
    }

    #[test]
    fn set_temperature_in_water_only_mode_issues_no_call() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::Dhw;

        let mut climate = entity_with(&api);
        climate.update().unwrap();
        api.clear_calls();

        climate.set_temperature(Some(25.0)).unwrap();

        assert!(api.taken_calls().is_empty());
        // stored locally regardless, like the rest of the optimistic state
        assert_eq!(climate.target_temperature(), Some(25.0));
    }

    #[test]
    fn away_round_trip_restores_previous_mode_exactly() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::Other("holidayAtHome".to_string());

        let mut climate = entity_with(&api);
        climate.update().unwrap();
        api.clear_calls();

        climate.turn_away_mode_on().unwrap();
        assert_eq!(climate.is_away_mode_on(), Some(true));

        climate.turn_away_mode_off().unwrap();
        assert_eq!(climate.is_away_mode_on(), Some(false));

        assert_eq!(
            api.taken_calls(),
            vec![
                ApiCall::SetMode("forcedReduced".to_string()),
                ApiCall::SetMode("holidayAtHome".to_string()),
            ]
        );
    }

    #[test]
    fn turn_off_then_on_round_trips_through_standby() {
        let api = Rc::new(RecordingApi::default());
        *api.active_mode.borrow_mut() = HeatingMode::ForcedNormal;

        let mut climate = entity_with(&api);
        climate.update().unwrap();
        api.clear_calls();

        climate.turn_off().unwrap();
        assert_eq!(climate.is_on(), Some(false));

        climate.turn_on().unwrap();
        assert_eq!(climate.is_on(), Some(true));

        assert_eq!(
            api.taken_calls(),
            vec![
                ApiCall::SetMode("standby".to_string()),
                ApiCall::SetMode("forcedNormal".to_string()),
            ]
        );
    }

    #[test]
    fn turn_on_without_history_falls_back_to_reduced() {
        let api = Rc::new(RecordingApi::default());
        let mut climate = entity_with(&api);

        climate.turn_on().unwrap();

        assert_eq!(api.taken_calls(), vec![ApiCall::SetMode("forcedReduced".to_string())]);
    }

    #[test]
    fn commands_request_refresh_and_polling_clears_it() {
        let api = Rc::new(RecordingApi::default());
        let mut climate = entity_with(&api);

        climate.turn_off().unwrap();
        assert!(climate.take_refresh_request());
        assert!(!climate.take_refresh_request());
    }
}
