//! Standalone HTTP client for the ViCare heating API.
//!
//! - Blocking client using `ureq` (no async).
//! - Uses existing models in `crate::models::vicare`.
//! - Reads operational-data features and issues feature commands for one
//!   heating circuit of one installation.
//!
//! Authentication
//! - Performs OAuth2 password grant against the vendor identity provider,
//!   manages refresh automatically, and persists the token to the configured
//!   cache file so restarts reuse it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::vicare::*;

const API_BASE: &str = "https://api.viessmann-platform.io";
const OAUTH_TOKEN_URL: &str = "https://iam.viessmann-platform.io/idp/v1/token";
const OAUTH_CLIENT_ID: &str = "79742319e39245de5f91d15ff4cac2a8";
const OAUTH_CLIENT_SECRET: &str = "8ad97aceb92c5892e102b093c7c083fa";
const OAUTH_SCOPE: &str = "offline_access";

/// Refresh the token this close to its expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug)]
pub enum ViCareError {
    Transport(String),
    Http { status: u16, message: String },
    Json(String),
    Auth(String),
    MissingValue { feature: String, property: &'static str },
    NoInstallation,
}

impl core::fmt::Display for ViCareError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ViCareError::Transport(s) => write!(f, "transport error: {}", s),
            ViCareError::Http { status, message } => write!(f, "http {}: {}", status, message),
            ViCareError::Json(e) => write!(f, "json error: {}", e),
            ViCareError::Auth(e) => write!(f, "auth error: {}", e),
            ViCareError::MissingValue { feature, property } => {
                write!(f, "feature {} has no property '{}'", feature, property)
            }
            ViCareError::NoInstallation => write!(f, "account has no installations"),
        }
    }
}

impl std::error::Error for ViCareError {}

impl From<serde_json::Error> for ViCareError {
    fn from(value: serde_json::Error) -> Self {
        ViCareError::Json(value.to_string())
    }
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

#[derive(Debug)]
struct OAuthState {
    token: Option<OAuthToken>,
    username: String,
    password: String,
    token_file: PathBuf,
}

/// Narrow capability set the entities consume.
///
/// Implemented by [`ViCareClient`]; tests substitute a recording mock. All
/// calls are synchronous and hit the vendor directly — there is no caching
/// between them.
pub trait ViCareApi {
    /// Room temperature of the bound circuit. `None` covers both a null
    /// reading and the vendor's literal `"error"` placeholder.
    fn room_temperature(&self) -> Result<Option<f64>, ViCareError>;
    fn active_program(&self) -> Result<Program, ViCareError>;
    fn active_mode(&self) -> Result<HeatingMode, ViCareError>;
    fn current_desired_temperature(&self) -> Result<Option<f64>, ViCareError>;
    fn activate_program(&self, program: &Program) -> Result<(), ViCareError>;
    fn set_mode(&self, mode: &HeatingMode) -> Result<(), ViCareError>;
    fn set_program_temperature(&self, program: &Program, target: f64) -> Result<(), ViCareError>;
    fn set_reduced_temperature(&self, target: f64) -> Result<(), ViCareError>;
    fn read_metric(&self, metric: Metric) -> Result<SensorValue, ViCareError>;
}

pub struct ViCareClient {
    agent: ureq::Agent,
    oauth: RefCell<OAuthState>,
    circuit: Circuit,
    installation: Installation,
}

impl ViCareClient {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        token_file: impl Into<PathBuf>,
        circuit: Circuit,
    ) -> Result<Self, ViCareError> {
        let agent = ureq::AgentBuilder::new().build();
        let token_file = token_file.into();

        let state = OAuthState {
            token: load_cached_token(&token_file),
            username: username.into(),
            password: password.into(),
            token_file,
        };

        let mut client = ViCareClient {
            agent,
            oauth: RefCell::new(state),
            circuit,
            installation: Installation {
                id: 0,
                gateway_serial: String::new(),
            },
        };

        // Forces a grant (or refresh) up front so credential problems fail
        // construction instead of the first poll.
        client.get_bearer()?;

        let list: InstallationList = client.get_json("/general-management/installations")?;
        client.installation = list
            .installations
            .into_iter()
            .next()
            .ok_or(ViCareError::NoInstallation)?;
        debug!(
            "Bound to installation {} (gateway {}), circuit {}",
            client.installation.id, client.installation.gateway_serial, client.circuit.0
        );

        Ok(client)
    }

    fn url(path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", API_BASE, path)
        } else {
            format!("{}/{}", API_BASE, path)
        }
    }

    fn feature_path(&self, feature: &str) -> String {
        format!(
            "/operational-data/installations/{}/gateways/{}/devices/0/features/{}",
            self.installation.id, self.installation.gateway_serial, feature
        )
    }

    /// Feature name scoped to the bound heating circuit.
    fn circuit_feature(&self, suffix: &str) -> String {
        circuit_feature(self.circuit, suffix)
    }

    fn oauth_password_grant(agent: &ureq::Agent, state: &OAuthState) -> Result<OAuthToken, ViCareError> {
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .set("Accept", "application/json")
            .send_form(&[
                ("client_id", OAUTH_CLIENT_ID),
                ("client_secret", OAUTH_CLIENT_SECRET),
                ("grant_type", "password"),
                ("scope", OAUTH_SCOPE),
                ("username", state.username.as_str()),
                ("password", state.password.as_str()),
            ]);
        Self::parse_token_response(resp)
    }

    fn oauth_refresh_grant(agent: &ureq::Agent, refresh: &str) -> Result<OAuthToken, ViCareError> {
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .set("Accept", "application/json")
            .send_form(&[
                ("client_id", OAUTH_CLIENT_ID),
                ("client_secret", OAUTH_CLIENT_SECRET),
                ("grant_type", "refresh_token"),
                ("scope", OAUTH_SCOPE),
                ("refresh_token", refresh),
            ]);
        Self::parse_token_response(resp)
    }

    fn parse_token_response(resp: Result<ureq::Response, ureq::Error>) -> Result<OAuthToken, ViCareError> {
        match resp {
            Ok(r) => {
                let TokenResponse {
                    access_token,
                    expires_in,
                    refresh_token,
                } = decode_json(r)?;
                Ok(OAuthToken {
                    access_token,
                    expires_at: Utc::now() + ChronoDuration::seconds(expires_in as i64),
                    refresh_token,
                })
            }
            Err(ureq::Error::Transport(t)) => Err(ViCareError::Transport(t.to_string())),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(ViCareError::Auth(format!("http {}: {}", status, body)))
            }
        }
    }

    fn get_bearer(&self) -> Result<String, ViCareError> {
        let mut s = self.oauth.borrow_mut();
        if let Some(t) = &s.token {
            if Utc::now() + ChronoDuration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < t.expires_at {
                return Ok(t.access_token.clone());
            }
        }
        let new_tok = match s.token.as_ref().and_then(|t| t.refresh_token.clone()) {
            Some(r) => Self::oauth_refresh_grant(&self.agent, &r)
                .or_else(|_| Self::oauth_password_grant(&self.agent, &s)),
            None => Self::oauth_password_grant(&self.agent, &s),
        }?;
        persist_token(&s.token_file, &new_tok);
        let bearer = new_tok.access_token.clone();
        s.token = Some(new_tok);
        Ok(bearer)
    }

    fn force_refresh(&self) -> Result<(), ViCareError> {
        let mut s = self.oauth.borrow_mut();
        let refreshed = match s.token.as_ref().and_then(|t| t.refresh_token.clone()) {
            Some(r) => Self::oauth_refresh_grant(&self.agent, &r)
                .or_else(|_| Self::oauth_password_grant(&self.agent, &s)),
            None => Self::oauth_password_grant(&self.agent, &s),
        }?;
        persist_token(&s.token_file, &refreshed);
        s.token = Some(refreshed);
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ViCareError> {
        let url = Self::url(path);
        let token = self.get_bearer()?;
        let req = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {}", token));

        // Call, retry once on 401 after forcing refresh
        match req.call() {
            Ok(res) => decode_json(res),
            Err(ureq::Error::Status(401, _)) => {
                self.force_refresh()?;
                let token2 = self.get_bearer()?;
                let req2 = self
                    .agent
                    .get(&url)
                    .set("Accept", "application/json")
                    .set("Authorization", &format!("Bearer {}", token2));
                match req2.call() {
                    Ok(res2) => decode_json(res2),
                    Err(ureq::Error::Transport(t)) => Err(ViCareError::Transport(t.to_string())),
                    Err(ureq::Error::Status(status, res)) => {
                        let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                        Err(ViCareError::Http { status, message: body })
                    }
                }
            }
            Err(ureq::Error::Transport(t)) => Err(ViCareError::Transport(t.to_string())),
            Err(ureq::Error::Status(status, res)) => {
                let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(ViCareError::Http { status, message: body })
            }
        }
    }

    fn get_feature(&self, feature: &str) -> Result<Feature, ViCareError> {
        self.get_json(&self.feature_path(feature))
    }

    fn post_command(&self, feature: &str, command: &str, body: serde_json::Value) -> Result<(), ViCareError> {
        let url = Self::url(&format!("{}/commands/{}", self.feature_path(feature), command));
        let token = self.get_bearer()?;
        let resp = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {}", token))
            .send_json(&body);

        match resp {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(401, _)) => {
                self.force_refresh()?;
                let token2 = self.get_bearer()?;
                let retry = self
                    .agent
                    .post(&url)
                    .set("Accept", "application/json")
                    .set("Authorization", &format!("Bearer {}", token2))
                    .send_json(&body);
                match retry {
                    Ok(_) => Ok(()),
                    Err(ureq::Error::Transport(t)) => Err(ViCareError::Transport(t.to_string())),
                    Err(ureq::Error::Status(status, res)) => {
                        let message = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                        Err(ViCareError::Http { status, message })
                    }
                }
            }
            Err(ureq::Error::Transport(t)) => Err(ViCareError::Transport(t.to_string())),
            Err(ureq::Error::Status(status, res)) => {
                let message = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(ViCareError::Http { status, message })
            }
        }
    }

    fn required_number(&self, feature: &str, property: &'static str) -> Result<SensorValue, ViCareError> {
        let f = self.get_feature(feature)?;
        f.number(property)
            .map(SensorValue::Number)
            .ok_or_else(|| ViCareError::MissingValue {
                feature: feature.to_string(),
                property,
            })
    }

    fn required_text(&self, feature: &str, property: &'static str) -> Result<SensorValue, ViCareError> {
        let f = self.get_feature(feature)?;
        f.text(property)
            .map(SensorValue::Text)
            .ok_or_else(|| ViCareError::MissingValue {
                feature: feature.to_string(),
                property,
            })
    }

    fn required_texts(&self, feature: &str, property: &'static str) -> Result<SensorValue, ViCareError> {
        let f = self.get_feature(feature)?;
        f.texts(property)
            .map(SensorValue::Texts)
            .ok_or_else(|| ViCareError::MissingValue {
                feature: feature.to_string(),
                property,
            })
    }

    /// Consumption series for one accounting period, most recent entry first.
    fn consumption_series(&self, feature: &str, period: &'static str) -> Result<Vec<f64>, ViCareError> {
        let f = self.get_feature(feature)?;
        f.numbers(period).ok_or_else(|| ViCareError::MissingValue {
            feature: feature.to_string(),
            property: period,
        })
    }

    fn consumption_latest(&self, feature: &str, period: &'static str) -> Result<SensorValue, ViCareError> {
        let series = self.consumption_series(feature, period)?;
        series
            .first()
            .copied()
            .map(SensorValue::Number)
            .ok_or_else(|| ViCareError::MissingValue {
                feature: feature.to_string(),
                property: period,
            })
    }
}

pub fn circuit_feature(circuit: Circuit, suffix: &str) -> String {
    format!("heating.circuits.{}.{}", circuit.0, suffix)
}

fn load_cached_token(path: &Path) -> Option<OAuthToken> {
    let raw = fs::read_to_string(path).ok()?;
    let cached: CachedToken = match serde_json::from_str(&raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Ignoring unreadable token cache {}: {}", path.display(), e);
            return None;
        }
    };
    // An expired cache still carries the refresh token; get_bearer sorts it out.
    Some(OAuthToken {
        access_token: cached.access_token,
        expires_at: cached.expires_at,
        refresh_token: cached.refresh_token,
    })
}

fn persist_token(path: &Path, token: &OAuthToken) {
    let cached = CachedToken {
        access_token: token.access_token.clone(),
        refresh_token: token.refresh_token.clone(),
        expires_at: token.expires_at,
    };
    match serde_json::to_string(&cached) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!("Failed to persist token cache {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("Failed to serialize token cache: {}", e),
    }
}

fn decode_json<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, ViCareError> {
    let mut de = serde_json::Deserializer::from_reader(resp.into_reader());
    serde_path_to_error::deserialize(&mut de).map_err(|e| ViCareError::Json(e.to_string()))
}

impl ViCareApi for ViCareClient {
    fn room_temperature(&self) -> Result<Option<f64>, ViCareError> {
        let feature = self.get_feature(&self.circuit_feature("sensors.temperature.room"))?;
        let value = match feature.properties.get("value") {
            Some(p) => &p.value,
            None => return Ok(None),
        };
        // The vendor reports either a number, JSON null, or the literal
        // string "error" when the sensor is unavailable.
        Ok(value.as_f64())
    }

    fn active_program(&self) -> Result<Program, ViCareError> {
        let feature_name = self.circuit_feature("operating.programs.active");
        let feature = self.get_feature(&feature_name)?;
        feature.text("value").map(Program).ok_or(ViCareError::MissingValue {
            feature: feature_name,
            property: "value",
        })
    }

    fn active_mode(&self) -> Result<HeatingMode, ViCareError> {
        let feature_name = self.circuit_feature("operating.modes.active");
        let feature = self.get_feature(&feature_name)?;
        feature
            .text("value")
            .map(|s| HeatingMode::from(s.as_str()))
            .ok_or(ViCareError::MissingValue {
                feature: feature_name,
                property: "value",
            })
    }

    fn current_desired_temperature(&self) -> Result<Option<f64>, ViCareError> {
        let program = self.active_program()?;
        let feature = self.get_feature(&self.circuit_feature(&format!("operating.programs.{}", program.0)))?;
        Ok(feature.number("temperature"))
    }

    fn activate_program(&self, program: &Program) -> Result<(), ViCareError> {
        self.post_command(
            &self.circuit_feature(&format!("operating.programs.{}", program.0)),
            "activate",
            json!({}),
        )
    }

    fn set_mode(&self, mode: &HeatingMode) -> Result<(), ViCareError> {
        self.post_command(
            &self.circuit_feature("operating.modes.active"),
            "setMode",
            json!({ "mode": mode.as_str() }),
        )
    }

    fn set_program_temperature(&self, program: &Program, target: f64) -> Result<(), ViCareError> {
        self.post_command(
            &self.circuit_feature(&format!("operating.programs.{}", program.0)),
            "setTemperature",
            json!({ "targetTemperature": target }),
        )
    }

    fn set_reduced_temperature(&self, target: f64) -> Result<(), ViCareError> {
        self.set_program_temperature(&Program::from(PROGRAM_REDUCED), target)
    }

    fn read_metric(&self, metric: Metric) -> Result<SensorValue, ViCareError> {
        const GAS_HEATING: &str = "heating.gas.consumption.heating";
        const GAS_DHW: &str = "heating.gas.consumption.dhw";

        match metric {
            Metric::BoilerTemperature => self.required_number("heating.boiler.sensors.temperature.main", "value"),
            Metric::Programs => self.required_texts(&self.circuit_feature("operating.programs"), "enabled"),
            Metric::ActiveProgram => {
                self.required_text(&self.circuit_feature("operating.programs.active"), "value")
            }
            Metric::Modes => self.required_texts(&self.circuit_feature("operating.modes"), "enabled"),
            Metric::ActiveMode => self.required_text(&self.circuit_feature("operating.modes.active"), "value"),
            Metric::CurrentDesiredTemperature => {
                let feature_name = self.circuit_feature("operating.programs.active");
                self.current_desired_temperature()?
                    .map(SensorValue::Number)
                    .ok_or(ViCareError::MissingValue {
                        feature: feature_name,
                        property: "temperature",
                    })
            }
            Metric::OutsideTemperature => self.required_number("heating.sensors.temperature.outside", "value"),
            Metric::RoomTemperature => {
                self.required_number(&self.circuit_feature("sensors.temperature.room"), "value")
            }
            Metric::SupplyTemperature => {
                self.required_number(&self.circuit_feature("sensors.temperature.supply"), "value")
            }
            Metric::DomesticHotWaterStorageTemperature => {
                self.required_number("heating.dhw.sensors.temperature.hotWaterStorage", "value")
            }
            Metric::HeatingCurveSlope => self.required_number(&self.circuit_feature("heating.curve"), "slope"),
            Metric::HeatingCurveShift => self.required_number(&self.circuit_feature("heating.curve"), "shift"),
            Metric::MonthSinceLastService => {
                self.required_number("heating.service.timeBased", "activeMonthSinceLastService")
            }
            Metric::LastServiceDate => self.required_text("heating.service.timeBased", "lastService"),
            Metric::GasConsumptionHeatingDays => {
                self.consumption_series(GAS_HEATING, "day").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionHeatingToday => self.consumption_latest(GAS_HEATING, "day"),
            Metric::GasConsumptionHeatingWeeks => {
                self.consumption_series(GAS_HEATING, "week").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionHeatingThisWeek => self.consumption_latest(GAS_HEATING, "week"),
            Metric::GasConsumptionHeatingMonths => {
                self.consumption_series(GAS_HEATING, "month").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionHeatingThisMonth => self.consumption_latest(GAS_HEATING, "month"),
            Metric::GasConsumptionHeatingYears => {
                self.consumption_series(GAS_HEATING, "year").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionHeatingThisYear => self.consumption_latest(GAS_HEATING, "year"),
            Metric::GasConsumptionDomesticHotWaterDays => {
                self.consumption_series(GAS_DHW, "day").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionDomesticHotWaterToday => self.consumption_latest(GAS_DHW, "day"),
            Metric::GasConsumptionDomesticHotWaterWeeks => {
                self.consumption_series(GAS_DHW, "week").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionDomesticHotWaterThisWeek => self.consumption_latest(GAS_DHW, "week"),
            Metric::GasConsumptionDomesticHotWaterMonths => {
                self.consumption_series(GAS_DHW, "month").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionDomesticHotWaterThisMonth => self.consumption_latest(GAS_DHW, "month"),
            Metric::GasConsumptionDomesticHotWaterYears => {
                self.consumption_series(GAS_DHW, "year").map(SensorValue::Numbers)
            }
            Metric::GasConsumptionDomesticHotWaterThisYear => self.consumption_latest(GAS_DHW, "year"),
            Metric::DomesticHotWaterConfiguredTemperature => self.required_number("heating.dhw.temperature", "value"),
            Metric::CurrentPower => self.required_number("heating.burner.current.power", "value"),
        }
    }
}
