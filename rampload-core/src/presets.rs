//! The built-in user-registration load test.
//!
//! Ramps the arrival rate from 0 to 90 000 iterations/s over 15 minutes, each iteration
//! registering the same admin user against the demo service.

use std::time::Duration;

use crate::request::{HttpMethod, RequestSpec, join_url};
use crate::runner::{LoadOptions, ScenarioOptions, Stage};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const USER_REGISTER_PATH: &str = "/user-register";
pub const USER_REGISTER_SCENARIO: &str = "constant_request_rate";

pub const USER_REGISTER_FIELDS: [(&str, &str); 4] = [
    ("username", "admin"),
    ("name", "admin"),
    ("birthdate", "2024-10-10T02:59:10.843897"),
    ("password", "superSecretAdminPassword123"),
];

/// `POST {base_url}/user-register` with the fixed admin payload.
pub fn register_user_request(base_url: &str) -> RequestSpec {
    USER_REGISTER_FIELDS.iter().fold(
        RequestSpec::new(HttpMethod::Post, join_url(base_url, USER_REGISTER_PATH)),
        |req, (name, value)| req.with_field(*name, *value),
    )
}

pub fn user_register_scenario() -> ScenarioOptions {
    ScenarioOptions {
        name: USER_REGISTER_SCENARIO.to_string(),
        executor: Some("ramping-arrival-rate".to_string()),
        start_rate: Some(0),
        time_unit: Some(Duration::from_secs(1)),
        stages: vec![Stage {
            duration: Duration::from_secs(15 * 60),
            target: 90_000,
        }],
        pre_allocated_vus: Some(100),
        max_vus: Some(200),
        ..ScenarioOptions::default()
    }
}

/// Scenarios plus the request every iteration sends.
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub options: LoadOptions,
    pub request: RequestSpec,
}

impl TestPlan {
    pub fn user_register(base_url: &str) -> Self {
        Self {
            options: LoadOptions {
                scenarios: vec![user_register_scenario()],
                ..LoadOptions::default()
            },
            request: register_user_request(base_url),
        }
    }
}
