//! Registers the push-messaging device token with the backend once.

use db::{DBService, models::device_registration::DeviceRegistration};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::enact_api::{EnactApiClient, EnactApiError};

#[derive(Debug, Error)]
pub enum PushRegistrationError {
    #[error("backend error: {0}")]
    Api(#[from] EnactApiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
}

pub struct PushRegistrationService {
    client: EnactApiClient,
    db: DBService,
}

impl PushRegistrationService {
    pub fn new(client: EnactApiClient, db: DBService) -> Self {
        Self { client, db }
    }

    pub async fn register(
        &self,
        session_token: &str,
        device_token: &str,
    ) -> Result<RegistrationOutcome, PushRegistrationError> {
        if DeviceRegistration::find(&self.db.pool, device_token)
            .await?
            .is_some()
        {
            debug!("Device token already registered");
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        let response = self
            .client
            .register_device_token(session_token, device_token)
            .await?;
        let response = (!response.is_null()).then(|| response.to_string());
        DeviceRegistration::create(&self.db.pool, device_token, response).await?;

        info!("Device token registered");
        Ok(RegistrationOutcome::Registered)
    }
}
