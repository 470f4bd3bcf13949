//! Periodic location check that reports movement to the backend and turns
//! proximity matches into tip notifications.

use std::{sync::Arc, time::Duration};

use db::{
    DBService,
    models::{last_known_position::LastKnownPosition, location_match::LocationMatch},
};
use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, info, warn};
use utils::geo::Position;

use super::{
    enact_api::{EnactApiError, TipsBackend},
    location::{LocationOptions, LocationProvider},
    notification::NotificationDispatcher,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Delay before the next check when the last check saw no movement.
    pub stationary_interval: Duration,
    /// Delay before the next check when the last check saw movement.
    pub moving_interval: Duration,
    pub movement_threshold_meters: f64,
    pub location: LocationOptions,
    pub ai_tips: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            stationary_interval: Duration::from_secs(60),
            moving_interval: Duration::from_secs(30),
            movement_threshold_meters: 10.0,
            location: LocationOptions::default(),
            ai_tips: false,
        }
    }
}

/// Result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TickOutcome {
    /// Position within the movement threshold of the last report; nothing sent.
    Skipped,
    /// Position sent to the backend.
    Reported { matched: bool, notified: bool },
    /// The location provider produced no position.
    LocationUnavailable,
    /// The backend call failed; retried on the next tick.
    Failed,
    /// The backend rejected the bearer token.
    Unauthorized,
}

pub struct LocationPoller {
    provider: Arc<dyn LocationProvider>,
    backend: Arc<dyn TipsBackend>,
    dispatcher: Arc<NotificationDispatcher>,
    store: Option<DBService>,
    config: PollerConfig,
    last_reported: Option<Position>,
    is_moving: bool,
}

impl LocationPoller {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        backend: Arc<dyn TipsBackend>,
        dispatcher: Arc<NotificationDispatcher>,
        config: PollerConfig,
    ) -> Self {
        Self {
            provider,
            backend,
            dispatcher,
            store: None,
            config,
            last_reported: None,
            is_moving: false,
        }
    }

    /// Persist every reported position to `db`.
    pub fn with_store(mut self, db: DBService) -> Self {
        self.store = Some(db);
        self
    }

    /// Seed the last reported position from the store, if any.
    pub async fn restore_last_position(&mut self) -> Result<Option<Position>, sqlx::Error> {
        let Some(db) = &self.store else {
            return Ok(None);
        };
        let restored = LastKnownPosition::find(&db.pool)
            .await?
            .map(|last| last.position());
        if let Some(position) = restored {
            debug!(
                latitude = position.latitude,
                longitude = position.longitude,
                "Restored last reported position"
            );
            self.last_reported = Some(position);
        }
        Ok(restored)
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn last_reported(&self) -> Option<Position> {
        self.last_reported
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Delay until the next tick, chosen from the latest movement check.
    pub fn next_interval(&self) -> Duration {
        if self.is_moving {
            self.config.moving_interval
        } else {
            self.config.stationary_interval
        }
    }

    /// Sample the device position and report it if it moved past the threshold.
    pub async fn tick(&mut self, token: &str) -> TickOutcome {
        let position = match self.provider.current_position(&self.config.location).await {
            Ok(position) => position,
            Err(e) => {
                warn!(code = e.code(), error = %e, "Location unavailable");
                return TickOutcome::LocationUnavailable;
            }
        };

        let distance = self
            .last_reported
            .map(|last| last.distance_to(&position));
        let threshold = self.config.movement_threshold_meters;
        self.is_moving = distance.is_some_and(|d| d > threshold);

        if distance.is_some_and(|d| d <= threshold) {
            debug!(
                distance_meters = ?distance,
                threshold,
                "Position within threshold, skipping report"
            );
            return TickOutcome::Skipped;
        }

        match self.backend.submit_location(token, &position).await {
            Ok(location_match) => {
                self.record_reported(position).await;
                match location_match {
                    Some(location_match) => self.deliver_tips(token, &location_match).await,
                    None => {
                        debug!(
                            latitude = position.latitude,
                            longitude = position.longitude,
                            "Position reported, no nearby location"
                        );
                        TickOutcome::Reported {
                            matched: false,
                            notified: false,
                        }
                    }
                }
            }
            Err(EnactApiError::Unauthorized) => {
                warn!("Location report rejected: unauthorized");
                TickOutcome::Unauthorized
            }
            Err(e) => {
                warn!(error = %e, "Location report failed");
                TickOutcome::Failed
            }
        }
    }

    async fn record_reported(&mut self, position: Position) {
        self.last_reported = Some(position);
        let Some(db) = &self.store else {
            return;
        };
        if let Err(e) = LastKnownPosition::upsert(&db.pool, &position).await {
            warn!(error = %e, "Failed to persist last known position");
        }
    }

    async fn deliver_tips(&self, token: &str, location_match: &LocationMatch) -> TickOutcome {
        info!(
            location_name = %location_match.location_name,
            location_type = %location_match.location_type,
            location_id = ?location_match.location_id,
            "Proximity match"
        );

        let tips = match self
            .backend
            .fetch_tips(token, &location_match.location_type, self.config.ai_tips)
            .await
        {
            Ok(tips) => tips,
            Err(EnactApiError::Unauthorized) => {
                warn!("Tip fetch rejected: unauthorized");
                return TickOutcome::Unauthorized;
            }
            Err(e) => {
                warn!(
                    location_type = %location_match.location_type,
                    error = %e,
                    "Failed to fetch tips"
                );
                return TickOutcome::Reported {
                    matched: true,
                    notified: false,
                };
            }
        };

        let notified = match self.dispatcher.dispatch(location_match, &tips).await {
            Ok(shown) => shown.is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to display tip notification");
                false
            }
        };

        TickOutcome::Reported {
            matched: true,
            notified,
        }
    }
}
