//! Device location sources.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use utils::geo::Position;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location services unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

impl LocationError {
    /// Platform error code (1 = permission, 2 = unavailable, 3 = timeout).
    pub fn code(&self) -> u8 {
        match self {
            Self::PermissionDenied => 1,
            Self::Unavailable => 2,
            Self::Timeout => 3,
        }
    }
}

/// Accuracy and freshness requirements for a single position request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(15),
            maximum_age: Duration::from_secs(10),
        }
    }
}

impl LocationOptions {
    /// Request made while the app is in the background: lower accuracy,
    /// longer timeout and no cached fixes.
    pub fn background() -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_secs(30),
            maximum_age: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, options: &LocationOptions)
    -> Result<Position, LocationError>;
}

/// A position reported by an external source along with when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub position: Position,
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy in metres, when the source reports one.
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FeedState {
    Disabled,
    Waiting,
    Fix(Fix),
}

/// Location provider fed by pushed fixes.
///
/// Cloning shares the same feed.
#[derive(Debug, Clone)]
pub struct LocationFeed {
    tx: watch::Sender<FeedState>,
}

impl Default for LocationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FeedState::Waiting);
        Self { tx }
    }

    pub fn push(&self, fix: Fix) {
        debug!(
            latitude = fix.position.latitude,
            longitude = fix.position.longitude,
            "Location fix received"
        );
        self.tx.send_replace(FeedState::Fix(fix));
    }

    pub fn push_position(&self, position: Position) {
        self.push(Fix {
            position,
            timestamp: Utc::now(),
            accuracy: None,
        });
    }

    /// Revoke access; pending and future requests fail with `PermissionDenied`
    /// until a new fix is pushed.
    pub fn disable(&self) {
        self.tx.send_replace(FeedState::Disabled);
    }

    pub fn latest(&self) -> Option<Fix> {
        match *self.tx.borrow() {
            FeedState::Fix(fix) => Some(fix),
            _ => None,
        }
    }

    fn usable(state: &FeedState, options: &LocationOptions) -> Result<Option<Position>, LocationError> {
        match state {
            FeedState::Disabled => Err(LocationError::PermissionDenied),
            FeedState::Waiting => Ok(None),
            FeedState::Fix(fix) => {
                if options.high_accuracy
                    && fix.accuracy.is_some_and(|a| a > HIGH_ACCURACY_LIMIT_METERS)
                {
                    return Ok(None);
                }
                let age = Utc::now()
                    .signed_duration_since(fix.timestamp)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if options.maximum_age.is_zero() || age > options.maximum_age {
                    return Ok(None);
                }
                Ok(Some(fix.position))
            }
        }
    }
}

/// Fixes coarser than this are not served to high-accuracy requests.
const HIGH_ACCURACY_LIMIT_METERS: f64 = 100.0;

#[async_trait]
impl LocationProvider for LocationFeed {
    async fn current_position(
        &self,
        options: &LocationOptions,
    ) -> Result<Position, LocationError> {
        let mut rx = self.tx.subscribe();
        let current = Self::usable(&rx.borrow_and_update(), options)?;
        if let Some(position) = current {
            return Ok(position);
        }

        // Wait for a fresh fix; anything pushed from now on counts as new.
        let fresh = LocationOptions {
            maximum_age: options.timeout.max(Duration::from_secs(1)),
            ..*options
        };
        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return Err(LocationError::Unavailable);
                }
                let latest = Self::usable(&rx.borrow_and_update(), &fresh)?;
                if let Some(position) = latest {
                    return Ok(position);
                }
            }
        };
        tokio::time::timeout(options.timeout, wait)
            .await
            .map_err(|_| LocationError::Timeout)?
    }
}
