//! In-memory doubles for the backend and the location provider.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use db::models::{location_match::LocationMatch, tip::Tip};
use utils::geo::Position;

use super::{
    enact_api::{EnactApiError, TipsBackend},
    location::{LocationError, LocationOptions, LocationProvider},
};

/// Serves scripted positions in order, then repeats the last one.
pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Position, LocationError>>>,
    last: Mutex<Option<Result<Position, LocationError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Position, LocationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn current_position(
        &self,
        _options: &LocationOptions,
    ) -> Result<Position, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = Some(next.clone());
        }
        last.clone().unwrap_or(Err(LocationError::Unavailable))
    }
}

/// Backend double. Queued results are consumed first; afterwards every call succeeds.
#[derive(Default)]
pub(crate) struct MockBackend {
    submit_results: Mutex<VecDeque<Result<Option<LocationMatch>, EnactApiError>>>,
    verify_results: Mutex<VecDeque<Result<(), EnactApiError>>>,
    tips: Mutex<Vec<Tip>>,
    submitted: Mutex<Vec<Position>>,
    tip_requests: Mutex<Vec<String>>,
    verify_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    usage_started: Mutex<Vec<String>>,
    usage_ended: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn push_submit(&self, result: Result<Option<LocationMatch>, EnactApiError>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    pub fn push_verify(&self, result: Result<(), EnactApiError>) {
        self.verify_results.lock().unwrap().push_back(result);
    }

    pub fn set_tips(&self, tips: Vec<Tip>) {
        *self.tips.lock().unwrap() = tips;
    }

    pub fn submitted(&self) -> Vec<Position> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn tip_requests(&self) -> Vec<String> {
        self.tip_requests.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Device info sent with each usage-session start.
    pub fn usage_started(&self) -> Vec<String> {
        self.usage_started.lock().unwrap().clone()
    }

    /// Ids of ended usage sessions, in order.
    pub fn usage_ended(&self) -> Vec<String> {
        self.usage_ended.lock().unwrap().clone()
    }
}

#[async_trait]
impl TipsBackend for MockBackend {
    async fn verify_token(&self, _token: &str) -> Result<(), EnactApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn submit_location(
        &self,
        _token: &str,
        position: &Position,
    ) -> Result<Option<LocationMatch>, EnactApiError> {
        self.submitted.lock().unwrap().push(*position);
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn fetch_tips(
        &self,
        _token: &str,
        location_type: &str,
        _ai: bool,
    ) -> Result<Vec<Tip>, EnactApiError> {
        self.tip_requests
            .lock()
            .unwrap()
            .push(location_type.to_string());
        Ok(self.tips.lock().unwrap().clone())
    }

    async fn logout(&self, _token: &str) -> Result<(), EnactApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_usage_session(
        &self,
        _token: &str,
        device_info: &str,
    ) -> Result<Option<String>, EnactApiError> {
        let mut started = self.usage_started.lock().unwrap();
        started.push(device_info.to_string());
        Ok(Some(format!("s{}", started.len())))
    }

    async fn end_usage_session(&self, _token: &str, session_id: &str) -> Result<(), EnactApiError> {
        self.usage_ended.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}
