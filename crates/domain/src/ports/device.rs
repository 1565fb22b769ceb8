//! Device-side ports: OS location API, durable key-value storage and battery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::clock::Clock;
use crate::error::PermissionScope;
use crate::models::PositionFix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    Lowest,
    Balanced,
    #[default]
    High,
    Highest,
}

/// Persistent notification shown while background updates are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundNotification {
    pub title: String,
    pub body: String,
    pub color: String,
}

impl Default for ForegroundNotification {
    fn default() -> Self {
        Self {
            title: "Location Tracking Active".to_string(),
            body: "Your location is being tracked".to_string(),
            color: "#06b6d4".to_string(),
        }
    }
}

/// Background update registration options.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    pub accuracy: Accuracy,
    pub time_interval: Duration,
    pub distance_interval_m: f64,
    pub notification: ForegroundNotification,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            time_interval: Duration::from_secs(30),
            distance_interval_m: 10.0,
            notification: ForegroundNotification::default(),
        }
    }
}

/// Payload delivered to a registered background task.
#[derive(Debug, Clone)]
pub enum LocationUpdate {
    Fixes(Vec<PositionFix>),
    Error(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("location services unavailable: {0}")]
    LocationUnavailable(String),

    #[error("permission not granted ({0})")]
    PermissionDenied(PermissionScope),

    #[error("no task defined under '{0}'")]
    TaskNotDefined(String),

    #[error("updates not started for '{0}'")]
    NotStarted(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("battery unavailable: {0}")]
    Battery(String),
}

/// Callback invoked by the OS for each qualifying location change.
///
/// Runs detached from whatever started tracking, so it receives no caller
/// context and must not fail.
#[async_trait::async_trait]
pub trait LocationUpdateHandler: Send + Sync {
    async fn handle(&self, update: LocationUpdate);
}

/// OS location API.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_foreground_permission(&self) -> Result<PermissionStatus, DeviceError>;

    async fn request_background_permission(&self) -> Result<PermissionStatus, DeviceError>;

    /// One-shot foreground fix.
    async fn current_position(&self, accuracy: Accuracy) -> Result<PositionFix, DeviceError>;

    /// Installs the handler for `task`, replacing any previous one.
    fn define_task(&self, task: &str, handler: Arc<dyn LocationUpdateHandler>);

    async fn start_updates(&self, task: &str, options: &UpdateOptions) -> Result<(), DeviceError>;

    async fn stop_updates(&self, task: &str) -> Result<(), DeviceError>;

    async fn has_started_updates(&self, task: &str) -> Result<bool, DeviceError>;
}

/// Durable string storage readable from the background context.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DeviceError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), DeviceError>;
}

#[async_trait::async_trait]
pub trait BatteryMonitor: Send + Sync {
    /// Instantaneous battery level in 0.0..=1.0.
    async fn battery_level(&self) -> Result<f64, DeviceError>;
}

struct SimulatedState {
    foreground: PermissionStatus,
    background: PermissionStatus,
    position: Option<(f64, f64)>,
    handlers: HashMap<String, Arc<dyn LocationUpdateHandler>>,
    started: HashMap<String, UpdateOptions>,
    permission_requests: Vec<PermissionScope>,
    definitions: usize,
}

/// Location provider driven by test code or a simulation loop.
///
/// Fixes pushed through [`SimulatedLocationProvider::emit`] reach the handler
/// registered for the task, but only while updates are started.
pub struct SimulatedLocationProvider {
    clock: Arc<dyn Clock>,
    state: Mutex<SimulatedState>,
}

impl SimulatedLocationProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(SimulatedState {
                foreground: PermissionStatus::Granted,
                background: PermissionStatus::Granted,
                position: Some((37.7749, -122.4194)),
                handlers: HashMap::new(),
                started: HashMap::new(),
                permission_requests: Vec::new(),
                definitions: 0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_foreground_permission(&self, status: PermissionStatus) {
        self.state().foreground = status;
    }

    pub fn set_background_permission(&self, status: PermissionStatus) {
        self.state().background = status;
    }

    pub fn set_position(&self, lat: f64, lng: f64) {
        self.state().position = Some((lat, lng));
    }

    /// Makes `current_position` fail, as with location services switched off.
    pub fn clear_position(&self) {
        self.state().position = None;
    }

    /// Permission prompts shown so far, in order.
    pub fn requested_permissions(&self) -> Vec<PermissionScope> {
        self.state().permission_requests.clone()
    }

    /// Number of `define_task` calls so far.
    pub fn task_definitions(&self) -> usize {
        self.state().definitions
    }

    pub fn started_options(&self, task: &str) -> Option<UpdateOptions> {
        self.state().started.get(task).cloned()
    }

    /// Delivers an update to the task's handler. Returns whether it was delivered.
    pub async fn emit(&self, task: &str, update: LocationUpdate) -> bool {
        let handler = {
            let state = self.state();
            if !state.started.contains_key(task) {
                return false;
            }
            state.handlers.get(task).cloned()
        };

        match handler {
            Some(handler) => {
                handler.handle(update).await;
                true
            }
            None => false,
        }
    }

    /// Moves the device and delivers a single fix at the current instant.
    pub async fn emit_position(&self, task: &str, lat: f64, lng: f64) -> bool {
        self.set_position(lat, lng);
        let fix = PositionFix::at(lat, lng, self.clock.now());
        self.emit(task, LocationUpdate::Fixes(vec![fix])).await
    }
}

#[async_trait::async_trait]
impl LocationProvider for SimulatedLocationProvider {
    async fn request_foreground_permission(&self) -> Result<PermissionStatus, DeviceError> {
        let mut state = self.state();
        state.permission_requests.push(PermissionScope::Foreground);
        Ok(state.foreground)
    }

    async fn request_background_permission(&self) -> Result<PermissionStatus, DeviceError> {
        let mut state = self.state();
        state.permission_requests.push(PermissionScope::Background);
        Ok(state.background)
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<PositionFix, DeviceError> {
        let (lat, lng) = {
            let state = self.state();
            if !state.foreground.is_granted() {
                return Err(DeviceError::PermissionDenied(PermissionScope::Foreground));
            }
            state
                .position
                .ok_or_else(|| DeviceError::LocationUnavailable("no fix".into()))?
        };

        let mut fix = PositionFix::at(lat, lng, self.clock.now());
        fix.accuracy = Some(match accuracy {
            Accuracy::Lowest => 3000.0,
            Accuracy::Balanced => 100.0,
            Accuracy::High => 10.0,
            Accuracy::Highest => 5.0,
        });
        Ok(fix)
    }

    fn define_task(&self, task: &str, handler: Arc<dyn LocationUpdateHandler>) {
        let mut state = self.state();
        state.handlers.insert(task.to_string(), handler);
        state.definitions += 1;
    }

    async fn start_updates(&self, task: &str, options: &UpdateOptions) -> Result<(), DeviceError> {
        let mut state = self.state();
        if !state.background.is_granted() {
            return Err(DeviceError::PermissionDenied(PermissionScope::Background));
        }
        if !state.handlers.contains_key(task) {
            return Err(DeviceError::TaskNotDefined(task.to_string()));
        }
        state.started.insert(task.to_string(), options.clone());
        Ok(())
    }

    async fn stop_updates(&self, task: &str) -> Result<(), DeviceError> {
        match self.state().started.remove(task) {
            Some(_) => Ok(()),
            None => Err(DeviceError::NotStarted(task.to_string())),
        }
    }

    async fn has_started_updates(&self, task: &str) -> Result<bool, DeviceError> {
        Ok(self.state().started.contains_key(task))
    }
}

/// In-memory key-value store. Can be told to fail.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
    failing: Mutex<bool>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    fn check(&self) -> Result<(), DeviceError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            Err(DeviceError::Storage("simulated storage failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DeviceError> {
        self.check()?;
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DeviceError> {
        self.check()?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Battery reporting a settable level.
pub struct FixedBattery {
    level: Mutex<Option<f64>>,
}

impl FixedBattery {
    pub fn new(level: f64) -> Self {
        Self {
            level: Mutex::new(Some(level)),
        }
    }

    pub fn set_level(&self, level: f64) {
        *self.level.lock().unwrap_or_else(|e| e.into_inner()) = Some(level);
    }

    /// Makes subsequent reads fail.
    pub fn set_unavailable(&self) {
        *self.level.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait::async_trait]
impl BatteryMonitor for FixedBattery {
    async fn battery_level(&self) -> Result<f64, DeviceError> {
        self.level
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ok_or_else(|| DeviceError::Battery("battery state unknown".into()))
    }
}
