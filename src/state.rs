//! Shared application state for all routes.

use std::sync::Arc;

use crate::bus::RequestBus;
use crate::provider::ConnectionProvider;

#[derive(Clone)]
pub struct ApiState {
    pub bus: Arc<RequestBus>,
    /// Used by readiness checks; entity operations go through the bus.
    pub provider: Arc<dyn ConnectionProvider>,
}

impl ApiState {
    pub fn new(bus: Arc<RequestBus>, provider: Arc<dyn ConnectionProvider>) -> Self {
        ApiState { bus, provider }
    }
}
