//! Application state shared by handlers

use imgflow_core::Config;
use imgflow_db::MarkerStore;
use imgflow_worker::Dispatcher;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
    pub markers: Arc<dyn MarkerStore>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher, markers: Arc<dyn MarkerStore>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            markers,
        }
    }
}
