//! Shared application state injected into every handler.

use std::sync::Arc;

use lexai_core::admission::AdmissionService;
use lexai_ws::WsHub;

#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionService>,
    pub hub: WsHub,
}
