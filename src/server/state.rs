use std::sync::Arc;

use crate::database::Database;
use crate::processing::UploadProcessor;
use crate::settings::Settings;

// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub processor: Arc<UploadProcessor>,
    pub settings: Arc<Settings>,
}
