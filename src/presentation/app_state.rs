// Application state for HTTP handlers
use crate::application::streaming_service::StreamingDashboardService;
use crate::application::summary_service::SummaryService;

#[derive(Clone)]
pub struct AppState {
    pub streaming_service: StreamingDashboardService,
    pub summary_service: SummaryService,
}
