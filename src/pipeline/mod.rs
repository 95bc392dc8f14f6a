pub mod events;
pub mod orchestrator;
pub mod progress;
pub mod state;

pub use events::RunEvent;
pub use orchestrator::{panic_message, resolve_custom_pages, RunOrchestrator};
pub use progress::RunProgress;
pub use state::{stop_run, ActiveRuns, RunHandle, RunSnapshot, RunSummary, STOPPED_BY_USER};
