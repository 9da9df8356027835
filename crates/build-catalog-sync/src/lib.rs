pub mod orchestrator;
pub mod scheduler;
pub mod service;
pub mod settings;

pub use orchestrator::SyncOrchestrator;
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStatus, SyncRunner, backoff_delay};
pub use service::CatalogService;
pub use settings::SharedSettings;
