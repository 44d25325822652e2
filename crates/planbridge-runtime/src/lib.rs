//! Result-publishing pipeline: run lifecycle, point resolution, publishing and
//! attachment upload against a remote test-management API.

use std::sync::{Mutex, MutexGuard};

/// `tracing::info!` that only fires when the reporter's `logging` option is on.
macro_rules! chatter {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            tracing::info!($($arg)+);
        }
    };
}

pub mod api;
pub mod api_types;
pub mod attachments;
pub mod config;
pub mod http_client;
pub mod in_flight;
pub mod point_resolver;
pub mod publisher;
pub mod reporter;
pub mod retry;
pub mod run_lifecycle;
pub mod summary;

#[cfg(test)]
mod test_support;

pub use api::{ApiError, TestPlanApi};
pub use config::{
    AuthScheme, ConfigError, PointMapper, PublishMode, ReporterConfig, ReporterOptions,
    RUN_ID_ENV,
};
pub use http_client::{ApiClientConfig, HttpTestPlanClient};
pub use reporter::{PlanReporter, ReporterHooks};
pub use run_lifecycle::{RunPhase, RunSetupFailure};
pub use summary::PublishSummary;

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
