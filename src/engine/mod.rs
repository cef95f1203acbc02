pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod validation;
