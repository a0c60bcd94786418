pub mod coordinator;
pub mod results;
pub mod tasks;

pub use coordinator::{PassSummary, ProcessingError, ReadClassifier};
pub use results::ResultsPublisher;
pub use tasks::{CorrelationTask, PendingTaskList, ProgressReport};
