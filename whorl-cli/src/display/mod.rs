mod progress;
mod spinner;

pub use progress::{BulkProgress, ProgressWriterFactory};
pub use spinner::Spinner;
