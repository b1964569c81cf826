mod executor;

pub use executor::{parse_targets_from_file, BulkResolver, BulkResult, ProgressCallback};
