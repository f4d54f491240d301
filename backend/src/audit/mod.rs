mod sqlite;

pub use sqlite::{BatchCallSummary, CallLogError, CallLogger};
