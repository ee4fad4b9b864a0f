//! Infrastructure layer: job persistence, record processing and supervision.

pub mod jobs;
