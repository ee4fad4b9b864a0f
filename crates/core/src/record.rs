//! Batch records and the CSV acceptance rules.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Header of the column holding the record name.
pub const NAME_COLUMN: &str = "name";
/// Header of the column holding the record email.
pub const EMAIL_COLUMN: &str = "email";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// One accepted row of a batch. Immutable once part of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub email: String,
}

impl Record {
    /// Build a record if the row passes the acceptance rules.
    pub fn accept(name: &str, email: &str) -> Option<Self> {
        if name.is_empty() || !is_valid_email(email) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// `local@domain.tld` with no whitespace and a single `@`. Case and spacing are not normalized.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Parse a headed CSV table and keep the rows that form valid records, in file order.
///
/// Rejected rows are dropped without a trace. Columns other than `name` and `email`
/// are ignored. Fails when the content is not a CSV table with a header row, or when
/// no row survives.
pub fn validate_csv(content: &[u8]) -> ServiceResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content);

    let headers = reader.headers().map_err(parse_error)?.clone();
    if headers.iter().all(str::is_empty) {
        return Err(parse_error("missing header row"));
    }

    let name_idx = headers.iter().position(|h| h == NAME_COLUMN);
    let email_idx = headers.iter().position(|h| h == EMAIL_COLUMN);

    let mut accepted = Vec::new();
    for row in reader.records() {
        let row = row.map_err(parse_error)?;
        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("");
        if let Some(record) = Record::accept(field(name_idx), field(email_idx)) {
            accepted.push(record);
        }
    }

    if accepted.is_empty() {
        return Err(ServiceError::validation("No valid records found in CSV"));
    }

    tracing::debug!(accepted = accepted.len(), "csv validated");
    Ok(accepted)
}

fn parse_error(e: impl core::fmt::Display) -> ServiceError {
    ServiceError::validation(format!("Error parsing CSV file: {e}"))
}
