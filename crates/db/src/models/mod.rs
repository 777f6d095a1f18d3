//! Row types for the incident lifecycle tables and their conversion into
//! the domain aggregates.

pub mod incident;
pub mod maintenance;
pub mod merge_suggestion;

use std::str::FromStr;

use fieldwatch_core::error::CoreError;

/// Parse a TEXT enum column, treating an unknown value as a corrupt row.
pub(crate) fn parse_column<T>(table: &str, column: &str, raw: &str) -> Result<T, CoreError>
where
    T: FromStr<Err = CoreError>,
{
    raw.parse().map_err(|_| {
        CoreError::Internal(format!("{table}.{column} holds unknown value '{raw}'"))
    })
}
