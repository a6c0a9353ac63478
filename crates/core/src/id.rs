// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier generation for records and queue entries.

use uuid::Uuid;

/// Prefix marking a record id as client-generated and not yet known to the server.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Generate a temporary record id: `temp_` followed by 32 hex chars.
pub fn generate_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple())
}

/// Returns true if the id was generated by [`generate_temp_id`].
pub fn is_temp_id(id: &str) -> bool {
    id.strip_prefix(TEMP_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
}

/// Generate a queue entry id.
///
/// UUIDv7 embeds a millisecond timestamp ahead of the random bits, so ids
/// created later compare greater as strings.
pub fn generate_entry_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
