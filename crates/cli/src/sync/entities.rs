// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Practice-management entity types with typed façades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::facade::Entity;

/// A boarding kennel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kennel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for Kennel {
    const ENTITY_TYPE: &'static str = "kennels";
}

/// Reusable SOAP note scaffold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default)]
    pub subjective: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub plan: String,
}

impl Entity for SoapTemplate {
    const ENTITY_TYPE: &'static str = "soapTemplates";
}

/// A patient's stay in a kennel.
///
/// `kennel_id` may hold a temporary id; it is rewritten when the kennel's
/// create is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardingStay {
    pub kennel_id: String,
    pub patient_id: String,
    pub check_in: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
}

impl Entity for BoardingStay {
    const ENTITY_TYPE: &'static str = "boardingStays";
}
