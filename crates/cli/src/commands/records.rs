// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Record commands: thin wrappers over the entity façade.

use clinicsync_core::Error as CoreError;

use super::{parse_entity_type, parse_json_arg, print_json, Context};
use crate::error::Result;

pub fn create(ctx: &Context, entity: &str, data: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let record = session
        .collection(parse_entity_type(entity)?)
        .create(parse_json_arg(data)?)?;
    print_json(&record)
}

pub fn update(ctx: &Context, entity: &str, id: &str, patch: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let record = session
        .collection(parse_entity_type(entity)?)
        .update(id, parse_json_arg(patch)?)?;
    print_json(&record)
}

pub fn delete(ctx: &Context, entity: &str, id: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let outcome = session.collection(parse_entity_type(entity)?).delete(id)?;
    print_json(&outcome)
}

pub fn get(ctx: &Context, entity: &str, id: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let entity_type = parse_entity_type(entity)?;
    let record = session
        .collection(entity_type.clone())
        .get(id)?
        .ok_or_else(|| CoreError::not_found(entity_type.as_str(), id))?;
    print_json(&record)
}

pub fn list(ctx: &Context, entity: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let records = session.collection(parse_entity_type(entity)?).list()?;
    print_json(&records)
}
