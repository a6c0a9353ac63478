// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::{print_json, Context};
use crate::error::Result;

/// Prints counters and queue stats for the selected tenant.
pub fn status(ctx: &Context) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    print_json(&session.refresh()?)
}

pub fn show(ctx: &Context, failed_only: bool) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    let entries = if failed_only {
        session.failed_entries()?
    } else {
        session.open_entries()?
    };
    print_json(&entries)
}

pub fn requeue(ctx: &Context, entry_id: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    print_json(&session.requeue(entry_id)?)
}

pub fn discard(ctx: &Context, entry_id: &str) -> Result<()> {
    let (session, _) = ctx.open_session()?;
    print_json(&session.discard(entry_id)?)
}
