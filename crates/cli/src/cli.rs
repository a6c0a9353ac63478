// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};

// Custom help template that groups commands into sections
const HELP_TEMPLATE: &str = "{about-with-newline}
{usage-heading} {usage}

{before-help}Options:
{options}{after-help}";

const COMMANDS_HELP: &str = "\
Records:
  create      Create a record (queued for sync)
  update      Patch a record (queued for sync)
  delete      Delete a record (queued for sync)
  get         Show one record
  list        List records of a type

Sync:
  status      Show pending, synced and error counts
  sync        Drain the queue once
  watch       Drain continuously, following connectivity
  queue       Show open queue entries
  retry       Retry failed entries now, ignoring backoff
  requeue     Give a failed entry a fresh attempt budget
  discard     Drop a failed entry

Setup:
  init        Initialize the data directory and register a tenant";

const QUICKSTART_HELP: &str = "\
Get started:
  clinicsync --tenant acme init --remote https://api.example.com
  clinicsync create kennels '{\"name\": \"Run A\"}'
  clinicsync status
  clinicsync sync";

#[derive(Parser)]
#[command(name = "clinicsync", version)]
#[command(about = "Offline-first record sync for multi-tenant practice data")]
#[command(help_template = HELP_TEMPLATE)]
#[command(before_help = COMMANDS_HELP)]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Data directory (config, database, logs)
    #[arg(long, global = true, env = "CLINICSYNC_DIR", value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Tenant identifier from the [tenants] table
    #[arg(long, short, global = true, env = "CLINICSYNC_TENANT", value_name = "IDENTIFIER")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize the data directory
    #[command(after_help = "Examples:\n  \
        clinicsync init                                   Create config and database\n  \
        clinicsync -t acme init --tenant-key t_acme       Register tenant 'acme'\n  \
        clinicsync init --remote https://api.example.com  Set the server")]
    Init {
        /// Server base URL
        #[arg(long, value_name = "URL")]
        remote: Option<String>,

        /// Bearer token sent with every request
        #[arg(long)]
        token: Option<String>,

        /// Storage key for the --tenant identifier (defaults to the identifier)
        #[arg(long, value_name = "KEY")]
        tenant_key: Option<String>,
    },

    /// Create a record; prints it with its temporary id
    #[command(arg_required_else_help = true)]
    Create {
        /// Entity type, e.g. kennels
        entity: String,

        /// JSON object with the record's fields
        data: String,
    },

    /// Merge a JSON patch into a record
    #[command(arg_required_else_help = true)]
    Update {
        entity: String,
        id: String,

        /// JSON object with the fields to change
        patch: String,
    },

    /// Delete a record
    #[command(arg_required_else_help = true)]
    Delete { entity: String, id: String },

    /// Show one record
    #[command(arg_required_else_help = true)]
    Get { entity: String, id: String },

    /// List records of one entity type
    #[command(arg_required_else_help = true)]
    List { entity: String },

    /// Show pending, synced and error counts
    Status,

    /// Drain the queue once against the server
    Sync {
        /// Treat the server as unreachable without probing it
        #[arg(long)]
        offline: bool,
    },

    /// Show open queue entries in FIFO order
    Queue {
        /// Only failed entries
        #[arg(long)]
        failed: bool,
    },

    /// Reset retryable failures to pending, ignoring backoff
    Retry,

    /// Give a failed entry (terminal included) a fresh attempt budget
    #[command(arg_required_else_help = true)]
    Requeue {
        /// Queue entry id
        entry: String,
    },

    /// Drop a failed entry
    #[command(arg_required_else_help = true)]
    Discard {
        /// Queue entry id
        entry: String,
    },

    /// Keep draining in the foreground until interrupted
    Watch,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
