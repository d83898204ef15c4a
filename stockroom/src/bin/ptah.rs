// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ptah admin CLI: apply, roll back, and inspect the migration log.
//!
//! This is a thin shell over [`MigrationRunner`]; anything beyond argument
//! parsing and printing lives in the library.

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;

use stockroom::infrastructure::ptah::annotation::parse_sources;
use stockroom::infrastructure::ptah::diff::compare_schemas;
use stockroom::infrastructure::ptah::introspect::introspect_postgres;
use stockroom::infrastructure::ptah::model::Dialect;
use stockroom::infrastructure::ptah::render::render_diff;
use stockroom::infrastructure::ptah::runner::{MigrationRunner, PlannedMigration};
use stockroom_bootstrap::config::LogLevel;
use stockroom_bootstrap::exit_code::ExitCode;
use stockroom_bootstrap::logger;

#[derive(Parser)]
#[command(name = "ptah", about = "Stockroom schema migrator", version)]
struct Cli {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Directory holding the migration log.
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,

    /// Print what would run without executing it.
    #[arg(long)]
    dry_run: bool,

    /// Database role expanded into {{.Username}}.
    #[arg(long, default_value = "stockroom")]
    username: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations in ascending order.
    Up,
    /// Roll back applied versions above the target, descending.
    Down {
        /// Highest version to keep applied.
        target: u64,
    },
    /// Show current version, applied and pending migrations.
    Status,
    /// Validate every file name in the migrations directory.
    Check,
    /// Diff the annotated schema against the live database and print the
    /// DDL that would reconcile it.
    Diff {
        /// Directory of annotated source files.
        #[arg(long)]
        schema_dir: PathBuf,

        /// Target dialect for the rendered DDL.
        #[arg(long, default_value = "postgres")]
        dialect: String,
    },
}

fn parse_dialect(value: &str) -> Result<Dialect, ExitCode> {
    match value {
        "postgres" => Ok(Dialect::Postgres),
        "mysql" => Ok(Dialect::Mysql),
        "mariadb" => Ok(Dialect::Mariadb),
        other => {
            eprintln!("unknown dialect: {other}");
            Err(ExitCode::UsageError)
        }
    }
}

async fn read_schema_sources(dir: &PathBuf) -> Result<Vec<String>, ExitCode> {
    let mut sources = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        eprintln!("cannot read schema dir {}: {e}", dir.display());
        ExitCode::NoInput
    })?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            match tokio::fs::read_to_string(entry.path()).await {
                Ok(text) => sources.push(text),
                Err(e) => {
                    eprintln!("cannot read {}: {e}", entry.path().display());
                    return Err(ExitCode::NoInput);
                }
            }
        }
    }
    Ok(sources)
}

fn print_plan(plan: &[PlannedMigration]) {
    if plan.is_empty() {
        println!("nothing to do");
        return;
    }
    for item in plan {
        println!(
            "would apply {:010} {} ({})",
            item.version,
            item.description,
            item.file_name
        );
        for line in item.preview.lines() {
            println!("    {line}");
        }
    }
}

async fn run(cli: Cli) -> Result<(), ExitCode> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await
        .map_err(|e| {
            eprintln!("cannot connect to database: {e}");
            ExitCode::Unavailable
        })?;

    let runner =
        MigrationRunner::new(pool.clone(), &cli.dir).with_usernames(&cli.username, &cli.username);

    let outcome = match cli.command {
        Command::Up => {
            if cli.dry_run {
                runner.plan_up().await.map(|plan| print_plan(&plan))
            } else {
                runner.migrate_up().await.map(|applied| {
                    println!("applied {} migration(s): {applied:?}", applied.len());
                })
            }
        }
        Command::Down { target } => {
            if cli.dry_run {
                runner.plan_down(target).await.map(|plan| print_plan(&plan))
            } else {
                runner.migrate_down(target).await.map(|rolled_back| {
                    println!("rolled back {} migration(s): {rolled_back:?}", rolled_back.len());
                })
            }
        }
        Command::Status => runner.status().await.map(|status| {
            match status.current_version {
                Some(version) => println!("current version: {version:010}"),
                None => println!("current version: none"),
            }
            println!("applied: {} of {}", status.applied.len(), status.total);
            if status.has_pending {
                println!("pending: {:?}", status.pending);
            } else {
                println!("up to date");
            }
        }),
        Command::Check => runner.check_directory().await.map(|count| {
            println!("{count} migration file(s) validated");
        }),
        Command::Diff { schema_dir, dialect } => {
            let dialect = parse_dialect(&dialect)?;
            let sources = read_schema_sources(&schema_dir).await?;
            let result = async {
                let logical = parse_sources(sources.iter().map(String::as_str))?.expand_embedded();
                let physical = introspect_postgres(&pool).await?;
                let diff = compare_schemas(&logical, &physical);
                if diff.is_empty() {
                    println!("schema is up to date");
                } else {
                    for statement in render_diff(&diff, &logical, dialect) {
                        println!("{statement}");
                    }
                }
                Ok(())
            }
            .await;
            result
        }
    };

    outcome.map_err(|e| {
        eprintln!("{e}");
        match e.category() {
            "invalid_config" | "bad_data_structure" => ExitCode::DataError,
            "storage" => ExitCode::Unavailable,
            _ => ExitCode::Error,
        }
    })
}

#[tokio::main]
async fn main() {
    logger::init_tracing(LogLevel::Info);
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::Success.exit(),
        Err(code) => code.exit(),
    }
}
