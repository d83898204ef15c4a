// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Migration File Names and Pairs
//!
//! Migration files follow `NNNNNNNNNN_<snake_desc>.(up|down).sql` with a
//! ten-digit zero-padded version (typically a unix timestamp). Sorting file
//! names alphabetically therefore sorts them by version. Parsing is strict:
//! anything that deviates from the pattern is rejected rather than guessed
//! at.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use stockroom_domain::{DomainError, DomainResult};

/// Direction of one migration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// A parsed migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    /// Human-readable name: snake description title-cased with spaces.
    pub name: String,
    pub direction: Direction,
    pub extension: String,
}

/// The up and down halves of one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPair {
    pub version: u64,
    pub description: String,
    pub up: Option<String>,
    pub down: Option<String>,
}

fn file_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{10})_([a-z0-9_]+)\.(up|down)\.sql$").expect("static migration pattern")
    })
}

/// Title-cases a snake description: `create_users_table` -> `Create Users Table`.
fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds a migration file name for a version, description, and direction.
pub fn generate_migration_file_name(version: u64, description: &str, direction: Direction) -> String {
    let snake = description
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect::<String>();
    format!("{version:010}_{snake}.{}.sql", direction.as_str())
}

/// Parses a migration file name, failing on any deviation from the format.
pub fn parse_migration_file_name(file_name: &str) -> DomainResult<MigrationFile> {
    let captures = file_name_regex().captures(file_name).ok_or_else(|| {
        DomainError::bad_data(format!("not a migration file name: {file_name}"))
    })?;
    let version: u64 = captures[1]
        .parse()
        .map_err(|e| DomainError::bad_data(format!("bad version in {file_name}: {e}")))?;
    let direction = match &captures[3] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Ok(MigrationFile {
        version,
        name: title_case(&captures[2]),
        direction,
        extension: ".sql".to_string(),
    })
}

/// Groups parsed file names into version pairs.
///
/// Every name must parse; a stray file in the migrations directory is an
/// error, not something to skip over silently.
pub fn collect_migration_pairs<'a>(
    file_names: impl IntoIterator<Item = &'a str>,
) -> DomainResult<BTreeMap<u64, MigrationPair>> {
    let mut pairs: BTreeMap<u64, MigrationPair> = BTreeMap::new();
    for file_name in file_names {
        let parsed = parse_migration_file_name(file_name)?;
        let pair = pairs.entry(parsed.version).or_insert_with(|| MigrationPair {
            version: parsed.version,
            description: parsed.name.clone(),
            ..Default::default()
        });
        match parsed.direction {
            Direction::Up => pair.up = Some(file_name.to_string()),
            Direction::Down => pair.down = Some(file_name.to_string()),
        }
    }
    Ok(pairs)
}

/// Returns the sorted versions missing either half of their pair.
pub fn validate_migration_pairs(pairs: &BTreeMap<u64, MigrationPair>) -> Vec<u64> {
    pairs
        .values()
        .filter(|pair| pair.up.is_none() || pair.down.is_none())
        .map(|pair| pair.version)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_canonical_name() {
        let parsed = parse_migration_file_name("0000000001_create_users_table.up.sql").unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.name, "Create Users Table");
        assert_eq!(parsed.direction, Direction::Up);
        assert_eq!(parsed.extension, ".sql");
    }

    #[test]
    fn short_version_rejected() {
        assert!(parse_migration_file_name("1_create.up.sql").is_err());
    }

    #[test]
    fn deviations_rejected() {
        for bad in [
            "0000000001_Create.up.sql",
            "0000000001_create.sideways.sql",
            "0000000001_create.up.txt",
            "00000000012_create.up.sql",
            "0000000001-create.up.sql",
        ] {
            assert!(parse_migration_file_name(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn pairs_missing_a_half_reported_sorted() {
        let pairs = collect_migration_pairs([
            "0000000001_one.up.sql",
            "0000000001_one.down.sql",
            "0000000002_two.up.sql",
        ])
        .unwrap();
        assert_eq!(validate_migration_pairs(&pairs), vec![2]);
    }

    #[test]
    fn generated_names_sort_by_version() {
        let a = generate_migration_file_name(1, "first", Direction::Up);
        let b = generate_migration_file_name(1700000000, "second", Direction::Up);
        assert!(a < b);
    }

    proptest! {
        // Generate/parse idempotence over well-formed descriptions.
        #[test]
        fn generate_then_parse_round_trips(
            version in 0u64..=9_999_999_999,
            description in "[a-z][a-z0-9_]{0,30}",
        ) {
            for direction in [Direction::Up, Direction::Down] {
                let file_name = generate_migration_file_name(version, &description, direction);
                let parsed = parse_migration_file_name(&file_name).unwrap();
                prop_assert_eq!(parsed.version, version);
                prop_assert_eq!(parsed.direction, direction);
                prop_assert_eq!(parsed.extension, ".sql");
                prop_assert_eq!(parsed.name, title_case(&description));
            }
        }
    }
}
