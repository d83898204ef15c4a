// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Field Validation
//!
//! Shared field validators used by entity `validate` methods, plus the
//! context object for validations that depend on system state (the main
//! currency from Settings).
//!
//! Validators report failures as [`DomainError::FieldRequired`] or
//! [`DomainError::Validation`] carrying the offending field name, so the
//! handler layer can map them onto per-attribute API errors without parsing
//! messages.

use regex::Regex;
use std::sync::OnceLock;

use crate::DomainError;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"))
}

fn slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("static slug pattern"))
}

fn currency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("static currency pattern"))
}

/// System state needed by context-aware validations.
///
/// Commodity creation requires the main currency to be configured; the
/// entity service loads it from Settings and threads it through here.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub main_currency: Option<String>,
}

impl ValidationContext {
    pub fn with_main_currency(currency: impl Into<String>) -> Self {
        Self {
            main_currency: Some(currency.into()),
        }
    }

    /// Returns the main currency or fails with `MainCurrencyNotSet`.
    pub fn require_main_currency(&self) -> Result<&str, DomainError> {
        self.main_currency
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(DomainError::MainCurrencyNotSet)
    }
}

/// Fails with `FieldRequired` when `value` is empty or whitespace.
pub fn require(value: &str, field_name: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::field_required(field_name));
    }
    Ok(())
}

/// Validates an email address shape.
pub fn validate_email(value: &str) -> Result<(), DomainError> {
    require(value, "Email")?;
    if !email_regex().is_match(value) {
        return Err(DomainError::validation("Email", "not a valid email address"));
    }
    Ok(())
}

/// Validates the password policy: at least 8 characters with one uppercase
/// letter, one lowercase letter, and one digit.
pub fn validate_password(value: &str) -> Result<(), DomainError> {
    require(value, "Password")?;
    if value.chars().count() < 8 {
        return Err(DomainError::validation("Password", "must be at least 8 characters"));
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(DomainError::validation("Password", "must contain an uppercase letter"));
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(DomainError::validation("Password", "must contain a lowercase letter"));
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(DomainError::validation("Password", "must contain a digit"));
    }
    Ok(())
}

/// Validates a URL-safe tenant slug.
pub fn validate_slug(value: &str) -> Result<(), DomainError> {
    require(value, "Slug")?;
    if !slug_regex().is_match(value) {
        return Err(DomainError::validation(
            "Slug",
            "must be lowercase letters, digits, and single hyphens",
        ));
    }
    Ok(())
}

/// Validates an ISO-4217 style currency code (three uppercase letters).
pub fn validate_currency(value: &str) -> Result<(), DomainError> {
    require(value, "Currency")?;
    if !currency_regex().is_match(value) {
        return Err(DomainError::validation("Currency", "must be a three-letter code"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_blank() {
        assert!(matches!(
            require("  ", "Name"),
            Err(DomainError::FieldRequired { field_name }) if field_name == "Name"
        ));
        assert!(require("x", "Name").is_ok());
    }

    #[test]
    fn email_shapes() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("Passw0rd").is_ok());
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllower1").is_err());
        assert!(validate_password("ALLUPPER1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
    }

    #[test]
    fn slug_shapes() {
        assert!(validate_slug("acme-home").is_ok());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("a--b").is_err());
    }

    #[test]
    fn currency_codes() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("USDD").is_err());
    }

    #[test]
    fn context_requires_main_currency() {
        assert!(matches!(
            ValidationContext::default().require_main_currency(),
            Err(DomainError::MainCurrencyNotSet)
        ));
        let ctx = ValidationContext::with_main_currency("USD");
        assert_eq!(ctx.require_main_currency().unwrap(), "USD");
    }
}
