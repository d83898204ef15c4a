// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Commodity Entity
//!
//! The inventory item itself. Commodities live inside an area and may have
//! attached images, manuals, and invoices (weak references to files).
//!
//! Validation is context-aware: creating a commodity requires the system
//! main currency to be configured, because converted prices are denominated
//! in it. Prices use exact decimal arithmetic - never floats.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationContext};
use crate::value_objects::EntityId;
use crate::DomainError;

/// Broad category of a commodity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityType {
    WhiteGoods,
    Electronics,
    Equipment,
    Furniture,
    Clothes,
    Other,
}

/// Where the commodity is in its ownership lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityStatus {
    InUse,
    Sold,
    Lost,
    Disposed,
    WrittenOff,
}

/// An inventory item owned by one user inside one area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub area_id: EntityId,
    pub name: String,
    pub short_name: String,
    #[serde(rename = "type")]
    pub commodity_type: CommodityType,
    pub status: CommodityStatus,
    pub count: u32,
    pub original_price: Decimal,
    pub original_price_currency: String,
    pub converted_original_price: Decimal,
    pub current_price: Decimal,
    pub serial_number: Option<String>,
    pub extra_serial_numbers: Vec<String>,
    pub part_numbers: Vec<String>,
    pub tags: Vec<String>,
    pub urls: Vec<String>,
    pub comments: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub registered_date: Option<NaiveDate>,
    pub last_modified_date: Option<NaiveDate>,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commodity {
    pub fn new(
        tenant_id: EntityId,
        user_id: EntityId,
        area_id: EntityId,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            area_id,
            short_name: name.clone(),
            name,
            commodity_type: CommodityType::Other,
            status: CommodityStatus::InUse,
            count: 1,
            original_price: Decimal::ZERO,
            original_price_currency: String::new(),
            converted_original_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            serial_number: None,
            extra_serial_numbers: Vec::new(),
            part_numbers: Vec::new(),
            tags: Vec::new(),
            urls: Vec::new(),
            comments: None,
            purchase_date: None,
            registered_date: None,
            last_modified_date: None,
            draft: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the commodity against the system context.
    ///
    /// The main currency must be configured before any commodity can be
    /// created; converted and current prices are denominated in it.
    pub fn validate(&self, ctx: &ValidationContext) -> Result<(), DomainError> {
        validation::require(&self.name, "Name")?;
        validation::require(&self.short_name, "ShortName")?;
        validation::require(self.area_id.as_str(), "AreaID")?;
        let main_currency = ctx.require_main_currency()?;

        if !self.original_price_currency.is_empty() {
            validation::validate_currency(&self.original_price_currency)?;
        }
        if self.original_price.is_sign_negative() {
            return Err(DomainError::validation("OriginalPrice", "must not be negative"));
        }
        if self.converted_original_price.is_sign_negative() {
            return Err(DomainError::validation(
                "ConvertedOriginalPrice",
                "must not be negative",
            ));
        }
        if self.current_price.is_sign_negative() {
            return Err(DomainError::validation("CurrentPrice", "must not be negative"));
        }
        // A converted price only makes sense when the original is priced in
        // a currency other than the main one.
        if !self.converted_original_price.is_zero()
            && (self.original_price_currency.is_empty() || self.original_price_currency == main_currency)
        {
            return Err(DomainError::validation(
                "ConvertedOriginalPrice",
                "set only when the original currency differs from the main currency",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn commodity() -> Commodity {
        Commodity::new(EntityId::new(), EntityId::new(), EntityId::new(), "Drill")
    }

    fn ctx() -> ValidationContext {
        ValidationContext::with_main_currency("USD")
    }

    #[test]
    fn valid_commodity_passes() {
        assert!(commodity().validate(&ctx()).is_ok());
    }

    #[test]
    fn missing_main_currency_blocks_create() {
        let err = commodity().validate(&ValidationContext::default()).unwrap_err();
        assert!(matches!(err, DomainError::MainCurrencyNotSet));
    }

    #[test]
    fn negative_price_rejected() {
        let mut c = commodity();
        c.current_price = Decimal::from(-5);
        assert!(c.validate(&ctx()).is_err());
    }

    #[test]
    fn converted_price_requires_foreign_currency() {
        let mut c = commodity();
        c.converted_original_price = Decimal::from(10);
        c.original_price_currency = "USD".into();
        assert!(c.validate(&ctx()).is_err());

        c.original_price_currency = "EUR".into();
        assert!(c.validate(&ctx()).is_ok());
    }
}
