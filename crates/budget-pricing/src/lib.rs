#![deny(warnings)]

//! Sale-price derivation for budget options.
//!
//! This module provides validated utilities for:
//! - Sale price per unit from supplier cost, margin and price adjustment
//! - Option totals (exact or range), rounded up to whole dollars once
//! - Group, tier, area and project rollups as [`PriceRange`]s

use budget_core::{
    decimal_from_f64, Area, Cost, Group, LineItem, PriceOption, PriceRange, Project, SalePrice,
    Tier, ValidationError,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::trace;

/// Errors produced by pricing helpers.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// Margin must lie in [0, 1); 1 would divide by zero.
    #[error("invalid margin {0}: must be within [0, 1)")]
    InvalidMargin(Decimal),
    /// Cost and multiplier must be non-negative.
    #[error("invalid cost or multiplier value")]
    InvalidPrice,
    #[error("non-finite numeric input")]
    NonFinite,
    /// Result does not fit in whole dollars.
    #[error("price overflow")]
    Overflow,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Per-unit supplier cost as seen by the calculator.
///
/// Missing cost data resolves to `Exact(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitCost {
    Exact(Decimal),
    Range { low: Decimal, high: Decimal },
}

impl UnitCost {
    pub fn is_zero(&self) -> bool {
        matches!(self, UnitCost::Exact(c) if c.is_zero())
    }
}

/// Resolve the active cost representation of an option.
///
/// A range only counts when both bounds are non-zero; otherwise the option
/// has no usable cost and yields `0`.
pub fn per_unit_cost(option: &PriceOption) -> UnitCost {
    match option.cost {
        Cost::Exact { per_unit } => UnitCost::Exact(per_unit),
        Cost::Range { low, high } if !low.is_zero() && !high.is_zero() => {
            UnitCost::Range { low, high }
        }
        _ => UnitCost::Exact(Decimal::ZERO),
    }
}

/// Sale price for one unit: `cost / (1 - margin) * multiplier`, unrounded.
///
/// Fails fast on a margin outside `[0, 1)`; never returns an infinite or
/// negative price.
///
/// Example:
/// let p = sale_price_per_unit(Decimal::new(100, 0), Decimal::new(20, 2), Decimal::ONE).unwrap();
/// assert_eq!(p, Decimal::new(125, 0));
pub fn sale_price_per_unit(
    cost_per_unit: Decimal,
    margin_decimal: Decimal,
    price_adjustment_multiplier: Decimal,
) -> Result<Decimal, PricingError> {
    sale_price_for_quantity(
        cost_per_unit,
        margin_decimal,
        price_adjustment_multiplier,
        Decimal::ONE,
    )
}

/// Floating-point entry point for [`sale_price_per_unit`]; NaN and infinities are rejected.
pub fn sale_price_per_unit_f64(
    cost_per_unit: f64,
    margin_decimal: f64,
    price_adjustment_multiplier: f64,
) -> Result<Decimal, PricingError> {
    let to_dec = |v: f64| decimal_from_f64(v).map_err(|_| PricingError::NonFinite);
    sale_price_per_unit(
        to_dec(cost_per_unit)?,
        to_dec(margin_decimal)?,
        to_dec(price_adjustment_multiplier)?,
    )
}

// Same value as `sale_price_per_unit * quantity`; dividing last keeps
// terminating results exact.
fn sale_price_for_quantity(
    cost_per_unit: Decimal,
    margin_decimal: Decimal,
    multiplier: Decimal,
    quantity: Decimal,
) -> Result<Decimal, PricingError> {
    if margin_decimal < Decimal::ZERO || margin_decimal >= Decimal::ONE {
        return Err(PricingError::InvalidMargin(margin_decimal));
    }
    if cost_per_unit < Decimal::ZERO || multiplier < Decimal::ZERO {
        return Err(PricingError::InvalidPrice);
    }
    if quantity < Decimal::ZERO {
        return Err(ValidationError::NegativeQuantity(quantity).into());
    }
    let denom = Decimal::ONE - margin_decimal;
    cost_per_unit
        .checked_mul(multiplier)
        .and_then(|v| v.checked_mul(quantity))
        .and_then(|v| v.checked_div(denom))
        .ok_or(PricingError::Overflow)
}

/// Round a non-negative amount up to whole dollars.
pub fn ceil_dollars(amount: Decimal) -> Result<u64, PricingError> {
    amount.ceil().to_u64().ok_or(PricingError::Overflow)
}

fn add_prices(total: PriceRange, price: PriceRange) -> Result<PriceRange, PricingError> {
    total.checked_add(price).ok_or(PricingError::Overflow)
}

fn priced(
    option: &PriceOption,
    item: &LineItem,
    quantity: Decimal,
) -> Result<SalePrice, PricingError> {
    let cost = per_unit_cost(option);
    if cost.is_zero() {
        return Ok(SalePrice::ZERO);
    }
    let margin = item.margin();
    let multiplier = option.multiplier();
    let price = |c: Decimal| -> Result<u64, PricingError> {
        ceil_dollars(sale_price_for_quantity(c, margin, multiplier, quantity)?)
    };
    match cost {
        UnitCost::Exact(c) => Ok(SalePrice::Exact(price(c)?)),
        UnitCost::Range { low, high } => {
            let range = PriceRange::new(price(low)?, price(high)?)?;
            Ok(SalePrice::Range(range))
        }
    }
}

/// Total sale price of `option` for the quantity of `item`, rounded up to whole dollars.
///
/// Quantity 0 and missing cost both yield 0.
pub fn option_total_sale_price(
    option: &PriceOption,
    item: &LineItem,
) -> Result<SalePrice, PricingError> {
    priced(option, item, item.quantity())
}

/// Per-unit sale price of `option`, rounded up to whole dollars.
///
/// Used for "per unit" display when the quantity is 0.
pub fn option_per_unit_sale_price(
    option: &PriceOption,
    item: &LineItem,
) -> Result<SalePrice, PricingError> {
    priced(option, item, Decimal::ONE)
}

/// Sum of the selected option totals across the group's line items.
///
/// Items without a selection contribute nothing.
pub fn group_total_sale_price(group: &Group) -> Result<PriceRange, PricingError> {
    let mut total = PriceRange::ZERO;
    for item in &group.line_items {
        if let Some(option) = item.selected_option()? {
            total = add_prices(total, option_total_sale_price(option, item)?.into_range())?;
        }
    }
    trace!(
        group = %group.id,
        low = total.low_price_in_dollars,
        high = total.high_price_in_dollars,
        "group total"
    );
    Ok(total)
}

/// What the given groups would cost if every line item took its `tier` option.
///
/// Selection is ignored. Items without an option at `tier` contribute nothing.
pub fn tier_total_sale_price(groups: &[Group], tier: Tier) -> Result<PriceRange, PricingError> {
    let mut total = PriceRange::ZERO;
    for item in groups.iter().flat_map(|g| &g.line_items) {
        if let Some(option) = item.option_for_tier(tier) {
            total = add_prices(total, option_total_sale_price(option, item)?.into_range())?;
        }
    }
    Ok(total)
}

/// Tier totals for all three tiers, in level order.
pub fn tier_breakdown(groups: &[Group]) -> Result<[(Tier, PriceRange); 3], PricingError> {
    let [a, b, c] = Tier::ALL;
    Ok([
        (a, tier_total_sale_price(groups, a)?),
        (b, tier_total_sale_price(groups, b)?),
        (c, tier_total_sale_price(groups, c)?),
    ])
}

/// Tier totals across every group of an area.
pub fn area_tier_totals(area: &Area) -> Result<[(Tier, PriceRange); 3], PricingError> {
    tier_breakdown(&area.groups)
}

/// Sum of the group totals of an area.
pub fn area_total_sale_price(area: &Area) -> Result<PriceRange, PricingError> {
    area.groups.iter().try_fold(PriceRange::ZERO, |acc, group| {
        add_prices(acc, group_total_sale_price(group)?)
    })
}

/// Sum of the area totals of a project.
pub fn project_total_sale_price(project: &Project) -> Result<PriceRange, PricingError> {
    project.areas.iter().try_fold(PriceRange::ZERO, |acc, area| {
        add_prices(acc, area_total_sale_price(area)?)
    })
}
