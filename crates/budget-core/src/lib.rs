#![deny(warnings)]

//! Core domain models and invariants for project budgets.
//!
//! A project is split into areas, each area into groups of line items, and
//! each line item offers up to three priced options (one per [`Tier`]). The
//! types here are plain serializable records; pricing and ordering live in
//! `budget-pricing` and `budget-order`.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_type!(
    /// Identifier of a [`Project`].
    ProjectId
);
id_type!(
    /// Identifier of an [`Area`].
    AreaId
);
id_type!(
    /// Identifier of a [`Category`].
    CategoryId
);
id_type!(
    /// Identifier of a [`Group`].
    GroupId
);
id_type!(
    /// Identifier of a [`LineItem`].
    LineItemId
);
id_type!(
    /// Identifier of a [`PriceOption`].
    OptionId
);

/// Fixed pricing level offered by a line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    Premier = 1,
    Designer = 2,
    Luxury = 3,
}

impl Tier {
    /// All tiers in ascending level order.
    pub const ALL: [Tier; 3] = [Tier::Premier, Tier::Designer, Tier::Luxury];

    /// Numeric tier level (1, 2 or 3).
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Premier => "Premier",
            Tier::Designer => "Designer",
            Tier::Luxury => "Luxury",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = ValidationError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Tier::Premier),
            2 => Ok(Tier::Designer),
            3 => Ok(Tier::Luxury),
            other => Err(ValidationError::InvalidTier(other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.level()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supplier cost per unit of an option.
///
/// Exactly one representation is active at a time; `Unset` means no cost
/// data has been entered yet and prices to zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cost {
    /// Single known cost per unit.
    Exact { per_unit: Decimal },
    /// Cost per unit is only known within `[low, high]`.
    Range { low: Decimal, high: Decimal },
    #[default]
    Unset,
}

impl Cost {
    /// Builds a cost from the three nullable columns used by stored records.
    ///
    /// An exact value wins. Otherwise both bounds must be present and
    /// non-zero for a range; anything else is `Unset`.
    pub fn from_fields(
        exact: Option<Decimal>,
        low: Option<Decimal>,
        high: Option<Decimal>,
    ) -> Self {
        if let Some(per_unit) = exact {
            return Cost::Exact { per_unit };
        }
        match (low, high) {
            (Some(low), Some(high)) if !low.is_zero() && !high.is_zero() => {
                Cost::Range { low, high }
            }
            _ => Cost::Unset,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Cost::Unset)
    }
}

/// Validate a cost: non-negative, and `low <= high` for ranges.
pub fn validate_cost(cost: &Cost) -> Result<(), ValidationError> {
    match *cost {
        Cost::Exact { per_unit } if per_unit < Decimal::ZERO => {
            Err(ValidationError::NegativeCost)
        }
        Cost::Range { low, high } => {
            if low < Decimal::ZERO || high < Decimal::ZERO {
                return Err(ValidationError::NegativeCost);
            }
            if low > high {
                return Err(ValidationError::InvertedRange { low, high });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Whole-dollar sale price range. `low_price_in_dollars <= high_price_in_dollars`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    pub low_price_in_dollars: u64,
    pub high_price_in_dollars: u64,
}

impl PriceRange {
    pub const ZERO: PriceRange = PriceRange {
        low_price_in_dollars: 0,
        high_price_in_dollars: 0,
    };

    pub fn new(low: u64, high: u64) -> Result<Self, ValidationError> {
        if low > high {
            return Err(ValidationError::InvertedRange {
                low: Decimal::from(low),
                high: Decimal::from(high),
            });
        }
        Ok(Self {
            low_price_in_dollars: low,
            high_price_in_dollars: high,
        })
    }

    /// Degenerate range where low equals high.
    pub fn single(value: u64) -> Self {
        Self {
            low_price_in_dollars: value,
            high_price_in_dollars: value,
        }
    }

    /// True when the range collapses to a single displayed value.
    pub fn is_single(&self) -> bool {
        self.low_price_in_dollars == self.high_price_in_dollars
    }

    /// Bound-wise sum, `None` when either bound overflows.
    #[must_use]
    pub fn checked_add(self, rhs: PriceRange) -> Option<PriceRange> {
        Some(PriceRange {
            low_price_in_dollars: self
                .low_price_in_dollars
                .checked_add(rhs.low_price_in_dollars)?,
            high_price_in_dollars: self
                .high_price_in_dollars
                .checked_add(rhs.high_price_in_dollars)?,
        })
    }
}


/// A sale price in whole dollars: exact when cost is exact, a range otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SalePrice {
    Exact(u64),
    Range(PriceRange),
}

impl SalePrice {
    pub const ZERO: SalePrice = SalePrice::Exact(0);

    /// Exact prices become a degenerate range so they can be summed with ranges.
    pub fn into_range(self) -> PriceRange {
        match self {
            SalePrice::Exact(v) => PriceRange::single(v),
            SalePrice::Range(r) => r,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.into_range() == PriceRange::ZERO
    }
}

/// One priced choice of a line item, tied to a tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOption {
    pub id: OptionId,
    pub tier: Tier,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost: Cost,
    /// Scalar applied after margin; absent means 1.
    #[serde(default)]
    pub price_adjustment_multiplier: Option<Decimal>,
}

impl PriceOption {
    /// Effective price adjustment multiplier (1 when absent).
    pub fn multiplier(&self) -> Decimal {
        self.price_adjustment_multiplier.unwrap_or(Decimal::ONE)
    }
}

/// A budget line inside a group, offering per-tier options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub group_id: GroupId,
    pub name: String,
    /// Units required; may be fractional. Absent counts as 0.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Fraction of the sale price that is margin, in `[0, 1)`. Absent counts as 0.
    #[serde(default)]
    pub margin_decimal: Option<Decimal>,
    /// Zero-based position among the line items of the same group.
    pub index_in_group: u32,
    /// The single currently selected option, if any.
    #[serde(default)]
    pub selected_option_id: Option<OptionId>,
    #[serde(default)]
    pub options: Vec<PriceOption>,
}

impl LineItem {
    pub fn quantity(&self) -> Decimal {
        self.quantity.unwrap_or(Decimal::ZERO)
    }

    pub fn margin(&self) -> Decimal {
        self.margin_decimal.unwrap_or(Decimal::ZERO)
    }

    /// Quantity rounded to two decimals for display.
    pub fn display_quantity(&self) -> Decimal {
        round_quantity(self.quantity())
    }

    pub fn option(&self, id: &OptionId) -> Option<&PriceOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    /// First option offered at `tier`, if any.
    pub fn option_for_tier(&self, tier: Tier) -> Option<&PriceOption> {
        self.options.iter().find(|o| o.tier == tier)
    }

    /// Currently selected option. A dangling selection is an error.
    pub fn selected_option(&self) -> Result<Option<&PriceOption>, ValidationError> {
        match &self.selected_option_id {
            None => Ok(None),
            Some(id) => self
                .option(id)
                .map(Some)
                .ok_or_else(|| ValidationError::UnknownOption(id.0.clone())),
        }
    }

    /// Select `id`, replacing any previous selection.
    pub fn select_option(&mut self, id: &OptionId) -> Result<(), ValidationError> {
        if self.option(id).is_none() {
            return Err(ValidationError::UnknownOption(id.0.clone()));
        }
        self.selected_option_id = Some(id.clone());
        Ok(())
    }

    /// Toggle-off: no option selected.
    pub fn clear_selection(&mut self) {
        self.selected_option_id = None;
    }
}

/// Named grouping of groups within an area (e.g. "Kitchen cabinetry").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// A group of line items, ordered within its category inside an area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub area_id: AreaId,
    pub category_id: CategoryId,
    pub name: String,
    /// Zero-based position among groups of the same category in the same area.
    pub index_in_category: u32,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// A physical or logical area of the project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Top-level budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Costs must be non-negative.
    #[error("negative cost is invalid")]
    NegativeCost,
    /// Range bounds out of order.
    #[error("range low {low} exceeds high {high}")]
    InvertedRange { low: Decimal, high: Decimal },
    #[error("negative quantity {0} is invalid")]
    NegativeQuantity(Decimal),
    /// Margin must be within [0, 1).
    #[error("margin {0} is outside [0, 1)")]
    InvalidMargin(Decimal),
    #[error("negative price adjustment multiplier {0} is invalid")]
    NegativeMultiplier(Decimal),
    /// Numeric input was NaN or infinite.
    #[error("non-finite numeric value encountered")]
    NonFinite,
    #[error("tier level {0} is not one of 1, 2, 3")]
    InvalidTier(u8),
    /// A line item offers more than one option at the same tier.
    #[error("line item {line_item} has more than one {tier} option")]
    DuplicateTier { line_item: String, tier: Tier },
    #[error("option not found: {0}")]
    UnknownOption(String),
    #[error("category not found: {0}")]
    UnknownCategory(String),
    /// A child record points at a different parent than the one holding it.
    #[error("record {0} is attached to the wrong parent")]
    ParentMismatch(String),
}

/// Round a quantity to two decimals for display (half away from zero).
pub fn round_quantity(quantity: Decimal) -> Decimal {
    quantity.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a floating-point input into a [`Decimal`], rejecting NaN and infinities.
pub fn decimal_from_f64(value: f64) -> Result<Decimal, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite);
    }
    Decimal::from_f64(value).ok_or(ValidationError::NonFinite)
}

/// Validate a margin: `0 <= margin < 1`.
pub fn validate_margin(margin: Decimal) -> Result<(), ValidationError> {
    if margin < Decimal::ZERO || margin >= Decimal::ONE {
        return Err(ValidationError::InvalidMargin(margin));
    }
    Ok(())
}

/// Validate an option.
pub fn validate_option(option: &PriceOption) -> Result<(), ValidationError> {
    validate_cost(&option.cost)?;
    let multiplier = option.multiplier();
    if multiplier < Decimal::ZERO {
        return Err(ValidationError::NegativeMultiplier(multiplier));
    }
    Ok(())
}

/// Validate a line item and its options, including the one-option-per-tier rule.
pub fn validate_line_item(item: &LineItem) -> Result<(), ValidationError> {
    if item.quantity() < Decimal::ZERO {
        return Err(ValidationError::NegativeQuantity(item.quantity()));
    }
    validate_margin(item.margin())?;
    let mut tiers = BTreeSet::new();
    for option in &item.options {
        validate_option(option)?;
        if !tiers.insert(option.tier) {
            return Err(ValidationError::DuplicateTier {
                line_item: item.id.0.clone(),
                tier: option.tier,
            });
        }
    }
    item.selected_option()?;
    Ok(())
}

/// Validate a group and check its line items point back at it.
pub fn validate_group(group: &Group) -> Result<(), ValidationError> {
    for item in &group.line_items {
        if item.group_id != group.id {
            return Err(ValidationError::ParentMismatch(item.id.0.clone()));
        }
        validate_line_item(item)?;
    }
    Ok(())
}

/// Validate the whole project, including category references.
pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    let categories: BTreeSet<&CategoryId> = project.categories.iter().map(|c| &c.id).collect();
    for area in &project.areas {
        for group in &area.groups {
            if group.area_id != area.id {
                return Err(ValidationError::ParentMismatch(group.id.0.clone()));
            }
            if !categories.contains(&group.category_id) {
                return Err(ValidationError::UnknownCategory(group.category_id.0.clone()));
            }
            validate_group(group)?;
        }
    }
    Ok(())
}
