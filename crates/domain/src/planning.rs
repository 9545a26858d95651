//! Line sourcing: decides how each requested line is fulfilled.
//!
//! The planner is pure. It works against a map of inventory rows the caller
//! has already locked and mutates that map as it goes, so a later line sees
//! the stock an earlier line consumed.

use std::collections::HashMap;
use std::str::FromStr;

use common::{ExportSource, Money, ParseEnumError, ProductId, VersionToken};
use serde::{Deserialize, Serialize};
use store::{Inventory, NewOrderItem};

use crate::commands::OrderLine;
use crate::error::{DomainError, Result};
use crate::services::Product;

/// How order lines are assigned to stock or external sourcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcingMode {
    /// The client names the source of every line.
    #[default]
    Declared,
    /// The declared source is ignored: stock covers what it can and the
    /// remainder is sourced externally.
    AutoSplit,
}

impl SourcingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcingMode::Declared => "declared",
            SourcingMode::AutoSplit => "auto_split",
        }
    }
}

impl std::fmt::Display for SourcingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcingMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "declared" => Ok(SourcingMode::Declared),
            "auto_split" | "auto-split" | "autosplit" => Ok(SourcingMode::AutoSplit),
            _ => Err(ParseEnumError {
                kind: "sourcing mode",
                value: s.to_string(),
            }),
        }
    }
}

/// An order line as it will be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub number_of_boxes: Option<i64>,
    pub spec: Option<i64>,
    pub quantity: i64,
    pub selling_price: Money,
    pub original_price: Money,
    pub discount: i64,
    pub final_amount: Money,
    /// Cost of the line at the product's original price.
    pub original_cost: Money,
    pub export_from: ExportSource,
}

impl PlannedLine {
    fn new(
        index: usize,
        line: &OrderLine,
        product: &Product,
        quantity: i64,
        export_from: ExportSource,
    ) -> Result<Self> {
        let final_amount = line_amount(line.selling_price, quantity, line.discount)
            .ok_or_else(|| out_of_range(format!("lines[{index}]")))?;
        let original_cost = product
            .original_price
            .checked_multiply(quantity)
            .ok_or_else(|| out_of_range(format!("lines[{index}]")))?;

        Ok(Self {
            product_id: line.product_id,
            number_of_boxes: line.number_of_boxes,
            spec: line.spec,
            quantity,
            selling_price: line.selling_price,
            original_price: product.original_price,
            discount: line.discount,
            final_amount,
            original_cost,
            export_from,
        })
    }
}

impl From<PlannedLine> for NewOrderItem {
    fn from(line: PlannedLine) -> Self {
        NewOrderItem {
            product_id: line.product_id,
            number_of_boxes: line.number_of_boxes,
            spec: line.spec,
            quantity: line.quantity,
            selling_price: line.selling_price,
            original_price: line.original_price,
            discount: line.discount,
            final_amount: line.final_amount,
            export_from: line.export_from,
        }
    }
}

fn out_of_range(field: String) -> DomainError {
    DomainError::bad_request(field, "amount is out of range")
}

/// Stock to take from one inventory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    /// Units taken; always positive.
    pub quantity: i64,
    /// Version of the locked row the movement applies to.
    pub expected_version: VersionToken,
    /// Stock before the movement.
    pub previous_quantity: i64,
}

impl StockMovement {
    /// Stock after the movement.
    pub fn final_quantity(&self) -> i64 {
        self.previous_quantity - self.quantity
    }
}

/// Result of planning an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentPlan {
    pub lines: Vec<PlannedLine>,
    pub movements: Vec<StockMovement>,
    /// Σ original price × quantity over every line.
    pub total_original_cost: Money,
    /// Σ final amount over every line.
    pub total_sales_revenue: Money,
}

/// `quantity × selling_price` less the discount percentage, rounded half
/// away from zero. `None` if the product overflows.
pub fn line_amount(selling_price: Money, quantity: i64, discount: i64) -> Option<Money> {
    Some(selling_price.checked_multiply(quantity)?.discounted(discount))
}

fn check_version(line: &OrderLine, row: &Inventory) -> Result<()> {
    if line.expected_version != Some(row.version) {
        return Err(DomainError::VersionMismatch {
            product_id: line.product_id,
        });
    }
    Ok(())
}

/// Plans `lines` against the locked inventory rows in `stock`.
///
/// `products` must hold a snapshot of every product named by `lines`.
pub fn plan_lines(
    mode: SourcingMode,
    lines: &[OrderLine],
    products: &HashMap<ProductId, Product>,
    stock: &mut HashMap<ProductId, Inventory>,
) -> Result<FulfillmentPlan> {
    let mut planned = Vec::with_capacity(lines.len());
    let mut movements: Vec<StockMovement> = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| DomainError::not_found("product", line.product_id))?;

        let (take, external) = match mode {
            SourcingMode::Declared => match line.export_from {
                ExportSource::External => (0, line.quantity),
                ExportSource::Inventory => {
                    let row = stock
                        .get(&line.product_id)
                        .ok_or_else(|| DomainError::not_found("inventory", line.product_id))?;
                    check_version(line, row)?;
                    if !row.can_supply(line.quantity) {
                        return Err(DomainError::QuantityExceeded {
                            product_id: line.product_id,
                            requested: line.quantity,
                            available: row.quantity,
                        });
                    }
                    (line.quantity, 0)
                }
            },
            SourcingMode::AutoSplit => match stock.get(&line.product_id) {
                Some(row) if row.quantity > 0 => {
                    check_version(line, row)?;
                    let take = row.quantity.min(line.quantity);
                    (take, line.quantity - take)
                }
                _ => (0, line.quantity),
            },
        };

        if take > 0 {
            let row = stock
                .get_mut(&line.product_id)
                .ok_or_else(|| DomainError::not_found("inventory", line.product_id))?;

            match movements
                .iter_mut()
                .find(|m| m.product_id == line.product_id)
            {
                Some(movement) => movement.quantity += take,
                None => movements.push(StockMovement {
                    product_id: line.product_id,
                    quantity: take,
                    expected_version: row.version,
                    previous_quantity: row.quantity,
                }),
            }
            row.quantity -= take;
            planned.push(PlannedLine::new(
                index,
                line,
                product,
                take,
                ExportSource::Inventory,
            )?);
        }

        if external > 0 {
            planned.push(PlannedLine::new(
                index,
                line,
                product,
                external,
                ExportSource::External,
            )?);
        }
    }

    let total_original_cost = checked_total(planned.iter().map(|l| l.original_cost))?;
    let total_sales_revenue = checked_total(planned.iter().map(|l| l.final_amount))?;

    Ok(FulfillmentPlan {
        lines: planned,
        movements,
        total_original_cost,
        total_sales_revenue,
    })
}

fn checked_total(mut amounts: impl Iterator<Item = Money>) -> Result<Money> {
    amounts
        .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| out_of_range("lines".to_string()))
}
