//! Input checks run before any lock is taken.

use std::collections::HashSet;

use common::{ActorId, ExportSource};

use crate::commands::{CreateOrder, DeleteOrder, UpdateOrder, UpdateQuantity};
use crate::error::{DomainError, Result};
use crate::planning::SourcingMode;

/// Returns the actor, or `Unauthorized` when there is none.
pub fn require_actor(actor: Option<ActorId>) -> Result<ActorId> {
    actor.ok_or(DomainError::Unauthorized)
}

fn check_image_keys(keys: &[String]) -> Result<()> {
    if let Some(i) = keys.iter().position(|k| k.trim().is_empty()) {
        return Err(DomainError::bad_request(
            format!("image_keys[{i}]"),
            "must not be empty",
        ));
    }
    Ok(())
}

/// Validates a create command for the given sourcing mode.
///
/// In declared mode a product may appear once per export source; in
/// auto-split mode the source is decided by the planner, so a product may
/// appear only once.
pub fn validate_create(cmd: &CreateOrder, mode: SourcingMode) -> Result<ActorId> {
    let actor = require_actor(cmd.actor)?;

    if cmd.lines.is_empty() {
        return Err(DomainError::bad_request(
            "lines",
            "at least one line is required",
        ));
    }
    if cmd.additional_cost.is_negative() {
        return Err(DomainError::bad_request(
            "additional_cost",
            "must not be negative",
        ));
    }
    check_image_keys(&cmd.image_keys)?;

    for (i, line) in cmd.lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(DomainError::bad_request(
                format!("lines[{i}].quantity"),
                "must be positive",
            ));
        }
        if line.selling_price.is_negative() {
            return Err(DomainError::bad_request(
                format!("lines[{i}].selling_price"),
                "must not be negative",
            ));
        }
        for (name, value) in [("number_of_boxes", line.number_of_boxes), ("spec", line.spec)] {
            if value.is_some_and(|v| v < 0) {
                return Err(DomainError::bad_request(
                    format!("lines[{i}].{name}"),
                    "must not be negative",
                ));
            }
        }
        if !(0..=100).contains(&line.discount) {
            return Err(DomainError::bad_request(
                format!("lines[{i}].discount"),
                "must be within 0..=100",
            ));
        }

        let may_take_stock = match mode {
            SourcingMode::Declared => line.export_from == ExportSource::Inventory,
            SourcingMode::AutoSplit => true,
        };
        if may_take_stock && line.expected_version.is_none() {
            return Err(DomainError::bad_request(
                format!("lines[{i}].expected_version"),
                "required for lines that take stock",
            ));
        }
    }

    let mut seen = HashSet::new();
    for line in &cmd.lines {
        let fresh = match mode {
            SourcingMode::Declared => seen.insert((line.product_id, Some(line.export_from))),
            SourcingMode::AutoSplit => seen.insert((line.product_id, None)),
        };
        if !fresh {
            return Err(DomainError::DuplicateOrderItems {
                product_id: line.product_id,
                export_from: line.export_from,
            });
        }
    }

    Ok(actor)
}

/// Validates a metadata update.
pub fn validate_update(cmd: &UpdateOrder) -> Result<ActorId> {
    let actor = require_actor(cmd.actor)?;
    if let Some(cost) = cmd.additional_cost
        && cost.is_negative()
    {
        return Err(DomainError::bad_request(
            "additional_cost",
            "must not be negative",
        ));
    }
    if let Some(ref keys) = cmd.image_keys {
        check_image_keys(keys)?;
    }
    Ok(actor)
}

pub fn validate_delete(cmd: &DeleteOrder) -> Result<ActorId> {
    require_actor(cmd.actor)
}

/// Validates a manual stock adjustment.
pub fn validate_quantity_update(cmd: &UpdateQuantity) -> Result<ActorId> {
    let actor = require_actor(cmd.actor)?;
    if cmd.delta == 0 {
        return Err(DomainError::bad_request("delta", "must not be zero"));
    }
    Ok(actor)
}
