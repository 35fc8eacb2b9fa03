//! Pricing of a placement request against inventory snapshots.

use std::collections::HashMap;

use common::{UserId, VariantId};
use domain::{OrderDraft, OrderRequestItem, PricedLine, ShippingAddress, SkuSnapshot};

use crate::error::PlaceOrderError;

/// Prices normalized request items from the snapshots returned by inventory.
///
/// Every requested variant must have exactly one snapshot. The stock check is
/// advisory: the reservation that follows is authoritative.
pub fn price_items(
    user_id: UserId,
    items: &[OrderRequestItem],
    snapshots: Vec<SkuSnapshot>,
    shipping_address: ShippingAddress,
) -> Result<OrderDraft, PlaceOrderError> {
    let returned = snapshots.len();
    let by_variant: HashMap<VariantId, SkuSnapshot> = snapshots
        .into_iter()
        .map(|s| (s.variant_id, s))
        .collect();

    let missing: Vec<VariantId> = items
        .iter()
        .map(|i| i.variant_id)
        .filter(|id| !by_variant.contains_key(id))
        .collect();
    if !missing.is_empty() || returned != items.len() {
        return Err(PlaceOrderError::ProductUnavailable {
            requested: items.len(),
            found: items.len() - missing.len(),
            missing,
        });
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let snapshot = &by_variant[&item.variant_id];
        if item.quantity > snapshot.available_stock {
            return Err(PlaceOrderError::InsufficientStock {
                variant_id: item.variant_id,
                requested: item.quantity,
                available: snapshot.available_stock,
            });
        }
        lines.push(PricedLine::new(snapshot, item.quantity)?);
    }

    Ok(OrderDraft::new(user_id, lines, shipping_address)?)
}
