//! Order header, snapshot line items and the inventory snapshot they are priced from.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderStatus, ShippingAddress};

/// Price and stock of one variant as reported by the inventory service.
///
/// Transient: used to price a placement, never persisted by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuSnapshot {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub unit_price: Money,
    pub available_stock: u32,
    pub title: String,
    pub image_url: String,
}

/// A requested line priced from a snapshot, before an order id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub title: String,
    pub image_url: String,
    pub unit_price: Money,
    pub quantity: u32,
    subtotal: Money,
}

impl PricedLine {
    /// Prices `quantity` units at the snapshot's unit price.
    pub fn new(snapshot: &SkuSnapshot, quantity: u32) -> Result<Self, OrderError> {
        let subtotal = line_subtotal(snapshot.variant_id, snapshot.unit_price, quantity)?;
        Ok(Self {
            variant_id: snapshot.variant_id,
            product_id: snapshot.product_id,
            title: snapshot.title.clone(),
            image_url: snapshot.image_url.clone(),
            unit_price: snapshot.unit_price,
            quantity,
            subtotal,
        })
    }

    /// Returns `unit_price * quantity`.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }
}

/// A fully priced order that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub shipping_address: ShippingAddress,
    lines: Vec<PricedLine>,
    total_amount: Money,
}

impl OrderDraft {
    /// Builds a draft, summing line subtotals into the order total.
    pub fn new(
        user_id: UserId,
        lines: Vec<PricedLine>,
        shipping_address: ShippingAddress,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyItemList);
        }
        let mut total_amount = Money::zero();
        for line in &lines {
            total_amount = total_amount
                .checked_add(line.subtotal())
                .ok_or(OrderError::AmountOverflow {
                    variant_id: line.variant_id,
                })?;
        }
        Ok(Self {
            user_id,
            shipping_address,
            lines,
            total_amount,
        })
    }

    /// Returns the priced lines.
    pub fn lines(&self) -> &[PricedLine] {
        &self.lines
    }

    /// Returns the sum of all line subtotals.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Adds the shipping fee to the draft total.
    pub fn charges(&self, shipping_fee: Money) -> Result<OrderCharges, OrderError> {
        let payment_amount = self
            .total_amount
            .checked_add(shipping_fee)
            .ok_or(OrderError::TotalOverflow)?;
        Ok(OrderCharges {
            shipping_fee,
            payment_amount,
        })
    }

    /// Assigns the order id and produces the header and line items to persist.
    pub fn into_order(
        self,
        order_id: OrderId,
        charges: OrderCharges,
        now: DateTime<Utc>,
    ) -> (OrderHeader, Vec<OrderLineItem>) {
        let OrderCharges {
            shipping_fee,
            payment_amount,
        } = charges;

        let header = OrderHeader {
            order_id,
            user_id: self.user_id,
            total_amount: self.total_amount,
            shipping_fee,
            payment_amount,
            status: OrderStatus::AwaitingPayment,
            shipping_address: self.shipping_address,
            created_at: now,
            updated_at: now,
        };
        let items = self
            .lines
            .into_iter()
            .map(|line| OrderLineItem::from_priced(order_id, line))
            .collect();
        (header, items)
    }
}

/// Shipping fee and amount due of a draft, computed before stock is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderCharges {
    shipping_fee: Money,
    payment_amount: Money,
}

impl OrderCharges {
    pub fn shipping_fee(&self) -> Money {
        self.shipping_fee
    }

    /// Returns `total_amount + shipping_fee`.
    pub fn payment_amount(&self) -> Money {
        self.payment_amount
    }
}

/// One purchased variant of an order, with the price and display data frozen
/// at order time. Never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub title: String,
    pub image_url: String,
    pub unit_price: Money,
    pub quantity: u32,
    subtotal: Money,
}

impl OrderLineItem {
    /// Creates a line item, computing its subtotal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        variant_id: VariantId,
        product_id: ProductId,
        title: impl Into<String>,
        image_url: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        let subtotal = line_subtotal(variant_id, unit_price, quantity)?;
        Ok(Self {
            order_id,
            variant_id,
            product_id,
            title: title.into(),
            image_url: image_url.into(),
            unit_price,
            quantity,
            subtotal,
        })
    }

    fn from_priced(order_id: OrderId, line: PricedLine) -> Self {
        Self {
            order_id,
            variant_id: line.variant_id,
            product_id: line.product_id,
            title: line.title,
            image_url: line.image_url,
            unit_price: line.unit_price,
            quantity: line.quantity,
            subtotal: line.subtotal,
        }
    }

    /// Returns `unit_price * quantity`.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }
}

/// Identity and aggregate financial state of one purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: Money,
    pub shipping_fee: Money,
    pub payment_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderHeader {
    /// Returns true if the order belongs to `user_id`.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Returns true if `total_amount` equals the sum of the items' subtotals.
    pub fn matches_items(&self, items: &[OrderLineItem]) -> bool {
        items
            .iter()
            .try_fold(Money::zero(), |acc, item| {
                if item.order_id != self.order_id {
                    return None;
                }
                acc.checked_add(item.subtotal())
            })
            .is_some_and(|sum| sum == self.total_amount)
    }
}

fn line_subtotal(
    variant_id: VariantId,
    unit_price: Money,
    quantity: u32,
) -> Result<Money, OrderError> {
    if unit_price.is_negative() {
        return Err(OrderError::InvalidPrice {
            variant_id,
            price: unit_price.minor(),
        });
    }
    unit_price
        .checked_mul(quantity)
        .ok_or(OrderError::AmountOverflow { variant_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(variant: u64, price: i64, stock: u32) -> SkuSnapshot {
        SkuSnapshot {
            variant_id: VariantId::new(variant),
            product_id: ProductId::new(variant / 10),
            unit_price: Money::from_minor(price),
            available_stock: stock,
            title: format!("Variant {variant}"),
            image_url: format!("https://img.example.com/{variant}.png"),
        }
    }

    #[test]
    fn test_priced_line_subtotal() {
        let line = PricedLine::new(&snapshot(1001, 899_900, 99), 2).unwrap();
        assert_eq!(line.subtotal(), Money::from_minor(1_799_800));
        assert_eq!(line.unit_price, Money::from_minor(899_900));
        assert_eq!(line.title, "Variant 1001");
    }

    #[test]
    fn test_priced_line_rejects_overflow() {
        let result = PricedLine::new(&snapshot(1, i64::MAX / 2, 10), 3);
        assert_eq!(
            result,
            Err(OrderError::AmountOverflow {
                variant_id: VariantId::new(1)
            })
        );
    }

    #[test]
    fn test_priced_line_rejects_negative_price() {
        let result = PricedLine::new(&snapshot(1, -5, 10), 1);
        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_draft_total_is_sum_of_subtotals() {
        let lines = vec![
            PricedLine::new(&snapshot(1001, 899_900, 99), 2).unwrap(),
            PricedLine::new(&snapshot(2002, 1_500, 10), 3).unwrap(),
        ];
        let draft = OrderDraft::new(UserId::new(42), lines, ShippingAddress::default()).unwrap();
        assert_eq!(draft.total_amount(), Money::from_minor(1_799_800 + 4_500));
    }

    #[test]
    fn test_draft_requires_lines() {
        let result = OrderDraft::new(UserId::new(42), vec![], ShippingAddress::default());
        assert_eq!(result, Err(OrderError::EmptyItemList));
    }

    #[test]
    fn test_charges_reject_overflowing_fee() {
        let lines = vec![PricedLine::new(&snapshot(1001, 899_900, 99), 1).unwrap()];
        let draft = OrderDraft::new(UserId::new(42), lines, ShippingAddress::default()).unwrap();

        assert_eq!(
            draft.charges(Money::from_minor(i64::MAX)),
            Err(OrderError::TotalOverflow)
        );
        let charges = draft.charges(Money::from_minor(500)).unwrap();
        assert_eq!(charges.shipping_fee(), Money::from_minor(500));
        assert_eq!(charges.payment_amount(), Money::from_minor(900_400));
    }

    #[test]
    fn test_into_order_assigns_id_and_status() {
        let lines = vec![PricedLine::new(&snapshot(1001, 899_900, 99), 2).unwrap()];
        let draft = OrderDraft::new(UserId::new(42), lines, ShippingAddress::default()).unwrap();
        let now = Utc::now();

        let charges = draft.charges(Money::from_minor(1_000)).unwrap();
        let (header, items) = draft.into_order(OrderId::new(7), charges, now);

        assert_eq!(header.order_id, OrderId::new(7));
        assert_eq!(header.status, OrderStatus::AwaitingPayment);
        assert_eq!(header.total_amount, Money::from_minor(1_799_800));
        assert_eq!(header.payment_amount, Money::from_minor(1_800_800));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].order_id, OrderId::new(7));
        assert!(header.matches_items(&items));
    }

    #[test]
    fn test_matches_items_detects_mismatch() {
        let lines = vec![PricedLine::new(&snapshot(1001, 100, 99), 2).unwrap()];
        let draft = OrderDraft::new(UserId::new(1), lines, ShippingAddress::default()).unwrap();
        let charges = draft.charges(Money::zero()).unwrap();
        let (mut header, items) = draft.into_order(OrderId::new(1), charges, Utc::now());

        header.total_amount = Money::from_minor(1);
        assert!(!header.matches_items(&items));
    }

    #[test]
    fn test_line_item_new_computes_subtotal() {
        let item = OrderLineItem::new(
            OrderId::new(1),
            VariantId::new(2),
            ProductId::new(3),
            "Widget",
            "https://img.example.com/w.png",
            Money::from_minor(250),
            4,
        )
        .unwrap();
        assert_eq!(item.subtotal(), Money::from_minor(1_000));
    }
}
