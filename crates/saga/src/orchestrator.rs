//! Order placement and payment confirmation orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{CorrelationId, IdGenerator, OrderId, UserId, VariantId};
use domain::{Money, OrderHeader, OrderLineItem, OrderStatus, PlaceOrder};
use order_store::{OrderStore, StatusUpdate};
use tracing::field;

use crate::best_effort::BestEffort;
use crate::error::{PaymentError, PlaceOrderError, ServiceError, StoreCallError};
use crate::pricing;
use crate::services::cart::{self, CartClient};
use crate::services::inventory::{self, InventoryClient, ReservationItem};
use crate::services::payment::PaymentAdapter;
use crate::step::PlacementStep;

/// Tunables of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Deadline applied to every remote and store call.
    pub call_timeout: Duration,
    /// Flat shipping fee added to every order.
    pub shipping_fee: Money,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(3),
            shipping_fee: Money::zero(),
        }
    }
}

/// A successfully placed order.
#[derive(Debug)]
pub struct PlacedOrder {
    /// The persisted header.
    pub order: OrderHeader,
    /// The persisted line items.
    pub items: Vec<OrderLineItem>,
    /// Outcome of removing the ordered variants from the cart.
    pub cart_cleanup: BestEffort<ServiceError>,
    /// Correlation id of the placement, as logged.
    pub correlation_id: CorrelationId,
}

/// An order with its snapshot line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetail {
    pub order: OrderHeader,
    pub items: Vec<OrderLineItem>,
}

/// What a verified payment notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The order moved from AwaitingPayment to AwaitingShipment.
    Confirmed(OrderId),
    /// The order had already left AwaitingPayment; nothing changed.
    Duplicate { order_id: OrderId, status: OrderStatus },
    /// The notification reported a non-success trade status.
    Ignored { order_id: OrderId, trade_status: String },
}

impl PaymentOutcome {
    fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Confirmed(_) => "confirmed",
            PaymentOutcome::Duplicate { .. } => "duplicate",
            PaymentOutcome::Ignored { .. } => "ignored",
        }
    }
}

fn payment_error_label(err: &PaymentError) -> &'static str {
    match err {
        PaymentError::InvalidSignature(_) => "invalid_signature",
        PaymentError::MalformedNotification(_) => "malformed",
        PaymentError::OrderNotFound(_) => "order_not_found",
        PaymentError::InvalidOrderState { .. } => "invalid_order_state",
        PaymentError::PaymentAmountMismatch { .. } => "amount_mismatch",
        PaymentError::Gateway(_) | PaymentError::Timeout { .. } => "gateway_error",
        PaymentError::Store(_) => "store_error",
    }
}

/// Bounds a collaborator call by `timeout`.
async fn with_deadline<T, F>(
    timeout: Duration,
    service: &'static str,
    operation: &'static str,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ServiceError::Timeout {
            service,
            operation,
            timeout,
        }))
}

/// Drives order placement and payment confirmation.
///
/// Placement reserves stock before the order is written. The write is the
/// point of no return: any failure after the reservation releases the stock
/// again before the error is returned. Clearing the cart happens after the
/// write and never fails the placement.
pub struct OrderOrchestrator<S, I, C, P>
where
    S: OrderStore,
    I: InventoryClient,
    C: CartClient,
    P: PaymentAdapter,
{
    store: S,
    inventory: I,
    cart: C,
    payment: P,
    ids: Arc<dyn IdGenerator>,
    config: OrchestratorConfig,
}

impl<S, I, C, P> OrderOrchestrator<S, I, C, P>
where
    S: OrderStore,
    I: InventoryClient,
    C: CartClient,
    P: PaymentAdapter,
{
    /// Creates a new orchestrator with the default configuration.
    pub fn new(store: S, inventory: I, cart: C, payment: P, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            inventory,
            cart,
            payment,
            ids,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Places an order for the requested variants.
    ///
    /// On success exactly one order exists and its stock is reserved. On
    /// error no order exists and nothing is reserved, unless the reservation
    /// could not be settled (see [`PlaceOrderError::orphaned_reservation`]).
    /// That happens when the compensating release fails, or when a write
    /// timed out and the order could not be read back.
    #[tracing::instrument(
        skip(self, cmd),
        fields(user_id = %cmd.user_id, correlation_id = field::Empty, order_id = field::Empty)
    )]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        let started = Instant::now();
        let correlation_id = CorrelationId::new();
        tracing::Span::current().record("correlation_id", field::display(correlation_id));

        let result = self.run_placement(cmd, correlation_id).await;

        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(placed) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %placed.order.order_id,
                    payment_amount = %placed.order.payment_amount,
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("order_placement_failed_total", "reason" => e.kind())
                    .increment(1);
                if e.is_client_error() {
                    tracing::info!(error = %e, "order rejected");
                } else {
                    tracing::warn!(error = %e, "order placement failed");
                }
            }
        }
        result
    }

    async fn run_placement(
        &self,
        cmd: PlaceOrder,
        correlation_id: CorrelationId,
    ) -> Result<PlacedOrder, PlaceOrderError> {
        let timeout = self.config.call_timeout;

        let items = cmd.normalized_items()?;
        let variant_ids: Vec<VariantId> = items.iter().map(|i| i.variant_id).collect();

        tracing::debug!(step = %PlacementStep::Pricing, "placement step started");
        let snapshots = with_deadline(
            timeout,
            inventory::SERVICE,
            "get_sku_snapshots",
            self.inventory.get_sku_snapshots(&variant_ids),
        )
        .await
        .map_err(|source| PlaceOrderError::PricingUnavailable {
            correlation_id,
            source,
        })?;

        let draft = pricing::price_items(cmd.user_id, &items, snapshots, cmd.shipping_address)?;
        let charges = draft.charges(self.config.shipping_fee)?;

        tracing::debug!(step = %PlacementStep::Reservation, "placement step started");
        let reservation: Vec<ReservationItem> = items
            .iter()
            .map(|i| ReservationItem {
                variant_id: i.variant_id,
                quantity: i.quantity,
            })
            .collect();
        with_deadline(
            timeout,
            inventory::SERVICE,
            "reserve_stock",
            self.inventory.reserve_stock(&reservation),
        )
        .await
        .map_err(|source| PlaceOrderError::StockReservationFailed {
            correlation_id,
            source,
        })?;

        // Stock is held from here on; every failure path must release it.
        tracing::debug!(step = %PlacementStep::IdAssignment, "placement step started");
        let order_id = match self.ids.next_id() {
            Ok(id) => id,
            Err(source) => {
                let compensated = self
                    .release_reservation(correlation_id, None, &reservation)
                    .await;
                return Err(PlaceOrderError::IdGenerationFailed {
                    correlation_id,
                    compensated,
                    source,
                });
            }
        };
        tracing::Span::current().record("order_id", field::display(order_id));

        let (header, line_items) = draft.into_order(order_id, charges, Utc::now());

        tracing::debug!(step = %PlacementStep::Persist, "placement step started");
        let persisted = match self
            .store_call(self.store.create_order_atomic(header, line_items.clone()))
            .await
        {
            Ok(header) => header,
            Err(source @ StoreCallError::Timeout(_)) => {
                self.recover_timed_out_write(correlation_id, order_id, &reservation, source)
                    .await?
            }
            Err(source) => {
                let compensated = self
                    .release_reservation(correlation_id, Some(order_id), &reservation)
                    .await;
                return Err(PlaceOrderError::OrderPersistFailed {
                    correlation_id,
                    order_id,
                    compensated,
                    source,
                });
            }
        };

        let cart_cleanup: BestEffort<ServiceError> = with_deadline(
            timeout,
            cart::SERVICE,
            "clear_items",
            self.cart.clear_items(persisted.user_id, &variant_ids),
        )
        .await
        .into();
        if let Some(e) = cart_cleanup.failure() {
            metrics::counter!("cart_clear_failed_total").increment(1);
            tracing::warn!(
                step = %PlacementStep::CartCleanup,
                %order_id,
                error = %e,
                "cart cleanup failed, order kept"
            );
        }

        Ok(PlacedOrder {
            order: persisted,
            items: line_items,
            cart_cleanup,
            correlation_id,
        })
    }

    /// Resolves a write that hit its deadline.
    ///
    /// The commit may have landed after the deadline, so the order is read
    /// back before any stock is released. A stored order means the write
    /// succeeded. If the read fails too, the outcome is unknown and the
    /// reservation is kept.
    async fn recover_timed_out_write(
        &self,
        correlation_id: CorrelationId,
        order_id: OrderId,
        reservation: &[ReservationItem],
        source: StoreCallError,
    ) -> Result<OrderHeader, PlaceOrderError> {
        let compensated = match self.store_call(self.store.get_order(order_id)).await {
            Ok(Some(stored)) => {
                tracing::warn!(
                    step = %PlacementStep::Persist,
                    %correlation_id,
                    %order_id,
                    "order write timed out but was committed"
                );
                return Ok(stored);
            }
            Ok(None) => {
                self.release_reservation(correlation_id, Some(order_id), reservation)
                    .await
            }
            Err(lookup) => {
                self.report_orphaned_reservation(
                    correlation_id,
                    Some(order_id),
                    reservation,
                    &lookup,
                );
                false
            }
        };

        Err(PlaceOrderError::OrderPersistFailed {
            correlation_id,
            order_id,
            compensated,
            source,
        })
    }

    /// Releases a reservation after a failure past the reservation step.
    ///
    /// Returns true if the release succeeded.
    async fn release_reservation(
        &self,
        correlation_id: CorrelationId,
        order_id: Option<OrderId>,
        reservation: &[ReservationItem],
    ) -> bool {
        let result = with_deadline(
            self.config.call_timeout,
            inventory::SERVICE,
            "release_stock",
            self.inventory.release_stock(reservation),
        )
        .await;

        match result {
            Ok(()) => {
                metrics::counter!("order_reservations_released_total").increment(1);
                tracing::info!(
                    step = %PlacementStep::Compensation,
                    %correlation_id,
                    ?order_id,
                    "reservation released"
                );
                true
            }
            Err(e) => {
                self.report_orphaned_reservation(correlation_id, order_id, reservation, &e);
                false
            }
        }
    }

    fn report_orphaned_reservation(
        &self,
        correlation_id: CorrelationId,
        order_id: Option<OrderId>,
        reservation: &[ReservationItem],
        error: &dyn std::error::Error,
    ) {
        metrics::counter!("order_orphaned_reservations_total").increment(1);
        let variant_ids: Vec<VariantId> = reservation.iter().map(|r| r.variant_id).collect();
        tracing::error!(
            step = %PlacementStep::Compensation,
            %correlation_id,
            ?order_id,
            ?variant_ids,
            error = %error,
            "stock reservation left held, release it manually"
        );
    }

    /// Builds the payment URL for an order awaiting payment.
    #[tracing::instrument(skip(self), fields(%user_id, %order_id))]
    pub async fn get_payment_url(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<String, PaymentError> {
        let order = self
            .store_call(self.store.get_order(order_id))
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if !order.is_owned_by(user_id) {
            return Err(PaymentError::InvalidOrderState {
                order_id,
                status: order.status,
                reason: "order belongs to another user",
            });
        }
        if !order.status.can_pay() {
            return Err(PaymentError::InvalidOrderState {
                order_id,
                status: order.status,
                reason: "order is not awaiting payment",
            });
        }

        self.payment_call("build_payment_url", self.payment.build_payment_url(&order))
            .await
    }

    /// Applies a payment notification from the gateway.
    ///
    /// Redelivery of an already applied notification succeeds without
    /// changing anything.
    #[tracing::instrument(skip(self, payload))]
    pub async fn confirm_payment(&self, payload: &str) -> Result<PaymentOutcome, PaymentError> {
        let result = self.apply_notification(payload).await;
        match &result {
            Ok(outcome) => {
                metrics::counter!("payment_notifications_total", "outcome" => outcome.label())
                    .increment(1);
            }
            Err(e) => {
                let outcome = payment_error_label(e);
                metrics::counter!("payment_notifications_total", "outcome" => outcome).increment(1);
                tracing::warn!(error = %e, "payment notification rejected");
            }
        }
        result
    }

    async fn apply_notification(&self, payload: &str) -> Result<PaymentOutcome, PaymentError> {
        let notification = self
            .payment_call("verify_notification", self.payment.verify_notification(payload))
            .await?;
        let order_id = notification.order_id;

        if !notification.is_success() {
            tracing::info!(
                %order_id,
                trade_status = %notification.trade_status,
                "non-success notification ignored"
            );
            return Ok(PaymentOutcome::Ignored {
                order_id,
                trade_status: notification.trade_status,
            });
        }

        let order = self
            .store_call(self.store.get_order(order_id))
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if let Some(received) = notification.total_amount
            && received != order.payment_amount
        {
            return Err(PaymentError::PaymentAmountMismatch {
                order_id,
                expected: order.payment_amount,
                received,
            });
        }

        if order.status != OrderStatus::AwaitingPayment {
            tracing::warn!(%order_id, status = %order.status, "duplicate payment notification");
            return Ok(PaymentOutcome::Duplicate {
                order_id,
                status: order.status,
            });
        }

        let update = self
            .store_call(self.store.update_status(
                order_id,
                OrderStatus::AwaitingPayment,
                OrderStatus::AwaitingShipment,
            ))
            .await?;
        match update {
            StatusUpdate::Applied => {
                tracing::info!(%order_id, trade_no = ?notification.trade_no, "payment confirmed");
                Ok(PaymentOutcome::Confirmed(order_id))
            }
            StatusUpdate::Unchanged { current } => {
                tracing::warn!(%order_id, status = %current, "duplicate payment notification");
                Ok(PaymentOutcome::Duplicate {
                    order_id,
                    status: current,
                })
            }
        }
    }

    /// Returns an order with its line items, if it exists and belongs to `user_id`.
    #[tracing::instrument(skip(self), fields(%user_id, %order_id))]
    pub async fn get_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<OrderDetail>, StoreCallError> {
        let Some(order) = self.store_call(self.store.get_order(order_id)).await? else {
            return Ok(None);
        };
        if !order.is_owned_by(user_id) {
            return Ok(None);
        }
        let items = self.store_call(self.store.get_order_items(order_id)).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    async fn store_call<T, F>(&self, call: F) -> Result<T, StoreCallError>
    where
        F: Future<Output = order_store::Result<T>>,
    {
        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreCallError::Timeout(timeout)),
        }
    }

    async fn payment_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, PaymentError>
    where
        F: Future<Output = Result<T, PaymentError>>,
    {
        let timeout = self.config.call_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(PaymentError::Timeout { operation, timeout }))
    }
}
