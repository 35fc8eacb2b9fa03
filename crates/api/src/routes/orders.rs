//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use domain::{OrderHeader, OrderLineItem, OrderRequestItem, PlaceOrder, ShippingAddress};
use serde::{Deserialize, Serialize};

use super::{parse_order_id, user_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderRequestItem>,
    pub shipping_address: ShippingAddress,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderPlacedResponse {
    /// Order ids exceed the integer range of JSON clients, so they are strings.
    pub order_id: String,
    pub status: String,
    pub total_amount: i64,
    pub shipping_fee: i64,
    pub payment_amount: i64,
    pub cart_cleared: bool,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: String,
    pub total_amount: i64,
    pub shipping_fee: i64,
    pub payment_amount: i64,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItemResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub variant_id: u64,
    pub product_id: u64,
    pub title: String,
    pub image_url: String,
    pub unit_price: i64,
    pub quantity: u32,
    pub subtotal: i64,
}

impl OrderResponse {
    fn new(order: OrderHeader, items: Vec<OrderLineItem>) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            status: order.status.as_str().to_string(),
            total_amount: order.total_amount.minor(),
            shipping_fee: order.shipping_fee.minor(),
            payment_amount: order.payment_amount.minor(),
            shipping_address: order.shipping_address,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    variant_id: item.variant_id.get(),
                    product_id: item.product_id.get(),
                    unit_price: item.unit_price.minor(),
                    quantity: item.quantity,
                    subtotal: item.subtotal().minor(),
                    title: item.title,
                    image_url: item.image_url,
                })
                .collect(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the calling user.
#[tracing::instrument(skip(state, headers, req))]
pub async fn place(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let user_id = user_id(&headers)?;
    let placed = state
        .orchestrator
        .place_order(PlaceOrder::new(user_id, req.items, req.shipping_address))
        .await?;

    let order = placed.order;
    let response = OrderPlacedResponse {
        order_id: order.order_id.to_string(),
        status: order.status.as_str().to_string(),
        total_amount: order.total_amount.minor(),
        shipping_fee: order.shipping_fee.minor(),
        payment_amount: order.payment_amount.minor(),
        cart_cleared: placed.cart_cleanup.is_done(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}: load one of the caller's orders with its items.
#[tracing::instrument(skip(state, headers))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let order_id = parse_order_id(&id)?;

    let detail = state
        .orchestrator
        .get_order(user_id, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;

    Ok(Json(OrderResponse::new(detail.order, detail.items)))
}
