//! HTTP clients for the remote inventory and cart services.

use std::time::Duration;

use async_trait::async_trait;
use common::{UserId, VariantId};
use domain::SkuSnapshot;
use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::ServiceError;
use crate::services::cart::{self, CartClient};
use crate::services::inventory::{self, InventoryClient, ReservationItem};

#[derive(Serialize)]
struct VariantIdsBody<'a> {
    variant_ids: &'a [VariantId],
}

#[derive(Serialize)]
struct ReservationBody<'a> {
    items: &'a [ReservationItem],
}

fn build_client(service: &'static str, timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| ServiceError::Transport {
            service,
            operation: "build_client",
            source,
        })
}

/// Turns a non-2xx answer into [`ServiceError::Rejected`].
async fn check_status(
    service: &'static str,
    operation: &'static str,
    response: Response,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        service,
        operation,
        message: format!("{status}: {body}"),
    })
}

fn transport(
    service: &'static str,
    operation: &'static str,
) -> impl FnOnce(reqwest::Error) -> ServiceError {
    move |source| ServiceError::Transport {
        service,
        operation,
        source,
    }
}

/// Inventory service client over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client for the inventory service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(inventory::SERVICE, timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_items(
        &self,
        operation: &'static str,
        path: &str,
        items: &[ReservationItem],
    ) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&ReservationBody { items })
            .send()
            .await
            .map_err(transport(inventory::SERVICE, operation))?;
        check_status(inventory::SERVICE, operation, response).await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_sku_snapshots(&self, ids: &[VariantId]) -> Result<Vec<SkuSnapshot>, ServiceError> {
        const OPERATION: &str = "get_sku_snapshots";

        let response = self
            .client
            .post(format!("{}/skus/snapshots", self.base_url))
            .json(&VariantIdsBody { variant_ids: ids })
            .send()
            .await
            .map_err(transport(inventory::SERVICE, OPERATION))?;
        check_status(inventory::SERVICE, OPERATION, response)
            .await?
            .json()
            .await
            .map_err(transport(inventory::SERVICE, OPERATION))
    }

    async fn reserve_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        self.post_items("reserve_stock", "/stock/reserve", items).await
    }

    async fn release_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        self.post_items("release_stock", "/stock/release", items).await
    }
}

/// Cart service client over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpCartClient {
    client: Client,
    base_url: String,
}

impl HttpCartClient {
    /// Creates a client for the cart service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(cart::SERVICE, timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CartClient for HttpCartClient {
    async fn clear_items(&self, user_id: UserId, ids: &[VariantId]) -> Result<(), ServiceError> {
        const OPERATION: &str = "clear_items";

        let response = self
            .client
            .post(format!("{}/carts/{user_id}/clear", self.base_url))
            .json(&VariantIdsBody { variant_ids: ids })
            .send()
            .await
            .map_err(transport(cart::SERVICE, OPERATION))?;
        check_status(cart::SERVICE, OPERATION, response).await?;
        Ok(())
    }
}
