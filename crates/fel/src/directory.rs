use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use mercaderp_invoicing::{ClientId, ClientSnapshot, OrderId, OrderSnapshot};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("client {0} not found")]
    ClientNotFound(ClientId),
}

/// Read access to orders and clients.
#[async_trait]
pub trait OrderClientService: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<OrderSnapshot, ServiceError>;
    async fn get_client(&self, id: ClientId) -> Result<ClientSnapshot, ServiceError>;
}

/// Map-backed directory for tests and the console demo.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    orders: RwLock<HashMap<OrderId, OrderSnapshot>>,
    clients: RwLock<HashMap<ClientId, ClientSnapshot>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: OrderSnapshot) {
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.id, order);
    }

    pub fn insert_client(&self, client: ClientSnapshot) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client.id, client);
    }
}

#[async_trait]
impl OrderClientService for InMemoryDirectory {
    async fn get_order(&self, id: OrderId) -> Result<OrderSnapshot, ServiceError> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(ServiceError::OrderNotFound(id))
    }

    async fn get_client(&self, id: ClientId) -> Result<ClientSnapshot, ServiceError> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(ServiceError::ClientNotFound(id))
    }
}
