use std::sync::Arc;

use mercaderp_invoicing::{DocumentChoice, FelEligibility, OrderId, can_create_fel, document_choice};

use crate::directory::{OrderClientService, ServiceError};

/// Document eligibility for an order, looked up through the directory.
pub struct FelEligibilityAdvisor<S> {
    service: Arc<S>,
}

impl<S: OrderClientService> FelEligibilityAdvisor<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn can_create_fel(&self, order_id: OrderId) -> Result<FelEligibility, ServiceError> {
        let order = self.service.get_order(order_id).await?;
        let client = self.service.get_client(order.client_id).await?;
        let eligibility = can_create_fel(&order, &client);
        tracing::debug!(
            order_id = %order_id,
            can_create = eligibility.can_create,
            reason = eligibility.reason.as_deref().unwrap_or(""),
            "fel eligibility evaluated"
        );
        Ok(eligibility)
    }

    pub async fn document_choice(&self, order_id: OrderId) -> Result<DocumentChoice, ServiceError> {
        let order = self.service.get_order(order_id).await?;
        let client = self.service.get_client(order.client_id).await?;
        Ok(document_choice(&order, &client))
    }
}
