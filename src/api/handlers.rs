use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};

use super::api_types::{
    CreateOrderRequest, CreateOrderResponse, DeadLettersQuery, DeadLettersResponse, DispenseRequest,
    DispenseResponse, ErrorResponse,
};
use super::ApiState;
use crate::coordinator::CoordinatorError;
use crate::domain::order::{OrderId, OrderStatus};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Coordinator(e) => e.code(),
            ApiError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::Coordinator(e) => e.is_retryable(),
            ApiError::Unavailable(_) => true,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Coordinator(CoordinatorError::InvalidItems(_))
            | ApiError::Coordinator(CoordinatorError::InvalidState { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Coordinator(CoordinatorError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Coordinator(CoordinatorError::TransportFailure { .. }) | ApiError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Coordinator(CoordinatorError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            retryable: self.retryable(),
        })
    }
}

// ============================================================================
// Orders
// ============================================================================

/// `POST /api/orders`
pub(crate) async fn create_order(
    state: web::Data<ApiState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let order = state.coordinator.create_order(body.into_inner().into_items()).await?;

    Ok(HttpResponse::Created().json(CreateOrderResponse {
        order_id: order.order_id,
        amount: order.total_amount,
        status: order.status,
    }))
}

/// `GET /api/orders`
pub(crate) async fn list_orders(state: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    let orders = state.coordinator.list_orders().await?;
    Ok(HttpResponse::Ok().json(orders))
}

/// `POST /api/orders/{id}/confirm-payment`
pub(crate) async fn confirm_payment(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = OrderId::new(path.into_inner());
    let order = state.coordinator.confirm_payment(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// `POST /api/orders/{id}/dispense`
///
/// Answers 202 once the command is on the channel; progress is polled through
/// the status endpoint.
pub(crate) async fn dispense(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: Option<web::Json<DispenseRequest>>,
) -> Result<HttpResponse, ApiError> {
    let order_id = OrderId::new(path.into_inner());
    let retry_of = body.and_then(|b| b.into_inner().dispatch_id);

    let dispatch_id = state.coordinator.trigger_dispense(&order_id, retry_of).await?;

    Ok(HttpResponse::Accepted().json(DispenseResponse {
        dispatch_id,
        status: OrderStatus::Dispensing,
    }))
}

/// `GET /api/orders/{id}/status`
pub(crate) async fn order_status(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = OrderId::new(path.into_inner());
    let status = state.coordinator.get_status(&order_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

// ============================================================================
// Admin + health
// ============================================================================

/// `GET /api/admin/dead-letters?limit=N`
pub(crate) async fn dead_letters(
    state: web::Data<ApiState>,
    query: web::Query<DeadLettersQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);

    let letters = state
        .supervisor
        .dead_letters(limit)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    let stats = state
        .supervisor
        .dlq_stats()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(HttpResponse::Ok().json(DeadLettersResponse {
        total_received: stats.total_received,
        dead_letters: letters.0,
    }))
}

/// `GET /health`
pub(crate) async fn health(state: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    let health = state
        .supervisor
        .health()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    let status = if health.overall_status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok(HttpResponse::build(status).json(health))
}
