use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use rawsy_auth::{CommandAuthorization, Permission};
use rawsy_products::{Product, ProductId};

use crate::app::dto::ProductResponse;
use crate::app::errors;
use crate::app::services::AppServices;

/// Associates required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

pub fn parse_product_id(raw: &str) -> Result<ProductId, Response> {
    raw.trim().parse().map_err(|_| errors::invalid_id("product"))
}

/// Respond with the projected product document after a successful command.
pub fn product_document(services: &AppServices, id: ProductId, status: StatusCode) -> Response {
    match services.product(id) {
        Some(product) => (status, axum::Json(full_view(&product))).into_response(),
        None => errors::not_found(),
    }
}

pub fn full_view(product: &Product) -> ProductResponse {
    ProductResponse::full(product, chrono::Utc::now())
}
