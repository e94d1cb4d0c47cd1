//! Product catalog routes: public reads, supplier CRUD/discounts/images and
//! admin moderation.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;

use rawsy_auth::Permission;
use rawsy_products::{
    ApplyDiscount, AttachImage, CatalogStats, CreateProduct, DeleteProduct, DetachImage, FlagProduct,
    Product, ProductCommand, ProductId, RemoveDiscount, ReviewProduct, UnflagProduct, UpdateProduct,
    query,
};

use crate::app::dto::{
    ApplyDiscountRequest, CreateProductRequest, FlagRequest, ImageRequest, ProductResponse,
    ReviewRequest, SearchQuery, TopRatedQuery, UpdateProductRequest,
};
use crate::app::errors;
use crate::app::extract::{ApiJson, ApiQuery};
use crate::app::routes::common::{CmdAuth, full_view, parse_product_id, product_document};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_public).post(create_product))
        .route("/top-rated", get(top_rated))
        .route("/search/filter", get(search))
        .route("/mine", get(list_mine))
        .route("/discount/add", put(apply_discount))
        .route("/discount/remove/:id", put(remove_discount))
        .route("/admin/all", get(admin_list_all))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/all/:id/review", put(review_product))
        .route("/admin/all/:id/flag", put(flag_product))
        .route("/admin/all/:id/unflag", put(unflag_product))
        .route("/:id", get(get_public).put(update_product).delete(delete_product))
        .route("/:id/images", post(attach_image).delete(detach_image))
}

/// Authorize, dispatch, and answer with the resulting document.
fn execute(
    services: &AppServices,
    actor: &ActorContext,
    cmd: CmdAuth<ProductCommand>,
    success: StatusCode,
) -> Response {
    if let Err(e) = authz::authorize_command(actor, &cmd) {
        return errors::authz_error_to_response(e);
    }

    let product_id = cmd.inner.product_id();
    match services.dispatch::<Product>(product_id.aggregate_id(), cmd.inner) {
        Ok(_) => product_document(services, product_id, success),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn public_views(products: Vec<Product>) -> Vec<ProductResponse> {
    let now = Utc::now();
    products.iter().map(|p| ProductResponse::public(p, now)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Public reads
// ─────────────────────────────────────────────────────────────────────────────

/// GET /products (approved only, newest first)
async fn list_public(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(public_views(query::public_listing(services.products())))
}

/// GET /products/top-rated?limit=
async fn top_rated(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(q): ApiQuery<TopRatedQuery>,
) -> impl IntoResponse {
    let limit = query::clamp_limit(q.limit);
    Json(public_views(query::top_rated(services.products(), limit)))
}

/// GET /products/search/filter?q=&category=&minPrice=&maxPrice=
async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Response {
    let filter = q.into_filter();
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
        if min > max {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_argument",
                "minPrice must not exceed maxPrice",
            );
        }
    }
    Json(public_views(query::search(services.products(), &filter, Utc::now()))).into_response()
}

/// GET /products/:id (approved only)
async fn get_public(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.product(product_id).filter(Product::is_public) {
        Some(p) => Json(ProductResponse::public(&p, Utc::now())).into_response(),
        None => errors::not_found(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supplier
// ─────────────────────────────────────────────────────────────────────────────

/// GET /products/mine (all statuses)
async fn list_mine(Extension(services): Extension<Arc<AppServices>>, actor: ActorContext) -> Response {
    if let Err(e) = authz::require(&actor, &Permission::PRODUCTS_READ_OWN) {
        return errors::authz_error_to_response(e);
    }
    let owned: Vec<Product> = services
        .products()
        .into_iter()
        .filter(|p| p.is_owned_by(actor.actor_id()))
        .collect();
    let views: Vec<ProductResponse> = query::newest_first(owned).iter().map(full_view).collect();
    Json(views).into_response()
}

/// POST /products
async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Response {
    let product_id = ProductId::generate();
    let cmd = CmdAuth::new(
        ProductCommand::CreateProduct(CreateProduct {
            product_id,
            actor: actor.actor(),
            details: body.into_details(),
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_CREATE,
    );
    execute(&services, &actor, cmd, StatusCode::CREATED)
}

/// PUT /products/:id
async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateProductRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::UpdateProduct(UpdateProduct {
            product_id,
            actor: actor.actor(),
            patch: body.into_patch(),
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_UPDATE,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// DELETE /products/:id
async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::DeleteProduct(DeleteProduct {
            product_id,
            actor: actor.actor(),
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_DELETE,
    );
    if let Err(e) = authz::authorize_command(&actor, &cmd) {
        return errors::authz_error_to_response(e);
    }
    match services.dispatch::<Product>(product_id.aggregate_id(), cmd.inner) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// PUT /products/discount/add
async fn apply_discount(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    ApiJson(body): ApiJson<ApplyDiscountRequest>,
) -> Response {
    let product_id = match parse_product_id(&body.product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::ApplyDiscount(ApplyDiscount {
            product_id,
            actor: actor.actor(),
            percentage: body.percentage,
            expires_at: body.expires_at,
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_DISCOUNT,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// PUT /products/discount/remove/:id
async fn remove_discount(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::RemoveDiscount(RemoveDiscount {
            product_id,
            actor: actor.actor(),
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_DISCOUNT,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// POST /products/:id/images
async fn attach_image(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ImageRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::AttachImage(AttachImage {
            product_id,
            actor: actor.actor(),
            url: body.url,
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_IMAGES,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// DELETE /products/:id/images
async fn detach_image(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ImageRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::DetachImage(DetachImage {
            product_id,
            actor: actor.actor(),
            url: body.url,
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_IMAGES,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin moderation
// ─────────────────────────────────────────────────────────────────────────────

/// GET /products/admin/all (every status, newest first)
async fn admin_list_all(Extension(services): Extension<Arc<AppServices>>, actor: ActorContext) -> Response {
    if let Err(e) = authz::require(&actor, &Permission::PRODUCTS_READ_ALL) {
        return errors::authz_error_to_response(e);
    }
    let views: Vec<ProductResponse> = query::newest_first(services.products()).iter().map(full_view).collect();
    Json(views).into_response()
}

/// GET /products/admin/stats
async fn admin_stats(Extension(services): Extension<Arc<AppServices>>, actor: ActorContext) -> Response {
    if let Err(e) = authz::require(&actor, &Permission::PRODUCTS_READ_ALL) {
        return errors::authz_error_to_response(e);
    }
    let products = services.products();
    Json(CatalogStats::collect(&products, Utc::now())).into_response()
}

/// PUT /products/admin/all/:id/review
async fn review_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::ReviewProduct(ReviewProduct {
            product_id,
            actor: actor.actor(),
            decision: body.decision,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_MODERATE,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// PUT /products/admin/all/:id/flag
async fn flag_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<FlagRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::FlagProduct(FlagProduct {
            product_id,
            actor: actor.actor(),
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_MODERATE,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}

/// PUT /products/admin/all/:id/unflag
async fn unflag_product(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        ProductCommand::UnflagProduct(UnflagProduct {
            product_id,
            actor: actor.actor(),
            occurred_at: Utc::now(),
        }),
        Permission::PRODUCTS_MODERATE,
    );
    execute(&services, &actor, cmd, StatusCode::OK)
}
