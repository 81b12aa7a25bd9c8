use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::get;
use axum::Router;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::handlers::{contact_list, contacts, groups, health, members, phones};
use crate::AppState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Tags each request without an inbound `x-request-id` with a fresh UUID.
#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/contacts",
            get(contacts::list_contacts_handler).post(contacts::create_contact_handler),
        )
        .route(
            "/contacts/:contact_id",
            get(contacts::get_contact_handler)
                .put(contacts::update_contact_handler)
                .delete(contacts::delete_contact_handler),
        )
        .route(
            "/contacts/:contact/phone-numbers",
            get(phones::list_phones_handler).post(phones::create_phone_handler),
        )
        .route(
            "/contacts/:contact/phone-numbers/:phone_id",
            get(phones::get_phone_handler)
                .put(phones::update_phone_handler)
                .delete(phones::delete_phone_handler),
        )
        .route(
            "/contacts/:contact/contact-list",
            get(contact_list::list_contact_list_handler)
                .post(contact_list::add_to_contact_list_handler),
        )
        .route(
            "/contacts/:contact/contact-list/:contact_id",
            get(contact_list::get_contact_list_entry_handler)
                .put(contact_list::star_contact_handler)
                .delete(contact_list::remove_from_contact_list_handler),
        )
        .route(
            "/groups",
            get(groups::list_groups_handler).post(groups::create_group_handler),
        )
        .route(
            "/groups/:group_id",
            get(groups::get_group_handler)
                .put(groups::update_group_handler)
                .delete(groups::delete_group_handler),
        )
        .route(
            "/groups/:group_id/contacts",
            get(members::list_members_handler).post(members::add_member_handler),
        )
        .route(
            "/groups/:group_id/contacts/:contact_id",
            get(members::get_member_handler)
                .put(members::update_member_handler)
                .delete(members::remove_member_handler),
        )
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(trace)
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
}

/// The router with trailing slashes trimmed before routing, so `/groups/`
/// and `/groups` reach the same handler.
pub fn build_app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state))
}
