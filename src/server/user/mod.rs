mod agreements;
mod conversations;
mod projects;
mod resources;
mod shares;
mod users;

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post, put},
};

use crate::server::AppState;
use crate::types::ResourceKind;

/// Notes and requests expose the same routes; the kind rides along as an
/// extension.
fn resource_routes(kind: ResourceKind) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(resources::list_resources).post(resources::create_resource),
        )
        .route("/shared", get(resources::list_shared_resources))
        .route("/public", get(resources::list_public_resources))
        .route(
            "/{id}",
            get(resources::get_resource)
                .patch(resources::update_resource)
                .delete(resources::delete_resource),
        )
        .route("/{id}/visibility", put(resources::set_visibility))
        .route("/{id}/project", put(resources::set_project))
        .route(
            "/{id}/shares",
            get(shares::list_shares).post(shares::create_share),
        )
        .route(
            "/{id}/shares/{grantee_id}",
            axum::routing::patch(shares::update_share).delete(shares::remove_share),
        )
        .layer(Extension(kind))
}

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Account
        .route("/me", get(users::current_user))
        .route("/users/search", get(users::search_users))
        // Shareable content
        .nest("/notes", resource_routes(ResourceKind::Note))
        .nest("/requests", resource_routes(ResourceKind::Request))
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/{id}", get(projects::get_project))
        // Conversations
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route("/conversations/{id}", get(conversations::get_conversation))
        .route(
            "/conversations/{id}/status",
            put(conversations::update_status),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversations::list_messages).post(conversations::post_message),
        )
        // Agreements
        .route(
            "/agreements",
            get(agreements::get_agreement_by_request).post(agreements::propose_agreement),
        )
        .route("/agreements/{id}", get(agreements::get_agreement))
        .route("/agreements/{id}/accept", post(agreements::accept_agreement))
}
