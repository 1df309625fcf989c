//! Notes and requests: creation, patching, visibility, sharing and listing.
//!
//! A resource that contains sensitive data is never public. Every write path
//! here checks that before it reaches the store, and the schema rejects the
//! combination as a last line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::{self, require_edit, require_owner, require_read};
use super::sensitive::classify;
use crate::error::{Error, Result};
use crate::store::{OwnedResourceFilter, Store};
use crate::types::{Access, Lifecycle, RequestStatus, Resource, ResourceKind, ShareGrant, User};

#[derive(Debug, Clone)]
pub struct NewResource {
    pub kind: ResourceKind,
    pub title: String,
    pub body: String,
    pub is_public: bool,
    pub project_id: Option<String>,
    pub estimated_budget: Option<f64>,
}

impl NewResource {
    pub fn note(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Note,
            title: title.into(),
            body: body.into(),
            is_public: false,
            project_id: None,
            estimated_budget: None,
        }
    }

    pub fn request(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Request,
            ..Self::note(title, body)
        }
    }
}

/// Partial update. `contains_sensitive_data` is deliberately absent: it is
/// only ever derived from the body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub is_public: Option<bool>,
    pub status: Option<RequestStatus>,
    pub estimated_budget: Option<f64>,
}

/// A resource as seen by a grantee.
#[derive(Debug, Clone, Serialize)]
pub struct SharedResource {
    #[serde(flatten)]
    pub resource: Resource,
    pub can_edit: bool,
    pub shared_at: DateTime<Utc>,
    /// True until the grantee first opens it.
    pub is_new: bool,
}

fn load(store: &dyn Store, kind: ResourceKind, id: &str) -> Result<Resource> {
    store
        .get_resource(id)?
        .filter(|r| r.kind == kind)
        .ok_or_else(|| Error::not_found(format!("{} not found", kind.label())))
}

fn validate_budget(kind: ResourceKind, budget: Option<f64>) -> Result<()> {
    match budget {
        Some(_) if kind != ResourceKind::Request => {
            Err(Error::bad_request("Only requests carry an estimated budget"))
        }
        Some(b) if !b.is_finite() || b < 0.0 => {
            Err(Error::bad_request("Estimated budget must be a non-negative amount"))
        }
        _ => Ok(()),
    }
}

/// Persists `updated` only if nobody else wrote the resource since `seen`.
fn save(store: &dyn Store, mut updated: Resource, seen: DateTime<Utc>) -> Result<Resource> {
    if updated.is_public && updated.contains_sensitive_data {
        return Err(Error::bad_request("cannot make public: sensitive data"));
    }

    updated.updated_at = Utc::now();
    if !store.update_resource(&updated, &seen)? {
        return Err(Error::conflict(format!(
            "{} was modified concurrently, reload and retry",
            updated.kind.label()
        )));
    }
    Ok(updated)
}

fn check_project(store: &dyn Store, actor: &User, project_id: &str) -> Result<()> {
    let project = store
        .get_project(project_id)?
        .ok_or_else(|| Error::not_found("Project not found"))?;

    if project.owner_id != actor.id {
        return Err(Error::forbidden("Not authorized to add content to this project"));
    }
    if !project.is_active {
        return Err(Error::bad_request("Project is archived"));
    }
    Ok(())
}

pub fn create(store: &dyn Store, actor: &User, new: NewResource) -> Result<Resource> {
    validate_budget(new.kind, new.estimated_budget)?;

    let contains_sensitive_data = classify(&new.body);
    if new.is_public && contains_sensitive_data {
        return Err(Error::bad_request(format!(
            "Cannot create a public {} containing sensitive data",
            new.kind
        )));
    }

    if let Some(project_id) = &new.project_id {
        check_project(store, actor, project_id)?;
    }

    let now = Utc::now();
    let resource = Resource {
        id: uuid::Uuid::new_v4().to_string(),
        kind: new.kind,
        owner_id: actor.id.clone(),
        title: new.title,
        body: new.body,
        is_public: new.is_public,
        contains_sensitive_data,
        added_to_project_at: new.project_id.as_ref().map(|_| now),
        project_id: new.project_id,
        status: (new.kind == ResourceKind::Request).then_some(RequestStatus::Open),
        estimated_budget: new.estimated_budget,
        created_at: now,
        updated_at: now,
    };

    store.create_resource(&resource)?;
    tracing::info!(
        kind = %resource.kind,
        id = %resource.id,
        owner = %actor.id,
        sensitive = resource.contains_sensitive_data,
        "Created resource"
    );
    Ok(resource)
}

/// Fetches a resource the actor may read, with the rights they hold on it.
/// A grantee opening a shared resource stamps the grant as viewed.
pub fn get(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
) -> Result<(Resource, Access)> {
    let resource = load(store, kind, id)?;
    let access = require_read(store, &resource, &actor.id)?;

    if resource.owner_id != actor.id {
        if let Err(e) = store.mark_share_viewed(&resource.id, &actor.id) {
            tracing::warn!(id = %resource.id, user = %actor.id, "Failed to mark share viewed: {}", e);
        }
    }

    Ok((resource, access))
}

pub fn update(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    patch: ResourcePatch,
) -> Result<Resource> {
    let current = load(store, kind, id)?;
    require_edit(store, &current, &actor.id)?;

    let seen = current.updated_at;
    let was_public = current.is_public;
    let mut updated = current;

    if let Some(title) = patch.title {
        updated.title = title;
    }

    let body_changed = patch.body.is_some();
    if let Some(body) = patch.body {
        updated.contains_sensitive_data = classify(&body);
        updated.body = body;
    }

    if let Some(is_public) = patch.is_public {
        updated.is_public = is_public;
    }

    if let Some(next) = patch.status {
        let current_status = updated
            .status
            .ok_or_else(|| Error::bad_request(format!("A {} has no status", kind)))?;
        if !current_status.can_transition_to(next) {
            return Err(Error::bad_request(format!(
                "Invalid status transition from {current_status} to {next}"
            )));
        }
        updated.status = Some(next);
    }

    if patch.estimated_budget.is_some() {
        validate_budget(kind, patch.estimated_budget)?;
        updated.estimated_budget = patch.estimated_budget;
    }

    if updated.is_public && updated.contains_sensitive_data {
        let message = if body_changed && was_public && patch.is_public.is_none() {
            "cannot keep public: now contains sensitive data"
        } else {
            "cannot make public: sensitive data"
        };
        return Err(Error::bad_request(message));
    }

    let saved = save(store, updated, seen)?;
    tracing::info!(kind = %kind, id = %saved.id, user = %actor.id, "Updated resource");
    Ok(saved)
}

/// Toggles `is_public`. Does not re-scan the body.
pub fn set_visibility(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    is_public: bool,
) -> Result<Resource> {
    let current = load(store, kind, id)?;
    require_edit(store, &current, &actor.id)?;

    if is_public && current.contains_sensitive_data {
        return Err(Error::bad_request("cannot make public: sensitive data"));
    }

    let seen = current.updated_at;
    let mut updated = current;
    updated.is_public = is_public;

    let saved = save(store, updated, seen)?;
    tracing::info!(kind = %kind, id = %saved.id, is_public, "Changed visibility");
    Ok(saved)
}

/// Places a resource into one of the owner's projects, or removes it with `None`.
pub fn set_project(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    project_id: Option<&str>,
) -> Result<Resource> {
    let current = load(store, kind, id)?;
    require_owner(&current, &actor.id, "move")?;

    if let Some(project_id) = project_id {
        check_project(store, actor, project_id)?;
    }

    let seen = current.updated_at;
    let mut updated = current;
    updated.added_to_project_at = project_id.map(|_| Utc::now());
    updated.project_id = project_id.map(str::to_string);

    let saved = save(store, updated, seen)?;
    tracing::info!(kind = %kind, id = %saved.id, project = ?saved.project_id, "Moved resource");
    Ok(saved)
}

pub fn delete(store: &dyn Store, actor: &User, kind: ResourceKind, id: &str) -> Result<()> {
    let resource = load(store, kind, id)?;
    require_owner(&resource, &actor.id, "delete")?;

    if !store.delete_resource(&resource.id)? {
        return Err(Error::not_found(format!("{} not found", kind.label())));
    }
    tracing::info!(kind = %kind, id = %resource.id, "Deleted resource");
    Ok(())
}

pub fn create_share(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    grantee_id: &str,
    can_edit: bool,
) -> Result<ShareGrant> {
    let resource = load(store, kind, id)?;
    require_owner(&resource, &actor.id, "share")?;

    if grantee_id == actor.id {
        return Err(Error::bad_request(format!("Cannot share a {kind} with yourself")));
    }

    let grantee = store
        .get_user(grantee_id)?
        .ok_or_else(|| Error::not_found("User not found"))?;
    if !grantee.is_active {
        return Err(Error::bad_request("Cannot share with a deactivated user"));
    }

    if store.get_share(&resource.id, grantee_id)?.is_some() {
        return Err(Error::conflict(format!(
            "{} is already shared with this user",
            kind.label()
        )));
    }

    if resource.contains_sensitive_data {
        return Err(Error::bad_request(format!(
            "Cannot share a {kind} containing sensitive data"
        )));
    }

    let grant = ShareGrant {
        resource_id: resource.id.clone(),
        grantee_id: grantee_id.to_string(),
        can_edit,
        created_at: Utc::now(),
        viewed_at: None,
    };
    store.create_share(&grant)?;

    tracing::info!(kind = %kind, id = %resource.id, grantee = %grantee_id, can_edit, "Shared resource");
    Ok(grant)
}

/// Changes `can_edit` on an existing grant.
pub fn update_share(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    grantee_id: &str,
    can_edit: bool,
) -> Result<ShareGrant> {
    let resource = load(store, kind, id)?;
    require_owner(&resource, &actor.id, "share")?;

    if !store.update_share(&resource.id, grantee_id, can_edit)? {
        return Err(Error::not_found("Share not found"));
    }

    tracing::info!(kind = %kind, id = %resource.id, grantee = %grantee_id, can_edit, "Updated share");
    store
        .get_share(&resource.id, grantee_id)?
        .ok_or_else(|| Error::not_found("Share not found"))
}

/// Revokes a grant. Revoking a grant that does not exist is a no-op and
/// returns `None`.
pub fn remove_share(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
    grantee_id: &str,
) -> Result<Option<ShareGrant>> {
    let resource = load(store, kind, id)?;
    require_owner(&resource, &actor.id, "unshare")?;

    let Some(grant) = store.get_share(&resource.id, grantee_id)? else {
        return Ok(None);
    };
    if !store.delete_share(&resource.id, grantee_id)? {
        return Ok(None);
    }

    tracing::info!(kind = %kind, id = %resource.id, grantee = %grantee_id, "Revoked share");
    Ok(Some(grant))
}

/// Grants on a resource, visible to anyone who can edit it.
pub fn list_shares(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    id: &str,
) -> Result<Vec<ShareGrant>> {
    let resource = load(store, kind, id)?;
    require_edit(store, &resource, &actor.id)?;
    store.list_resource_shares(&resource.id)
}

pub fn list_owned(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
    project_id: Option<&str>,
    cursor: &str,
    limit: i32,
) -> Result<Vec<Resource>> {
    let filter = OwnedResourceFilter {
        kind: Some(kind),
        project_id,
    };
    store.list_owned_resources(&actor.id, &filter, cursor, limit)
}

pub fn list_shared_with(
    store: &dyn Store,
    actor: &User,
    kind: ResourceKind,
) -> Result<Vec<SharedResource>> {
    Ok(store
        .list_shared_resources(&actor.id, Some(kind))?
        .into_iter()
        .map(|(resource, grant)| SharedResource {
            resource,
            can_edit: grant.can_edit,
            shared_at: grant.created_at,
            is_new: grant.viewed_at.is_none(),
        })
        .collect())
}

pub fn list_public(
    store: &dyn Store,
    kind: ResourceKind,
    cursor: &str,
    limit: i32,
) -> Result<Vec<Resource>> {
    store.list_public_resources(kind, cursor, limit)
}

/// True if the actor may read the resource; used by other services that
/// need the read rule without the side effects of [`get`].
pub(crate) fn readable(store: &dyn Store, resource: &Resource, actor: &User) -> Result<bool> {
    access::can_read(store, resource, &actor.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{open_store, seed_user};
    use crate::types::UserType;

    #[test]
    fn test_sensitive_note_cannot_be_published() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);

        let note = create(&store, &owner, NewResource::note("Keys", "my api_key is 12345"))
            .unwrap();
        assert!(note.contains_sensitive_data);
        assert!(!note.is_public);

        let err = set_visibility(&store, &owner, ResourceKind::Note, &note.id, true).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref m) if m.contains("sensitive")));

        let stored = store.get_resource(&note.id).unwrap().unwrap();
        assert!(!stored.is_public);
    }

    #[test]
    fn test_public_create_with_sensitive_body_rejected() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);

        let mut new = NewResource::note("Setup", "the password is swordfish");
        new.is_public = true;
        assert!(matches!(create(&store, &owner, new), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_editing_public_body_into_sensitive_requires_unpublishing() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);

        let mut new = NewResource::note("Readme", "Hello world");
        new.is_public = true;
        let note = create(&store, &owner, new).unwrap();

        let patch = ResourcePatch {
            body: Some("our secret sauce".to_string()),
            ..Default::default()
        };
        let err = update(&store, &owner, ResourceKind::Note, &note.id, patch).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref m) if m.contains("cannot keep public")));

        // Nothing persisted
        let stored = store.get_resource(&note.id).unwrap().unwrap();
        assert!(stored.is_public);
        assert!(!stored.contains_sensitive_data);
        assert_eq!(stored.body, "Hello world");

        let patch = ResourcePatch {
            body: Some("our secret sauce".to_string()),
            is_public: Some(false),
            ..Default::default()
        };
        let updated = update(&store, &owner, ResourceKind::Note, &note.id, patch).unwrap();
        assert!(!updated.is_public);
        assert!(updated.contains_sensitive_data);
    }

    #[test]
    fn test_cleaning_body_allows_publishing_again() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);

        let note = create(&store, &owner, NewResource::note("Creds", "token=abc")).unwrap();
        let patch = ResourcePatch {
            body: Some("nothing to see".to_string()),
            is_public: Some(true),
            ..Default::default()
        };
        let updated = update(&store, &owner, ResourceKind::Note, &note.id, patch).unwrap();
        assert!(updated.is_public);
        assert!(!updated.contains_sensitive_data);
    }

    #[test]
    fn test_request_status_follows_table() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let req = create(&store, &owner, NewResource::request("Site", "Need a site")).unwrap();
        assert_eq!(req.status, Some(RequestStatus::Open));

        let to = |status| ResourcePatch {
            status: Some(status),
            ..Default::default()
        };
        assert!(matches!(
            update(&store, &owner, ResourceKind::Request, &req.id, to(RequestStatus::Completed)),
            Err(Error::BadRequest(_))
        ));
        update(&store, &owner, ResourceKind::Request, &req.id, to(RequestStatus::InProgress))
            .unwrap();
        let done =
            update(&store, &owner, ResourceKind::Request, &req.id, to(RequestStatus::Completed))
                .unwrap();
        assert_eq!(done.status, Some(RequestStatus::Completed));
        assert!(matches!(
            update(&store, &owner, ResourceKind::Request, &req.id, to(RequestStatus::Cancelled)),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_notes_reject_status_and_budget() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let note = create(&store, &owner, NewResource::note("Idea", "Later")).unwrap();

        let patch = ResourcePatch {
            status: Some(RequestStatus::InProgress),
            ..Default::default()
        };
        assert!(update(&store, &owner, ResourceKind::Note, &note.id, patch).is_err());

        let mut new = NewResource::note("Idea", "Later");
        new.estimated_budget = Some(10.0);
        assert!(matches!(create(&store, &owner, new), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_kind_mismatch_is_not_found() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let note = create(&store, &owner, NewResource::note("Idea", "Later")).unwrap();

        assert!(matches!(
            get(&store, &owner, ResourceKind::Request, &note.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_share_rules() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);
        let other = seed_user(&store, "carol", UserType::Developer);

        let note = create(&store, &owner, NewResource::note("Plan", "Q3 goals")).unwrap();

        assert!(matches!(
            create_share(&store, &dev, ResourceKind::Note, &note.id, &other.id, false),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            create_share(&store, &owner, ResourceKind::Note, &note.id, &owner.id, false),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            create_share(&store, &owner, ResourceKind::Note, &note.id, "nobody", false),
            Err(Error::NotFound(_))
        ));

        create_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, false).unwrap();
        assert!(matches!(
            create_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, true),
            Err(Error::Conflict(_))
        ));

        let grant =
            update_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, true).unwrap();
        assert!(grant.can_edit);
        assert_eq!(store.list_resource_shares(&note.id).unwrap().len(), 1);
    }

    #[test]
    fn test_sensitive_resource_cannot_be_shared() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);

        let note = create(&store, &owner, NewResource::note("Env", "SECRET=1")).unwrap();
        assert!(matches!(
            create_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, false),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_remove_share_twice_is_noop() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);

        let note = create(&store, &owner, NewResource::note("Plan", "Q3 goals")).unwrap();
        create_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, false).unwrap();

        let first = remove_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id).unwrap();
        assert!(first.is_some());
        let second = remove_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id).unwrap();
        assert!(second.is_none());

        assert!(matches!(
            remove_share(&store, &dev, ResourceKind::Note, &note.id, &dev.id),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_shared_listing_tracks_viewed() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);

        let req = create(&store, &owner, NewResource::request("App", "Mobile app")).unwrap();
        create_share(&store, &owner, ResourceKind::Request, &req.id, &dev.id, false).unwrap();

        let shared = list_shared_with(&store, &dev, ResourceKind::Request).unwrap();
        assert_eq!(shared.len(), 1);
        assert!(shared[0].is_new);

        get(&store, &dev, ResourceKind::Request, &req.id).unwrap();

        let shared = list_shared_with(&store, &dev, ResourceKind::Request).unwrap();
        assert!(!shared[0].is_new);
        assert!(list_shared_with(&store, &dev, ResourceKind::Note).unwrap().is_empty());
    }

    #[test]
    fn test_editor_can_patch_but_not_delete() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);

        let note = create(&store, &owner, NewResource::note("Plan", "v1")).unwrap();
        create_share(&store, &owner, ResourceKind::Note, &note.id, &dev.id, true).unwrap();

        let patch = ResourcePatch {
            body: Some("v2".to_string()),
            ..Default::default()
        };
        let updated = update(&store, &dev, ResourceKind::Note, &note.id, patch).unwrap();
        assert_eq!(updated.body, "v2");

        assert!(matches!(
            delete(&store, &dev, ResourceKind::Note, &note.id),
            Err(Error::Forbidden(_))
        ));
        delete(&store, &owner, ResourceKind::Note, &note.id).unwrap();
        assert!(store.get_resource(&note.id).unwrap().is_none());
    }

    #[test]
    fn test_public_listing_excludes_private() {
        let (_temp, store) = open_store();
        let owner = seed_user(&store, "alice", UserType::Client);

        let mut open = NewResource::request("Public job", "Open to all");
        open.is_public = true;
        create(&store, &owner, open).unwrap();
        create(&store, &owner, NewResource::request("Private job", "Hidden")).unwrap();

        let listed = list_public(&store, ResourceKind::Request, "", 50).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Public job");
    }
}
