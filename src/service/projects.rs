use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Project, User, UserType};

/// A project with request and conversation counts keyed by status.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub requests_by_status: BTreeMap<&'static str, i64>,
    pub conversations_by_status: BTreeMap<&'static str, i64>,
}

pub fn create(
    store: &dyn Store,
    actor: &User,
    name: String,
    description: Option<String>,
) -> Result<Project> {
    if actor.user_type != UserType::Client {
        return Err(Error::forbidden("Only clients can create projects"));
    }

    let now = Utc::now();
    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: actor.id.clone(),
        name,
        description,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_project(&project)?;

    tracing::info!(id = %project.id, owner = %actor.id, "Created project");
    Ok(project)
}

pub fn get(store: &dyn Store, actor: &User, id: &str) -> Result<Project> {
    let project = store
        .get_project(id)?
        .ok_or_else(|| Error::not_found("Project not found"))?;
    if project.owner_id != actor.id {
        return Err(Error::forbidden("Not authorized to view this project"));
    }
    Ok(project)
}

pub fn summarize(store: &dyn Store, project: Project) -> Result<ProjectSummary> {
    let requests_by_status = store
        .count_project_requests_by_status(&project.id)?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    let conversations_by_status = store
        .count_project_conversations_by_status(&project.id)?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();

    Ok(ProjectSummary {
        project,
        requests_by_status,
        conversations_by_status,
    })
}

pub fn list(store: &dyn Store, actor: &User) -> Result<Vec<ProjectSummary>> {
    store
        .list_user_projects(&actor.id)?
        .into_iter()
        .map(|project| summarize(store, project))
        .collect()
}
