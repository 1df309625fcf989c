use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{NewSessionMessage, OwnedResourceFilter, Store};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .as_deref()
        .map(parse_datetime))
}

fn column_enum<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn column_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Only the `resources` public/sensitive rule is a CHECK constraint that
/// well-typed input can trip.
fn is_check_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
    )
}

const USER_COLUMNS: &str = "id, username, email, user_type, is_active, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        user_type: column_enum(row, 3)?,
        is_active: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at";

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: opt_datetime(row, 6)?,
        last_used_at: opt_datetime(row, 7)?,
    })
}

const PROJECT_COLUMNS: &str = "id, owner_id, name, description, is_active, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const RESOURCE_COLUMNS: &str = "r.id, r.kind, r.owner_id, r.title, r.body, r.is_public, \
     r.contains_sensitive_data, r.project_id, r.added_to_project_at, r.status, \
     r.estimated_budget, r.created_at, r.updated_at";

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let status = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(raw.parse::<RequestStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, Type::Text, e.into())
        })?),
        None => None,
    };

    Ok(Resource {
        id: row.get(0)?,
        kind: column_enum(row, 1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        is_public: row.get(5)?,
        contains_sensitive_data: row.get(6)?,
        project_id: row.get(7)?,
        added_to_project_at: opt_datetime(row, 8)?,
        status,
        estimated_budget: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?),
        updated_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}

const SHARE_COLUMNS: &str = "s.resource_id, s.grantee_id, s.can_edit, s.created_at, s.viewed_at";

/// Reads a share grant starting at column `base`.
fn share_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<ShareGrant> {
    Ok(ShareGrant {
        resource_id: row.get(base)?,
        grantee_id: row.get(base + 1)?,
        can_edit: row.get(base + 2)?,
        created_at: parse_datetime(&row.get::<_, String>(base + 3)?),
        viewed_at: opt_datetime(row, base + 4)?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, request_id, starter_id, recipient_id, status, created_at, updated_at";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        request_id: row.get(1)?,
        starter_id: row.get(2)?,
        recipient_id: row.get(3)?,
        status: column_enum(row, 4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn conversation_message_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationMessage> {
    Ok(ConversationMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

const AGREEMENT_COLUMNS: &str = "id, request_id, developer_id, client_id, price, terms, status, \
     proposed_by, proposed_at, agreement_date";

fn agreement_from_row(row: &Row<'_>) -> rusqlite::Result<Agreement> {
    Ok(Agreement {
        id: row.get(0)?,
        request_id: row.get(1)?,
        developer_id: row.get(2)?,
        client_id: row.get(3)?,
        price: row.get(4)?,
        terms: row.get(5)?,
        status: column_enum(row, 6)?,
        proposed_by: row.get(7)?,
        proposed_at: parse_datetime(&row.get::<_, String>(8)?),
        agreement_date: opt_datetime(row, 9)?,
    })
}

fn insert_negotiation_entry(conn: &Connection, entry: &NegotiationEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO agreement_history (agreement_id, seq, action, actor_id, timestamp, price, terms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.agreement_id,
            entry.seq,
            entry.action.as_str(),
            entry.actor_id,
            format_datetime(&entry.timestamp),
            entry.price,
            entry.terms,
        ],
    )?;
    Ok(())
}

const SESSION_COLUMNS: &str = "id, external_ticket_id, source_system, status, metadata, \
     created_at, updated_at, resolved_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<CollaborationSession> {
    Ok(CollaborationSession {
        id: row.get(0)?,
        external_ticket_id: row.get(1)?,
        source_system: row.get(2)?,
        status: column_enum(row, 3)?,
        metadata: column_json(row, 4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
        resolved_at: opt_datetime(row, 7)?,
    })
}

const PARTICIPANT_COLUMNS: &str =
    "id, session_id, user_id, email, display_name, role, last_viewed_at, created_at";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        email: row.get(3)?,
        display_name: row.get(4)?,
        role: row.get::<_, String>(5)?.into(),
        last_viewed_at: opt_datetime(row, 6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn insert_participant(conn: &Connection, p: &Participant) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO collaboration_participants
             (id, session_id, user_id, email, display_name, role, last_viewed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            p.id,
            p.session_id,
            p.user_id,
            p.email,
            p.display_name,
            p.role.as_str(),
            p.last_viewed_at.as_ref().map(format_datetime),
            format_datetime(&p.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::conflict(format!(
            "'{}' is already a participant in this session",
            p.email
        ))),
        Err(e) => Err(Error::from(e)),
    }
}

const SESSION_MESSAGE_COLUMNS: &str =
    "id, session_id, participant_id, content, message_type, metadata, is_system, created_at";

fn session_message_from_row(row: &Row<'_>) -> rusqlite::Result<SessionMessage> {
    Ok(SessionMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        participant_id: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        metadata: column_json(row, 5)?,
        is_system: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn insert_session_message(conn: &Connection, m: &NewSessionMessage) -> Result<SessionMessage> {
    conn.execute(
        "INSERT INTO collaboration_messages
             (session_id, participant_id, content, message_type, metadata, is_system, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            m.session_id,
            m.participant_id,
            m.content,
            m.message_type,
            json_text(m.metadata.as_ref()),
            m.is_system,
            format_datetime(&m.created_at),
        ],
    )?;

    Ok(SessionMessage {
        id: conn.last_insert_rowid(),
        session_id: m.session_id.clone(),
        participant_id: m.participant_id.clone(),
        content: m.content.clone(),
        message_type: m.message_type.clone(),
        metadata: m.metadata.clone(),
        is_system: m.is_system,
        created_at: m.created_at,
    })
}

/// Rejects writes to a session that is missing or resolved.
fn ensure_session_writable(conn: &Connection, session_id: &str) -> Result<()> {
    let status: Option<SessionStatus> = conn
        .query_row(
            "SELECT status FROM collaboration_sessions WHERE id = ?1",
            params![session_id],
            |row| column_enum(row, 0),
        )
        .optional()?;

    match status {
        None => Err(Error::not_found("Session not found")),
        Some(SessionStatus::Resolved) => Err(Error::bad_request(
            "Cannot add content to a resolved session",
        )),
        Some(_) => Ok(()),
    }
}

const ATTACHMENT_COLUMNS: &str =
    "id, session_id, message_id, file_name, stored_path, content_type, size, sha256, created_at";

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        session_id: row.get(1)?,
        message_id: row.get(2)?,
        file_name: row.get(3)?,
        stored_path: row.get(4)?,
        content_type: row.get(5)?,
        size: row.get(6)?,
        sha256: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, email, user_type, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.username,
                user.email,
                user.user_type.as_str(),
                user.is_active,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::conflict(format!(
                "User '{}' or email '{}' already exists",
                user.username, user.email
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn search_users(&self, prefix: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE is_active = 1 AND username LIKE ?1 ESCAPE '\\'
             ORDER BY username LIMIT ?2"
        ))?;

        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("{escaped}%");

        let rows = stmt.query_map(params![pattern, limit], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_user_active(&self, id: &str, is_active: bool) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_active, format_datetime(&Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("User not found"));
        }
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![user_id], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()> {
        self.conn().execute(
            "INSERT INTO projects (id, owner_id, name, description, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.id,
                project.owner_id,
                project.name,
                project.description,
                project.is_active,
                format_datetime(&project.created_at),
                format_datetime(&project.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![owner_id], project_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_project_requests_by_status(
        &self,
        project_id: &str,
    ) -> Result<Vec<(RequestStatus, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM resources
             WHERE project_id = ?1 AND kind = 'request' AND status IS NOT NULL
             GROUP BY status",
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok((column_enum(row, 0)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_project_conversations_by_status(
        &self,
        project_id: &str,
    ) -> Result<Vec<(ConversationStatus, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.status, COUNT(*) FROM conversations c
             JOIN resources r ON r.id = c.request_id
             WHERE r.project_id = ?1
             GROUP BY c.status",
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok((column_enum(row, 0)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Resource operations

    fn create_resource(&self, resource: &Resource) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO resources (id, kind, owner_id, title, body, is_public, contains_sensitive_data,
                                    project_id, added_to_project_at, status, estimated_budget,
                                    created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                resource.id,
                resource.kind.as_str(),
                resource.owner_id,
                resource.title,
                resource.body,
                resource.is_public,
                resource.contains_sensitive_data,
                resource.project_id,
                resource.added_to_project_at.as_ref().map(format_datetime),
                resource.status.map(RequestStatus::as_str),
                resource.estimated_budget,
                format_datetime(&resource.created_at),
                format_datetime(&resource.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_check_violation(&e) => Err(Error::bad_request(
                "Content containing sensitive data cannot be made public",
            )),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources r WHERE r.id = ?1"),
            params![id],
            resource_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_resource(
        &self,
        resource: &Resource,
        expected_updated_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let result = self.conn().execute(
            "UPDATE resources SET title = ?1, body = ?2, is_public = ?3, contains_sensitive_data = ?4,
                                  project_id = ?5, added_to_project_at = ?6, status = ?7,
                                  estimated_budget = ?8, updated_at = ?9
             WHERE id = ?10 AND updated_at = ?11",
            params![
                resource.title,
                resource.body,
                resource.is_public,
                resource.contains_sensitive_data,
                resource.project_id,
                resource.added_to_project_at.as_ref().map(format_datetime),
                resource.status.map(RequestStatus::as_str),
                resource.estimated_budget,
                format_datetime(&resource.updated_at),
                resource.id,
                format_datetime(expected_updated_at),
            ],
        );

        match result {
            Ok(updated) => Ok(updated == 1),
            Err(e) if is_check_violation(&e) => Err(Error::bad_request(
                "Content containing sensitive data cannot be made public",
            )),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_resource(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM resources WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn list_owned_resources(
        &self,
        owner_id: &str,
        filter: &OwnedResourceFilter<'_>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Resource>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r
             WHERE r.owner_id = ?1
               AND (?2 IS NULL OR r.kind = ?2)
               AND (?3 IS NULL OR r.project_id = ?3)
               AND r.id > ?4
             ORDER BY r.id LIMIT ?5"
        ))?;

        let rows = stmt.query_map(
            params![
                owner_id,
                filter.kind.map(ResourceKind::as_str),
                filter.project_id,
                cursor,
                limit
            ],
            resource_from_row,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_shared_resources(
        &self,
        grantee_id: &str,
        kind: Option<ResourceKind>,
    ) -> Result<Vec<(Resource, ShareGrant)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS}, {SHARE_COLUMNS}
             FROM resource_shares s
             JOIN resources r ON r.id = s.resource_id
             WHERE s.grantee_id = ?1 AND (?2 IS NULL OR r.kind = ?2)
             ORDER BY s.created_at DESC"
        ))?;

        let rows = stmt.query_map(params![grantee_id, kind.map(ResourceKind::as_str)], |row| {
            Ok((resource_from_row(row)?, share_from_row(row, 13)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_public_resources(
        &self,
        kind: ResourceKind,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Resource>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r
             WHERE r.kind = ?1 AND r.is_public = 1 AND r.contains_sensitive_data = 0 AND r.id > ?2
             ORDER BY r.id LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![kind.as_str(), cursor, limit], resource_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Share grant operations

    fn create_share(&self, grant: &ShareGrant) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO resource_shares (resource_id, grantee_id, can_edit, created_at, viewed_at)
             VALUES (?1, ?2, ?3, ?4, NULL)",
            params![
                grant.resource_id,
                grant.grantee_id,
                grant.can_edit,
                format_datetime(&grant.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(Error::conflict("Already shared with this user"))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_share(&self, resource_id: &str, grantee_id: &str) -> Result<Option<ShareGrant>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SHARE_COLUMNS} FROM resource_shares s
                 WHERE s.resource_id = ?1 AND s.grantee_id = ?2"
            ),
            params![resource_id, grantee_id],
            |row| share_from_row(row, 0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_share(&self, resource_id: &str, grantee_id: &str, can_edit: bool) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE resource_shares SET can_edit = ?1 WHERE resource_id = ?2 AND grantee_id = ?3",
            params![can_edit, resource_id, grantee_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_share(&self, resource_id: &str, grantee_id: &str) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM resource_shares WHERE resource_id = ?1 AND grantee_id = ?2",
            params![resource_id, grantee_id],
        )?;
        Ok(deleted > 0)
    }

    fn list_resource_shares(&self, resource_id: &str) -> Result<Vec<ShareGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS} FROM resource_shares s
             WHERE s.resource_id = ?1 ORDER BY s.created_at"
        ))?;

        let rows = stmt.query_map(params![resource_id], |row| share_from_row(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn mark_share_viewed(&self, resource_id: &str, grantee_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE resource_shares SET viewed_at = ?1 WHERE resource_id = ?2 AND grantee_id = ?3",
            params![format_datetime(&Utc::now()), resource_id, grantee_id],
        )?;
        Ok(())
    }

    // Conversation operations

    fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO conversations
                 (id, request_id, starter_id, recipient_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation.id,
                conversation.request_id,
                conversation.starter_id,
                conversation.recipient_id,
                conversation.status.as_str(),
                format_datetime(&conversation.created_at),
                format_datetime(&conversation.updated_at),
            ],
        )?;

        conn.query_row(
            &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE request_id = ?1 AND starter_id = ?2 AND recipient_id = ?3"
            ),
            params![
                conversation.request_id,
                conversation.starter_id,
                conversation.recipient_id
            ],
            conversation_from_row,
        )
        .map_err(Error::from)
    }

    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            conversation_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_conversations(
        &self,
        user_id: &str,
        request_id: Option<&str>,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE (starter_id = ?1 OR recipient_id = ?1) AND (?2 IS NULL OR request_id = ?2)
             ORDER BY updated_at DESC, id"
        ))?;

        let rows = stmt.query_map(params![user_id, request_id], conversation_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn transition_conversation_status(
        &self,
        id: &str,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), format_datetime(&Utc::now()), id, from.as_str()],
        )?;
        Ok(updated == 1)
    }

    fn create_conversation_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<ConversationMessage> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO conversation_messages (conversation_id, author_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, author_id, content, format_datetime(&now)],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&now), conversation_id],
        )?;

        tx.commit()?;
        Ok(ConversationMessage {
            id,
            conversation_id: conversation_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    fn list_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, author_id, content, created_at
             FROM conversation_messages WHERE conversation_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![conversation_id], conversation_message_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Agreement operations

    fn create_agreement(&self, agreement: &Agreement, proposal: &NegotiationEntry) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            "INSERT INTO agreements (id, request_id, developer_id, client_id, price, terms, status,
                                     proposed_by, proposed_at, agreement_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
            params![
                agreement.id,
                agreement.request_id,
                agreement.developer_id,
                agreement.client_id,
                agreement.price,
                agreement.terms,
                agreement.status.as_str(),
                agreement.proposed_by,
                format_datetime(&agreement.proposed_at),
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::conflict("An agreement already exists for this request"));
            }
            Err(e) => return Err(Error::from(e)),
        }

        insert_negotiation_entry(&tx, proposal)?;
        tx.commit()?;
        Ok(())
    }

    fn get_agreement(&self, id: &str) -> Result<Option<Agreement>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {AGREEMENT_COLUMNS} FROM agreements WHERE id = ?1"),
            params![id],
            agreement_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_agreement_by_request(&self, request_id: &str) -> Result<Option<Agreement>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {AGREEMENT_COLUMNS} FROM agreements WHERE request_id = ?1"),
            params![request_id],
            agreement_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn accept_agreement(
        &self,
        id: &str,
        acceptance: &NegotiationEntry,
        agreement_date: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE agreements SET status = ?1, agreement_date = ?2 WHERE id = ?3 AND status = ?4",
            params![
                AgreementStatus::Accepted.as_str(),
                format_datetime(&agreement_date),
                id,
                AgreementStatus::Proposed.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        insert_negotiation_entry(&tx, acceptance)?;
        tx.commit()?;
        Ok(true)
    }

    fn list_negotiation_history(&self, agreement_id: &str) -> Result<Vec<NegotiationEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT agreement_id, seq, action, actor_id, timestamp, price, terms
             FROM agreement_history WHERE agreement_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![agreement_id], |row| {
            Ok(NegotiationEntry {
                agreement_id: row.get(0)?,
                seq: row.get(1)?,
                action: column_enum(row, 2)?,
                actor_id: row.get(3)?,
                timestamp: parse_datetime(&row.get::<_, String>(4)?),
                price: row.get(5)?,
                terms: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Collaboration session operations

    fn create_session(&self, session: &CollaborationSession, creator: &Participant) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO collaboration_sessions
                 (id, external_ticket_id, source_system, status, metadata, created_at, updated_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.external_ticket_id,
                session.source_system,
                session.status.as_str(),
                json_text(session.metadata.as_ref()),
                format_datetime(&session.created_at),
                format_datetime(&session.updated_at),
                session.resolved_at.as_ref().map(format_datetime),
            ],
        )?;
        insert_participant(&tx, creator)?;

        tx.commit()?;
        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Option<CollaborationSession>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM collaboration_sessions WHERE id = ?1"),
            params![id],
            session_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn transition_session_status(
        &self,
        id: &str,
        from: SessionStatus,
        to: SessionStatus,
        audit: &NewSessionMessage,
    ) -> Result<Option<SessionMessage>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed_at = format_datetime(&audit.created_at);
        let resolved_at = (to == SessionStatus::Resolved).then(|| changed_at.clone());

        let updated = tx.execute(
            "UPDATE collaboration_sessions SET status = ?1, updated_at = ?2, resolved_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![to.as_str(), changed_at, resolved_at, id, from.as_str()],
        )?;
        if updated == 0 {
            return Ok(None);
        }

        let message = insert_session_message(&tx, audit)?;
        tx.commit()?;
        Ok(Some(message))
    }

    fn add_participant(&self, participant: &Participant) -> Result<()> {
        insert_participant(&self.conn(), participant)
    }

    fn get_participant(&self, id: &str) -> Result<Option<Participant>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PARTICIPANT_COLUMNS} FROM collaboration_participants WHERE id = ?1"),
            params![id],
            participant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_participant_by_email(
        &self,
        session_id: &str,
        email: &str,
    ) -> Result<Option<Participant>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM collaboration_participants
                 WHERE session_id = ?1 AND email = ?2"
            ),
            params![session_id, email],
            participant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_participant_by_user(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM collaboration_participants
                 WHERE session_id = ?1 AND user_id = ?2"
            ),
            params![session_id, user_id],
            participant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_participants(&self, session_id: &str) -> Result<Vec<Participant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM collaboration_participants
             WHERE session_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![session_id], participant_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn touch_participant(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE collaboration_participants SET last_viewed_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn create_session_message(
        &self,
        message: &NewSessionMessage,
        attachment_ids: &[String],
    ) -> Result<SessionMessage> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        ensure_session_writable(&tx, &message.session_id)?;
        let stored = insert_session_message(&tx, message)?;

        for attachment_id in attachment_ids {
            let linked = tx.execute(
                "UPDATE collaboration_attachments SET message_id = ?1
                 WHERE id = ?2 AND session_id = ?3 AND message_id IS NULL",
                params![stored.id, attachment_id, message.session_id],
            )?;
            if linked == 0 {
                return Err(Error::bad_request(format!(
                    "Attachment '{attachment_id}' is not an unattached upload in this session"
                )));
            }
        }

        tx.execute(
            "UPDATE collaboration_sessions SET updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&message.created_at), message.session_id],
        )?;

        tx.commit()?;
        Ok(stored)
    }

    fn list_session_messages(
        &self,
        session_id: &str,
        after_id: i64,
        limit: i32,
    ) -> Result<Vec<SessionMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_MESSAGE_COLUMNS} FROM collaboration_messages
             WHERE session_id = ?1 AND id > ?2 ORDER BY id LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![session_id, after_id, limit], session_message_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn create_attachment(&self, attachment: &Attachment) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        ensure_session_writable(&tx, &attachment.session_id)?;
        tx.execute(
            "INSERT INTO collaboration_attachments
                 (id, session_id, message_id, file_name, stored_path, content_type, size, sha256, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                attachment.id,
                attachment.session_id,
                attachment.message_id,
                attachment.file_name,
                attachment.stored_path,
                attachment.content_type,
                attachment.size,
                attachment.sha256,
                format_datetime(&attachment.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ATTACHMENT_COLUMNS} FROM collaboration_attachments WHERE id = ?1"),
            params![id],
            attachment_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_message_attachments(&self, message_id: i64) -> Result<Vec<Attachment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM collaboration_attachments
             WHERE message_id = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![message_id], attachment_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn user(id: &str, user_type: UserType) -> User {
        User {
            id: id.to_string(),
            username: format!("{id}-name"),
            email: format!("{id}@example.com"),
            user_type,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(id: &str, owner_id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            kind: ResourceKind::Request,
            owner_id: owner_id.to_string(),
            title: "Build a thing".to_string(),
            body: "Details".to_string(),
            is_public: false,
            contains_sensitive_data: false,
            project_id: None,
            added_to_project_at: None,
            status: Some(RequestStatus::Open),
            estimated_budget: Some(500.0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(id: &str) -> (CollaborationSession, Participant) {
        let now = Utc::now();
        let session = CollaborationSession {
            id: id.to_string(),
            external_ticket_id: 42,
            source_system: "helpdesk".to_string(),
            status: SessionStatus::Open,
            metadata: Some(serde_json::json!({"priority": "high"})),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let creator = Participant {
            id: format!("{id}-p1"),
            session_id: id.to_string(),
            user_id: None,
            email: "agent@example.com".to_string(),
            display_name: "Agent".to_string(),
            role: ParticipantRole::External("support_agent".to_string()),
            last_viewed_at: None,
            created_at: now,
        };
        (session, creator)
    }

    fn text_message(session_id: &str, participant_id: &str, content: &str) -> NewSessionMessage {
        NewSessionMessage {
            session_id: session_id.to_string(),
            participant_id: Some(participant_id.to_string()),
            content: content.to_string(),
            message_type: "text".to_string(),
            metadata: None,
            is_system: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = open_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "tokens",
            "projects",
            "resources",
            "resource_shares",
            "conversations",
            "conversation_messages",
            "agreements",
            "agreement_history",
            "collaboration_sessions",
            "collaboration_participants",
            "collaboration_messages",
            "collaboration_attachments",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_user_crud_and_duplicate_username() {
        let (_temp, store) = open_store();

        let alice = user("u-1", UserType::Client);
        store.create_user(&alice).unwrap();

        let fetched = store.get_user("u-1").unwrap().unwrap();
        assert_eq!(fetched.user_type, UserType::Client);
        assert!(fetched.is_active);

        let by_name = store.get_user_by_username("u-1-name").unwrap().unwrap();
        assert_eq!(by_name.id, "u-1");

        let mut dup = user("u-2", UserType::Developer);
        dup.username = alice.username.clone();
        assert!(matches!(store.create_user(&dup), Err(Error::Conflict(_))));

        let mut dup = user("u-3", UserType::Developer);
        dup.email = alice.email.clone();
        assert!(matches!(store.create_user(&dup), Err(Error::Conflict(_))));

        store.set_user_active("u-1", false).unwrap();
        assert!(!store.get_user("u-1").unwrap().unwrap().is_active);
    }

    #[test]
    fn test_search_users_escapes_wildcards() {
        let (_temp, store) = open_store();
        let mut a = user("u-1", UserType::Client);
        a.username = "ann_smith".to_string();
        let mut b = user("u-2", UserType::Client);
        b.username = "annasmith".to_string();
        store.create_user(&a).unwrap();
        store.create_user(&b).unwrap();

        let found = store.search_users("ann_", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "ann_smith");

        assert_eq!(store.search_users("ann", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_token_lookup_collision() {
        let (_temp, store) = open_store();

        let token = |id: &str| Token {
            id: id.to_string(),
            token_hash: format!("hash-{id}"),
            token_lookup: "lookup12".to_string(),
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token("token-1")).unwrap();

        let result = store.create_token(&token("token-2"));
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
        assert!(store.has_admin_token().unwrap());
    }

    #[test]
    fn test_public_sensitive_rejected_by_schema() {
        let (_temp, store) = open_store();
        store.create_user(&user("u-1", UserType::Client)).unwrap();

        let mut r = request("r-1", "u-1");
        r.is_public = true;
        r.contains_sensitive_data = true;
        assert!(matches!(store.create_resource(&r), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_other_resource_constraints_stay_database_errors() {
        let (_temp, store) = open_store();
        store.create_user(&user("u-1", UserType::Client)).unwrap();

        let mut orphan = request("r-1", "u-1");
        orphan.project_id = Some("no-such-project".to_string());
        assert!(matches!(store.create_resource(&orphan), Err(Error::Database(_))));

        store.create_resource(&request("r-2", "u-1")).unwrap();
        let read = store.get_resource("r-2").unwrap().unwrap();
        let mut moved = read.clone();
        moved.project_id = Some("no-such-project".to_string());
        assert!(matches!(
            store.update_resource(&moved, &read.updated_at),
            Err(Error::Database(_))
        ));

        let mut leaked = read.clone();
        leaked.is_public = true;
        leaked.contains_sensitive_data = true;
        assert!(matches!(
            store.update_resource(&leaked, &read.updated_at),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_update_resource_rejects_stale_version() {
        let (_temp, store) = open_store();
        store.create_user(&user("u-1", UserType::Client)).unwrap();
        store.create_resource(&request("r-1", "u-1")).unwrap();

        let read = store.get_resource("r-1").unwrap().unwrap();
        let seen = read.updated_at;

        let mut first = read.clone();
        first.title = "First".to_string();
        first.updated_at = seen + chrono::Duration::seconds(1);
        assert!(store.update_resource(&first, &seen).unwrap());

        let mut second = read;
        second.title = "Second".to_string();
        second.updated_at = seen + chrono::Duration::seconds(2);
        assert!(!store.update_resource(&second, &seen).unwrap());

        assert_eq!(store.get_resource("r-1").unwrap().unwrap().title, "First");
    }

    #[test]
    fn test_share_unique_per_grantee() {
        let (_temp, store) = open_store();
        store.create_user(&user("owner", UserType::Client)).unwrap();
        store.create_user(&user("dev", UserType::Developer)).unwrap();
        store.create_resource(&request("r-1", "owner")).unwrap();

        let grant = ShareGrant {
            resource_id: "r-1".to_string(),
            grantee_id: "dev".to_string(),
            can_edit: false,
            created_at: Utc::now(),
            viewed_at: None,
        };
        store.create_share(&grant).unwrap();
        assert!(matches!(store.create_share(&grant), Err(Error::Conflict(_))));

        assert!(store.update_share("r-1", "dev", true).unwrap());
        store.mark_share_viewed("r-1", "dev").unwrap();

        let shared = store.list_shared_resources("dev", None).unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].0.id, "r-1");
        assert!(shared[0].1.can_edit);
        assert!(shared[0].1.viewed_at.is_some());

        assert!(store.delete_share("r-1", "dev").unwrap());
        assert!(!store.delete_share("r-1", "dev").unwrap());
    }

    #[test]
    fn test_conversation_create_is_idempotent() {
        let (_temp, store) = open_store();
        store.create_user(&user("client", UserType::Client)).unwrap();
        store.create_user(&user("dev", UserType::Developer)).unwrap();
        store.create_resource(&request("r-1", "client")).unwrap();

        let now = Utc::now();
        let mut conv = Conversation {
            id: "c-1".to_string(),
            request_id: "r-1".to_string(),
            starter_id: "dev".to_string(),
            recipient_id: "client".to_string(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let first = store.create_conversation(&conv).unwrap();
        conv.id = "c-2".to_string();
        let second = store.create_conversation(&conv).unwrap();
        assert_eq!(first.id, "c-1");
        assert_eq!(second.id, "c-1");

        assert!(
            store
                .transition_conversation_status(
                    "c-1",
                    ConversationStatus::Active,
                    ConversationStatus::Negotiating
                )
                .unwrap()
        );
        // Stale expected status loses
        assert!(
            !store
                .transition_conversation_status(
                    "c-1",
                    ConversationStatus::Active,
                    ConversationStatus::Agreed
                )
                .unwrap()
        );
    }

    #[test]
    fn test_agreement_accept_only_once() {
        let (_temp, store) = open_store();
        store.create_user(&user("client", UserType::Client)).unwrap();
        store.create_user(&user("dev", UserType::Developer)).unwrap();
        store.create_resource(&request("r-1", "client")).unwrap();

        let now = Utc::now();
        let agreement = Agreement {
            id: "a-1".to_string(),
            request_id: "r-1".to_string(),
            developer_id: "dev".to_string(),
            client_id: "client".to_string(),
            price: 1500.0,
            terms: "Two milestones".to_string(),
            status: AgreementStatus::Proposed,
            proposed_by: "dev".to_string(),
            proposed_at: now,
            agreement_date: None,
        };
        let entry = |seq, action, actor: &str| NegotiationEntry {
            agreement_id: "a-1".to_string(),
            seq,
            action,
            actor_id: actor.to_string(),
            timestamp: now,
            price: 1500.0,
            terms: "Two milestones".to_string(),
        };

        store
            .create_agreement(&agreement, &entry(1, NegotiationAction::Proposal, "dev"))
            .unwrap();

        let mut second = agreement.clone();
        second.id = "a-2".to_string();
        assert!(matches!(
            store.create_agreement(&second, &entry(1, NegotiationAction::Proposal, "dev")),
            Err(Error::Conflict(_))
        ));

        let acceptance = entry(2, NegotiationAction::Acceptance, "client");
        assert!(store.accept_agreement("a-1", &acceptance, now).unwrap());
        assert!(!store.accept_agreement("a-1", &acceptance, now).unwrap());

        let stored = store.get_agreement_by_request("r-1").unwrap().unwrap();
        assert_eq!(stored.status, AgreementStatus::Accepted);
        assert!(stored.agreement_date.is_some());

        let history = store.list_negotiation_history("a-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, NegotiationAction::Acceptance);
    }

    #[test]
    fn test_session_transition_writes_audit_message() {
        let (_temp, store) = open_store();
        let (s, creator) = session("s-1");
        store.create_session(&s, &creator).unwrap();

        let audit = NewSessionMessage {
            session_id: "s-1".to_string(),
            participant_id: None,
            content: "Status changed to: resolved".to_string(),
            message_type: SYSTEM_MESSAGE_TYPE.to_string(),
            metadata: Some(serde_json::json!({"previous_status": "open"})),
            is_system: true,
            created_at: Utc::now(),
        };
        let message = store
            .transition_session_status("s-1", SessionStatus::Open, SessionStatus::Resolved, &audit)
            .unwrap()
            .unwrap();
        assert!(message.is_system);

        let stored = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Resolved);
        assert!(stored.resolved_at.is_some());
        assert_eq!(stored.metadata, Some(serde_json::json!({"priority": "high"})));

        let lost = store
            .transition_session_status("s-1", SessionStatus::Open, SessionStatus::InProgress, &audit)
            .unwrap();
        assert!(lost.is_none());

        let result = store.create_session_message(&text_message("s-1", "s-1-p1", "hi"), &[]);
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_session_messages_page_after_id() {
        let (_temp, store) = open_store();
        let (s, creator) = session("s-1");
        store.create_session(&s, &creator).unwrap();

        let ids: Vec<i64> = (0..5)
            .map(|i| {
                store
                    .create_session_message(&text_message("s-1", "s-1-p1", &format!("m{i}")), &[])
                    .unwrap()
                    .id
            })
            .collect();

        let page = store.list_session_messages("s-1", ids[1], 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "m2");
        assert_eq!(page[1].content, "m3");
    }

    #[test]
    fn test_duplicate_participant_email_conflicts() {
        let (_temp, store) = open_store();
        let (s, creator) = session("s-1");
        store.create_session(&s, &creator).unwrap();

        let mut dup = creator.clone();
        dup.id = "s-1-p2".to_string();
        assert!(matches!(store.add_participant(&dup), Err(Error::Conflict(_))));
    }
}
