pub const SCHEMA: &str = r#"
-- Users are never hard-deleted; they are deactivated
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    user_type TEXT NOT NULL CHECK (user_type IN ('client', 'developer')),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials; non-admin tokens must belong to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Optional grouping for a client's notes and requests
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Notes and requests share one table; status and budget apply to requests only
CREATE TABLE IF NOT EXISTS resources (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('note', 'request')),
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    contains_sensitive_data INTEGER NOT NULL DEFAULT 0,
    project_id TEXT REFERENCES projects(id) ON DELETE SET NULL,
    added_to_project_at TEXT,
    status TEXT,
    estimated_budget REAL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    -- Public resources never carry sensitive content
    CHECK (NOT (is_public = 1 AND contains_sensitive_data = 1))
);

-- Share grants: one row per (resource, grantee)
CREATE TABLE IF NOT EXISTS resource_shares (
    resource_id TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    grantee_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    can_edit INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    viewed_at TEXT,
    PRIMARY KEY (resource_id, grantee_id)
);

-- One conversation per (request, starter, recipient)
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    starter_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(request_id, starter_id, recipient_id)
);

CREATE TABLE IF NOT EXISTS conversation_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- At most one agreement per request
CREATE TABLE IF NOT EXISTS agreements (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL UNIQUE REFERENCES resources(id) ON DELETE CASCADE,
    developer_id TEXT NOT NULL REFERENCES users(id),
    client_id TEXT NOT NULL REFERENCES users(id),
    price REAL NOT NULL,
    terms TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'proposed',
    proposed_by TEXT NOT NULL REFERENCES users(id),
    proposed_at TEXT NOT NULL,
    agreement_date TEXT
);

-- Append-only negotiation log
CREATE TABLE IF NOT EXISTS agreement_history (
    agreement_id TEXT NOT NULL REFERENCES agreements(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    action TEXT NOT NULL,
    actor_id TEXT NOT NULL REFERENCES users(id),
    timestamp TEXT NOT NULL,
    price REAL NOT NULL,
    terms TEXT NOT NULL,
    PRIMARY KEY (agreement_id, seq)
);

-- External support sessions
CREATE TABLE IF NOT EXISTS collaboration_sessions (
    id TEXT PRIMARY KEY,
    external_ticket_id INTEGER NOT NULL,
    source_system TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    metadata TEXT,                     -- JSON
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    resolved_at TEXT
);

CREATE TABLE IF NOT EXISTS collaboration_participants (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES collaboration_sessions(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id),
    email TEXT NOT NULL,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    last_viewed_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(session_id, email)
);

-- participant_id is NULL for system messages
CREATE TABLE IF NOT EXISTS collaboration_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES collaboration_sessions(id) ON DELETE CASCADE,
    participant_id TEXT REFERENCES collaboration_participants(id),
    content TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text',
    metadata TEXT,                     -- JSON
    is_system INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS collaboration_attachments (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES collaboration_sessions(id) ON DELETE CASCADE,
    message_id INTEGER REFERENCES collaboration_messages(id) ON DELETE SET NULL,
    file_name TEXT NOT NULL,
    stored_path TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
CREATE INDEX IF NOT EXISTS idx_resources_owner ON resources(owner_id);
CREATE INDEX IF NOT EXISTS idx_resources_project ON resources(project_id);
CREATE INDEX IF NOT EXISTS idx_resources_public ON resources(kind, is_public);
CREATE INDEX IF NOT EXISTS idx_resource_shares_grantee ON resource_shares(grantee_id);
CREATE INDEX IF NOT EXISTS idx_conversations_request ON conversations(request_id);
CREATE INDEX IF NOT EXISTS idx_conversation_messages_conversation ON conversation_messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_participants_session ON collaboration_participants(session_id);
CREATE INDEX IF NOT EXISTS idx_collab_messages_session ON collaboration_messages(session_id);
CREATE INDEX IF NOT EXISTS idx_attachments_session ON collaboration_attachments(session_id);
"#;
