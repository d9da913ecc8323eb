// ABOUTME: Table definitions for the state store.
// ABOUTME: Service rows are keyed by service identity, never by an auto-increment id.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    topology TEXT NOT NULL DEFAULT '',
    create_time TEXT NOT NULL,
    current INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS containers (
    id TEXT PRIMARY KEY,
    cluster_id INTEGER NOT NULL REFERENCES clusters(id),
    container_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    host TEXT NOT NULL,
    container_id TEXT NOT NULL,
    aux_info TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS playgrounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    create_time TEXT NOT NULL,
    mount_point TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execute_time TEXT NOT NULL,
    work_directory TEXT NOT NULL,
    command TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    error_code INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS "any" (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
"#;
