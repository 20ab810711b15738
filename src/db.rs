//! Database pool creation and schema bootstrap.
//!
//! SQLite in development and tests; any sqlx-supported RDBMS can back the same
//! schema in production. The schema is created idempotently at startup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use std::str::FromStr;

/// Create the connection pool, creating the database file if needed.
pub async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests. Uses a single connection so the schema survives.
pub async fn create_test_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    pool.execute(SCHEMA).await?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collaborators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_by INTEGER NOT NULL REFERENCES collaborators(id),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS case_variables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL REFERENCES cases(id),
    variable_name TEXT NOT NULL,
    variable_type TEXT NOT NULL DEFAULT 'text',
    concept TEXT,
    search_status TEXT NOT NULL DEFAULT 'PENDING',
    selected_match_id INTEGER,
    is_cancelled BOOLEAN NOT NULL DEFAULT FALSE,
    in_use_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_case_variables_case ON case_variables(case_id);

CREATE TABLE IF NOT EXISTS data_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    description TEXT,
    domain TEXT,
    owner_id INTEGER REFERENCES collaborators(id),
    keywords TEXT,
    data_layer TEXT,
    is_golden_source BOOLEAN NOT NULL DEFAULT FALSE,
    is_visao_cliente BOOLEAN NOT NULL DEFAULT FALSE,
    update_frequency TEXT,
    inferred_product TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_data_tables_domain ON data_tables(domain);
CREATE INDEX IF NOT EXISTS idx_data_tables_owner ON data_tables(owner_id);

CREATE TABLE IF NOT EXISTS variable_matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_variable_id INTEGER NOT NULL REFERENCES case_variables(id),
    data_table_id INTEGER NOT NULL REFERENCES data_tables(id),
    score REAL NOT NULL DEFAULT 0,
    match_reason TEXT,
    status TEXT NOT NULL DEFAULT 'SUGGESTED',
    is_selected BOOLEAN NOT NULL DEFAULT FALSE,
    selected_at TIMESTAMP,
    selected_by_id INTEGER,
    owner_id INTEGER,
    owner_validated_at TIMESTAMP,
    rejection_reason TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_variable_matches_variable ON variable_matches(case_variable_id);
CREATE INDEX IF NOT EXISTS idx_variable_matches_status ON variable_matches(status);

CREATE TABLE IF NOT EXISTS owner_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    variable_match_id INTEGER NOT NULL REFERENCES variable_matches(id),
    response_type TEXT NOT NULL,
    responder_id INTEGER NOT NULL REFERENCES collaborators(id),
    suggested_table_id INTEGER,
    delegate_to_id INTEGER,
    delegate_area_id INTEGER,
    delegate_area_name TEXT,
    usage_criteria TEXT,
    attention_points TEXT,
    notes TEXT,
    validation_result TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_owner_responses_match ON owner_responses(variable_match_id);

CREATE TABLE IF NOT EXISTS requester_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    variable_match_id INTEGER NOT NULL REFERENCES variable_matches(id),
    owner_response_id INTEGER,
    response_type TEXT NOT NULL,
    responder_id INTEGER NOT NULL REFERENCES collaborators(id),
    rejection_reason TEXT,
    expected_data_description TEXT,
    improvement_suggestions TEXT,
    loop_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_requester_responses_match ON requester_responses(variable_match_id);

CREATE TABLE IF NOT EXISTS decision_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL,
    variable_id INTEGER NOT NULL,
    match_id INTEGER,
    decision_type TEXT NOT NULL,
    outcome TEXT NOT NULL,
    actor_id INTEGER NOT NULL,
    actor_role TEXT,
    variable_context TEXT,
    table_context TEXT,
    match_context TEXT,
    decision_reason TEXT,
    decision_details TEXT,
    owner_response_id INTEGER,
    requester_response_id INTEGER,
    previous_status TEXT,
    new_status TEXT,
    loop_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_decision_history_variable ON decision_history(variable_id);
CREATE INDEX IF NOT EXISTS idx_decision_history_match ON decision_history(match_id);

CREATE TABLE IF NOT EXISTS involvements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_variable_id INTEGER NOT NULL REFERENCES case_variables(id),
    external_request_number TEXT NOT NULL,
    external_system TEXT,
    requester_id INTEGER NOT NULL REFERENCES collaborators(id),
    owner_id INTEGER NOT NULL REFERENCES collaborators(id),
    expected_completion_date DATE,
    actual_completion_date DATE,
    created_table_name TEXT,
    created_concept TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    notes TEXT,
    last_reminder_at TIMESTAMP,
    reminder_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_involvements_variable ON involvements(case_variable_id);
CREATE INDEX IF NOT EXISTS idx_involvements_status ON involvements(status);

CREATE TABLE IF NOT EXISTS decision_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    concept_hash TEXT NOT NULL,
    domain_id TEXT,
    owner_id INTEGER,
    table_id INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    actual_table_id INTEGER,
    confidence_at_decision REAL NOT NULL DEFAULT 0,
    use_case TEXT NOT NULL DEFAULT 'default',
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_decision_records_concept
    ON decision_records(concept_hash, table_id);
CREATE INDEX IF NOT EXISTS idx_decision_records_request ON decision_records(request_id);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collaborator_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'NORMAL',
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    action_url TEXT,
    case_id INTEGER,
    variable_id INTEGER,
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_notifications_collaborator
    ON notifications(collaborator_id, is_read);
"#;
