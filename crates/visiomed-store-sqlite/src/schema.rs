//! SQL schema for the VisioMed SQLite store.
//!
//! Executed once at connection startup. Dates are `YYYY-MM-DD` text and
//! timestamps fixed-width RFC 3339 text, so both compare correctly as strings.
//! Amounts are decimal text and are never summed in SQL.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Identities: one base row per actor; kind-specific attributes live in the
-- table of that kind only.
CREATE TABLE IF NOT EXISTS identities (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id     TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    username      TEXT NOT NULL UNIQUE,
    surname       TEXT NOT NULL,
    given_name    TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    active        INTEGER NOT NULL DEFAULT 1,
    kind          TEXT NOT NULL
                  CHECK (kind IN ('administrator', 'doctor', 'clerk', 'viewer')),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctors (
    identity_id         INTEGER PRIMARY KEY
                        REFERENCES identities(id) ON DELETE CASCADE,
    registration_number TEXT UNIQUE,
    specialty           TEXT
);

CREATE TABLE IF NOT EXISTS clerks (
    identity_id INTEGER PRIMARY KEY REFERENCES identities(id) ON DELETE CASCADE,
    desk        TEXT
);

CREATE TABLE IF NOT EXISTS viewers (
    identity_id      INTEGER PRIMARY KEY
                     REFERENCES identities(id) ON DELETE CASCADE,
    department_scope TEXT
);

-- Roles and permissions: an open graph, edited at runtime.
CREATE TABLE IF NOT EXISTS roles (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id   TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id   TEXT NOT NULL UNIQUE,
    label       TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS identity_roles (
    identity_id INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    role_id     INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (identity_id, role_id)
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

-- Reference data.
CREATE TABLE IF NOT EXISTS services (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id   TEXT NOT NULL UNIQUE,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS act_types (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id   TEXT NOT NULL UNIQUE,
    service_id  INTEGER NOT NULL REFERENCES services(id),
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    UNIQUE (service_id, code)
);

CREATE TABLE IF NOT EXISTS coverage_types (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id   TEXT NOT NULL UNIQUE,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

-- Tariffs. Validity windows of one triple may overlap; only the start date
-- is unique.
CREATE TABLE IF NOT EXISTS tariffs (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id        TEXT NOT NULL UNIQUE,
    service_id       INTEGER NOT NULL REFERENCES services(id),
    act_type_id      INTEGER NOT NULL REFERENCES act_types(id),
    coverage_type_id INTEGER NOT NULL REFERENCES coverage_types(id),
    amount           TEXT NOT NULL,
    date_begin       TEXT NOT NULL,
    date_end         TEXT,
    created_at       TEXT NOT NULL,
    UNIQUE (service_id, act_type_id, coverage_type_id, date_begin),
    CHECK  (date_end IS NULL OR date_end >= date_begin)
);

CREATE INDEX IF NOT EXISTS tariffs_lookup_idx
    ON tariffs(service_id, act_type_id, coverage_type_id, date_begin DESC);

-- Billing records. `amount` is the snapshot taken at creation.
CREATE TABLE IF NOT EXISTS billing_records (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id          TEXT NOT NULL UNIQUE,
    patient_surname    TEXT NOT NULL,
    patient_given_name TEXT NOT NULL,
    coverage_reference TEXT,
    act_date           TEXT NOT NULL,
    billing_code       TEXT,
    observations       TEXT,
    amount             TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'unpaid'
                       CHECK (status IN ('unpaid', 'paid', 'free')),
    act_type_id        INTEGER NOT NULL REFERENCES act_types(id),
    coverage_type_id   INTEGER NOT NULL REFERENCES coverage_types(id),
    doctor_id          INTEGER NOT NULL REFERENCES identities(id),
    created_by         INTEGER REFERENCES identities(id) ON DELETE SET NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS billing_act_date_idx ON billing_records(act_date);
CREATE INDEX IF NOT EXISTS billing_doctor_idx   ON billing_records(doctor_id);

-- Audit journal. Append-only: no UPDATE or DELETE is ever issued against
-- this table. `actor_id` is not a foreign key so entries outlive identities.
CREATE TABLE IF NOT EXISTS audit_records (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    public_id      TEXT NOT NULL UNIQUE,
    actor_id       INTEGER,
    client_address TEXT,
    action         TEXT NOT NULL CHECK (action IN ('CREATE', 'UPDATE', 'DELETE')),
    resource_type  TEXT NOT NULL,
    resource_id    TEXT,
    changes        TEXT,           -- JSON or NULL
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_resource_idx
    ON audit_records(resource_type, resource_id);

-- Refresh-token sessions; only the SHA-256 digest of the token is kept.
CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    token_hash  TEXT NOT NULL UNIQUE,
    identity_id INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    expires_at  TEXT NOT NULL,
    revoked_at  TEXT,
    created_at  TEXT NOT NULL
);

PRAGMA user_version = 1;
";
