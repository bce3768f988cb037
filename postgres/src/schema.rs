//! Provisioning DDL for the zone change table.
//!
//! The bridge never runs these statements: the table is owned and provisioned by
//! operators. They are kept here so test harnesses and local setups create exactly
//! the table the insert statement expects.

/// Statements creating the schema and the table, in execution order.
pub const SCHEMA_STATEMENTS: [&str; 3] = [
    "CREATE SCHEMA IF NOT EXISTS sch_msoft",
    r"
    CREATE TABLE IF NOT EXISTS sch_msoft.tbl_zone_change_events (
        id BIGSERIAL PRIMARY KEY,
        message TEXT NOT NULL,
        service_origin TEXT NOT NULL,
        mqtt_topic TEXT NOT NULL,
        user_id TEXT NOT NULL,
        zone_previous INTEGER NOT NULL,
        zone_new INTEGER NOT NULL,
        bpm DOUBLE PRECISION NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_zone_change_user ON sch_msoft.tbl_zone_change_events(user_id)",
];
