//! Relational schema for the two record sets
//!
//! Applied statement by statement; every statement is idempotent.

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS process_data (
        timestamp           TIMESTAMPTZ NOT NULL,
        fc1065              DOUBLE PRECISION,
        li40054             DOUBLE PRECISION,
        fc31007             DOUBLE PRECISION,
        pi18213             DOUBLE PRECISION,
        bit_tq              DOUBLE PRECISION,
        energy_consumption  DOUBLE PRECISION,
        co2_emissions       DOUBLE PRECISION,
        hvbgo_flow          DOUBLE PRECISION,
        temperature_flash   DOUBLE PRECISION,
        process_efficiency  DOUBLE PRECISION,
        data_source         TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_process_data_timestamp ON process_data (timestamp DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS ai_decisions (
        timestamp                TIMESTAMPTZ NOT NULL,
        decision_type            TEXT,
        confidence               DOUBLE PRECISION,
        predicted_bit_tq         DOUBLE PRECISION,
        predicted_energy_saving  DOUBLE PRECISION,
        predicted_co2_reduction  DOUBLE PRECISION,
        parameters_changed       TEXT,
        baseline_values          TEXT,
        savings_eur_hour         DOUBLE PRECISION,
        anomaly_detected         BOOLEAN,
        decision_applied         BOOLEAN DEFAULT FALSE,
        operator_approved        BOOLEAN DEFAULT FALSE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ai_decisions_timestamp ON ai_decisions (timestamp DESC)",
];
