//! PostgreSQL decision store
//!
//! Opens one short-lived connection per operation and closes it afterwards.
//! Writes run inside a transaction; an error drops the transaction, which
//! rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Connection, PgConnection, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::schema::SCHEMA_STATEMENTS;
use super::store::{DecisionStore, StoreCounts, StoreError};
use crate::config::DatabaseConfig;
use crate::types::{ControlSource, Decision, DecisionKind, ParameterMap, ProcessSample};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const PENDING: &str = "COALESCE(decision_applied, FALSE) = FALSE";

/// Decision store backed by PostgreSQL (or TimescaleDB).
pub struct PgDecisionStore {
    options: PgConnectOptions,
}

impl PgDecisionStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);
        Self { options }
    }

    async fn connect(&self) -> Result<PgConnection, StoreError> {
        tokio::time::timeout(CONNECT_TIMEOUT, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| StoreError::Unavailable(format!("connect timed out after {CONNECT_TIMEOUT:?}")))?
            .map_err(StoreError::from)
    }
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Closing store connection failed");
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn sample_from_row(row: &PgRow) -> Result<ProcessSample, StoreError> {
    let source: Option<String> = row.try_get("data_source")?;
    let data_source = source
        .as_deref()
        .and_then(ControlSource::parse)
        .unwrap_or(ControlSource::HumanControl);

    Ok(ProcessSample {
        timestamp: row.try_get("timestamp")?,
        bit_tq: row.try_get("bit_tq")?,
        fc1065: row.try_get("fc1065")?,
        li40054: row.try_get("li40054")?,
        fc31007: row.try_get("fc31007")?,
        pi18213: row.try_get("pi18213")?,
        energy_consumption: row.try_get("energy_consumption")?,
        co2_emissions: row.try_get("co2_emissions")?,
        hvbgo_flow: row.try_get("hvbgo_flow")?,
        temperature_flash: row.try_get("temperature_flash")?,
        process_efficiency: row
            .try_get::<Option<f64>, _>("process_efficiency")?
            .unwrap_or(0.0),
        data_source,
    })
}

/// NULL decodes to an empty map.
fn parameter_map(text: Option<&str>) -> Result<ParameterMap, StoreError> {
    Ok(text
        .map(ParameterMap::from_json)
        .transpose()?
        .unwrap_or_default())
}

fn decision_from_row(row: &PgRow) -> Result<Decision, StoreError> {
    let kind: Option<String> = row.try_get("decision_type")?;
    let decision_type = match kind.as_deref() {
        Some(tag) => DecisionKind::parse(tag)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown decision_type '{tag}'")))?,
        None => DecisionKind::AiOptimization,
    };
    let changes: Option<String> = row.try_get("parameters_changed")?;
    let baseline: Option<String> = row.try_get("baseline_values")?;
    let float = |column: &str| -> Result<f64, StoreError> {
        Ok(row.try_get::<Option<f64>, _>(column)?.unwrap_or(0.0))
    };
    let flag = |column: &str| -> Result<bool, StoreError> {
        Ok(row.try_get::<Option<bool>, _>(column)?.unwrap_or(false))
    };

    Ok(Decision {
        timestamp: row.try_get("timestamp")?,
        decision_type,
        confidence: float("confidence")?,
        predicted_bit_tq: float("predicted_bit_tq")?,
        predicted_energy_saving: float("predicted_energy_saving")?,
        predicted_co2_reduction: float("predicted_co2_reduction")?,
        parameter_changes: parameter_map(changes.as_deref())?,
        baseline_values: parameter_map(baseline.as_deref())?,
        savings_eur_hour: float("savings_eur_hour")?,
        anomaly_detected: flag("anomaly_detected")?,
        applied: flag("decision_applied")?,
        operator_approved: flag("operator_approved")?,
        analysis: None,
        predicted_hvbgo_flow_reduction: None,
    })
}

#[async_trait]
impl DecisionStore for PgDecisionStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let result = conn.ping().await.map_err(StoreError::from);
        close(conn).await;
        result
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&mut conn).await?;
        }
        close(conn).await;
        info!("Store schema ready");
        Ok(())
    }

    async fn insert_sample(&self, sample: &ProcessSample) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        sqlx::query(
            "INSERT INTO process_data ( \
                 timestamp, fc1065, li40054, fc31007, pi18213, bit_tq, \
                 energy_consumption, co2_emissions, hvbgo_flow, \
                 temperature_flash, process_efficiency, data_source \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(sample.timestamp)
        .bind(sample.fc1065)
        .bind(sample.li40054)
        .bind(sample.fc31007)
        .bind(sample.pi18213)
        .bind(sample.bit_tq)
        .bind(sample.energy_consumption)
        .bind(sample.co2_emissions)
        .bind(sample.hvbgo_flow)
        .bind(sample.temperature_flash)
        .bind(sample.process_efficiency)
        .bind(sample.data_source.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        close(conn).await;
        Ok(())
    }

    async fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError> {
        let changes = decision.parameter_changes.to_json()?;
        let baseline = decision.baseline_values.to_json()?;

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        sqlx::query(
            "INSERT INTO ai_decisions ( \
                 timestamp, decision_type, confidence, predicted_bit_tq, \
                 predicted_energy_saving, predicted_co2_reduction, \
                 parameters_changed, baseline_values, savings_eur_hour, \
                 anomaly_detected, decision_applied, operator_approved \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, FALSE)",
        )
        .bind(decision.timestamp)
        .bind(decision.decision_type.as_str())
        .bind(decision.confidence)
        .bind(decision.predicted_bit_tq)
        .bind(decision.predicted_energy_saving)
        .bind(decision.predicted_co2_reduction)
        .bind(&changes)
        .bind(&baseline)
        .bind(decision.savings_eur_hour)
        .bind(decision.anomaly_detected)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        close(conn).await;
        Ok(())
    }

    async fn latest_pending(&self) -> Result<Option<Decision>, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(&format!(
            "SELECT * FROM ai_decisions WHERE {PENDING} ORDER BY timestamp DESC LIMIT 1"
        ))
        .fetch_optional(&mut conn)
        .await?;
        close(conn).await;
        row.as_ref().map(decision_from_row).transpose()
    }

    async fn count_pending(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError> {
        let mut conn = self.connect().await?;
        let (n,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM ai_decisions \
             WHERE {PENDING} AND ($1::timestamptz IS NULL OR timestamp > $1)"
        ))
        .bind(since)
        .fetch_one(&mut conn)
        .await?;
        close(conn).await;
        Ok(count(n))
    }

    async fn mark_applied(&self, timestamp: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        let result = sqlx::query(
            "UPDATE ai_decisions \
             SET decision_applied = TRUE, operator_approved = TRUE \
             WHERE timestamp = $1",
        )
        .bind(timestamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        close(conn).await;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_sample(&self) -> Result<Option<ProcessSample>, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT * FROM process_data ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(&mut conn)
            .await?;
        close(conn).await;
        row.as_ref().map(sample_from_row).transpose()
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let mut conn = self.connect().await?;
        let (samples, decisions, pending): (i64, i64, i64) = sqlx::query_as(&format!(
            "SELECT \
                 (SELECT COUNT(*) FROM process_data), \
                 (SELECT COUNT(*) FROM ai_decisions), \
                 (SELECT COUNT(*) FROM ai_decisions WHERE {PENDING})"
        ))
        .fetch_one(&mut conn)
        .await?;
        close(conn).await;
        Ok(StoreCounts {
            total_samples: count(samples),
            total_decisions: count(decisions),
            pending_decisions: count(pending),
        })
    }

    fn backend_name(&self) -> &'static str {
        "PostgreSQL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_map_null_is_empty() {
        assert!(parameter_map(None).unwrap().is_empty());
        let map = parameter_map(Some(r#"{"fc1065":130.213}"#)).unwrap();
        assert_eq!(map.get("fc1065"), Some(130.213));
        assert!(matches!(
            parameter_map(Some("not json")),
            Err(StoreError::Encoding(_))
        ));
    }

    #[test]
    fn test_count_never_negative() {
        assert_eq!(count(-1), 0);
        assert_eq!(count(42), 42);
    }
}
