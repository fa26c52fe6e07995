//! Static catalog of known jobs. Deployment data: synced at startup, read by
//! the lifecycle service, never written by the runtime flow.

use crate::error::{OpsError, OpsResult};
use crate::storage::entity::job;
use crate::storage::now_ts;
use crate::storage::repository::JobRepository;
use anyhow::Context;
use log::info;
use regex::Regex;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

const JOB_ID_PATTERN: &str = r"^[A-Z][A-Z0-9_]*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    OnDemand,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "DAILY",
            Cadence::Weekly => "WEEKLY",
            Cadence::Monthly => "MONTHLY",
            Cadence::OnDemand => "ON_DEMAND",
        }
    }
}

impl FromStr for Cadence {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Cadence::Daily),
            "WEEKLY" => Ok(Cadence::Weekly),
            "MONTHLY" => Ok(Cadence::Monthly),
            "ON_DEMAND" => Ok(Cadence::OnDemand),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown cadence {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: String,
    pub display_name: String,
    pub cadence: Cadence,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl JobDefinition {
    pub fn new(job_id: &str, display_name: &str, cadence: Cadence) -> Self {
        Self {
            job_id: job_id.to_string(),
            display_name: display_name.to_string(),
            cadence,
            active: true,
        }
    }

    pub fn validate(&self) -> OpsResult<()> {
        let re = Regex::new(JOB_ID_PATTERN)
            .map_err(|e| OpsError::InvariantViolation(e.to_string()))?;
        if !re.is_match(&self.job_id) {
            return Err(OpsError::InvariantViolation(format!(
                "job id {:?} must match {}",
                self.job_id, JOB_ID_PATTERN
            )));
        }
        if self.display_name.trim().is_empty() {
            return Err(OpsError::MissingRequiredField("display_name"));
        }
        Ok(())
    }
}

impl TryFrom<job::Model> for JobDefinition {
    type Error = OpsError;

    fn try_from(model: job::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            cadence: model.cadence.parse()?,
            job_id: model.job_id,
            display_name: model.display_name,
            active: model.active,
        })
    }
}

/// Catalog used when no jobs file is configured.
pub fn default_catalog() -> Vec<JobDefinition> {
    vec![
        JobDefinition::new("DAILY_PRICE_LOAD", "Daily price load", Cadence::Daily),
        JobDefinition::new("DAILY_SIM", "Daily simulation", Cadence::Daily),
        JobDefinition::new("DAILY_RISK_SNAPSHOT", "Daily risk snapshot", Cadence::Daily),
        JobDefinition::new("WEEKLY_REBALANCE", "Weekly rebalance", Cadence::Weekly),
        JobDefinition::new("MONTHLY_REPORT", "Monthly report", Cadence::Monthly),
        JobDefinition::new("ADHOC_BACKFILL", "Ad-hoc backfill", Cadence::OnDemand),
    ]
}

/// Reads a JSON array of job definitions.
pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<JobDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading job catalog {}", path.display()))?;
    let defs: Vec<JobDefinition> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing job catalog {}", path.display()))?;
    for def in &defs {
        def.validate()
            .with_context(|| format!("invalid job definition {}", def.job_id))?;
    }
    Ok(defs)
}

pub struct JobRegistry;

impl JobRegistry {
    /// Upserts every definition. The whole catalog is validated first so a bad
    /// entry leaves the store untouched.
    pub async fn sync<C: ConnectionTrait>(conn: &C, defs: &[JobDefinition]) -> OpsResult<usize> {
        for def in defs {
            def.validate()?;
        }
        let now = now_ts();
        for def in defs {
            JobRepository::upsert(
                conn,
                &def.job_id,
                def.display_name.trim(),
                def.cadence.as_str(),
                def.active,
                now,
            )
            .await?;
        }
        info!("✓ job catalog synced: {} definitions", defs.len());
        Ok(defs.len())
    }

    /// Fails with JOB_NOT_FOUND for unknown and inactive jobs alike.
    pub async fn get_active<C: ConnectionTrait>(conn: &C, job_id: &str) -> OpsResult<JobDefinition> {
        JobRepository::find_active(conn, job_id)
            .await?
            .ok_or_else(|| OpsError::not_found(crate::error::Entity::Job, job_id))?
            .try_into()
    }

    pub async fn list<C: ConnectionTrait>(conn: &C) -> OpsResult<Vec<JobDefinition>> {
        JobRepository::list(conn)
            .await?
            .into_iter()
            .map(JobDefinition::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_upper_snake_case() {
        assert!(JobDefinition::new("DAILY_SIM", "sim", Cadence::Daily)
            .validate()
            .is_ok());
        assert!(JobDefinition::new("daily_sim", "sim", Cadence::Daily)
            .validate()
            .is_err());
        assert!(JobDefinition::new("1JOB", "x", Cadence::Daily)
            .validate()
            .is_err());
        assert!(JobDefinition::new("JOB", "  ", Cadence::Daily)
            .validate()
            .is_err());
    }

    #[test]
    fn catalog_json_defaults_active() {
        let defs: Vec<JobDefinition> =
            serde_json::from_str(r#"[{"job_id":"EOD_LOAD","display_name":"EOD","cadence":"ON_DEMAND"}]"#)
                .unwrap();
        assert_eq!(defs[0].cadence, Cadence::OnDemand);
        assert!(defs[0].active);
    }

    #[test]
    fn default_catalog_is_valid() {
        for def in default_catalog() {
            def.validate().unwrap();
        }
    }
}
