//! Registry schema steps, applied in order and tracked by `PRAGMA user_version`.
//!
//! 1. `members`: member nodes plus derived columns (back-pointers, lineage
//!    cache, denormalized location names).
//! 2. `unions`: union edges, child links, live-pair and code uniqueness.
//! 3. `marriages`: legacy marriage edges with unordered-pair uniqueness.
//!
//! All pending steps share one transaction; a failing step leaves the file at
//! its previous version.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "members",
        sql: include_str!("0001_members.sql"),
    },
    SchemaStep {
        version: 2,
        name: "unions",
        sql: include_str!("0002_unions.sql"),
    },
    SchemaStep {
        version: 3,
        name: "marriages",
        sql: include_str!("0003_marriages.sql"),
    },
];

/// Schema version a fully migrated registry reports.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`]. Returns the number of steps run.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > from)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            })?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={} to={} steps={}",
        from,
        latest,
        pending.len()
    );
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::{latest_version, SCHEMA_STEPS};

    #[test]
    fn steps_are_contiguous_from_one() {
        for (index, step) in SCHEMA_STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step `{}`", step.name);
        }
        assert_eq!(latest_version(), 3);
    }

    #[test]
    fn union_step_carries_pair_and_code_uniqueness() {
        let unions = SCHEMA_STEPS
            .iter()
            .find(|step| step.name == "unions")
            .map(|step| step.sql)
            .unwrap_or_default();
        assert!(unions.contains("idx_unions_live_pair"));
        assert!(unions.contains("UNIQUE"));
    }
}
