//! Legacy marriage repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `(husband_id, wife_id)` is unique and never a self-pairing; both are
//!   also enforced by the table definition.
//! - Pair lookups ignore role order.

use crate::model::marriage::{Marriage, MarriageId, MarriageStatus};
use crate::model::member::MemberId;
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const MARRIAGE_SELECT_SQL: &str = "SELECT
    uuid,
    husband_id,
    wife_id,
    marriage_date,
    status
FROM marriages";

/// Repository interface for legacy marriage storage.
pub trait MarriageRepository {
    fn create_marriage(&self, marriage: &Marriage) -> RepoResult<MarriageId>;
    /// Finds a marriage between `a` and `b` in either role order.
    fn find_between(&self, a: MemberId, b: MemberId) -> RepoResult<Option<Marriage>>;
    fn list_marriages(&self) -> RepoResult<Vec<Marriage>>;
    fn count_marriages(&self) -> RepoResult<u64>;
}

/// SQLite-backed marriage repository.
pub struct SqliteMarriageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMarriageRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "marriages",
            &["uuid", "husband_id", "wife_id", "marriage_date", "status"],
        )?;
        Ok(Self { conn })
    }
}

impl MarriageRepository for SqliteMarriageRepository<'_> {
    fn create_marriage(&self, marriage: &Marriage) -> RepoResult<MarriageId> {
        marriage.validate()?;
        self.conn.execute(
            "INSERT INTO marriages (uuid, husband_id, wife_id, marriage_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                marriage.uuid.to_string(),
                marriage.husband_id.to_string(),
                marriage.wife_id.to_string(),
                marriage.marriage_date,
                marriage.status.as_str(),
            ],
        )?;
        Ok(marriage.uuid)
    }

    fn find_between(&self, a: MemberId, b: MemberId) -> RepoResult<Option<Marriage>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MARRIAGE_SELECT_SQL}
             WHERE (husband_id = ?1 AND wife_id = ?2)
                OR (husband_id = ?2 AND wife_id = ?1)
             ORDER BY created_at ASC, uuid ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![a.to_string(), b.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_marriage_row(row)?));
        }
        Ok(None)
    }

    fn list_marriages(&self) -> RepoResult<Vec<Marriage>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MARRIAGE_SELECT_SQL} ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut marriages = Vec::new();
        while let Some(row) = rows.next()? {
            marriages.push(parse_marriage_row(row)?);
        }
        Ok(marriages)
    }

    fn count_marriages(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM marriages;", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn parse_marriage_row(row: &Row<'_>) -> RepoResult<Marriage> {
    let uuid_text: String = row.get("uuid")?;
    let husband_text: String = row.get("husband_id")?;
    let wife_text: String = row.get("wife_id")?;
    let status_text: String = row.get("status")?;
    let status = MarriageStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid marriage status `{status_text}` in marriages.status"
        ))
    })?;

    let marriage = Marriage {
        uuid: parse_uuid(&uuid_text, "marriages.uuid")?,
        husband_id: parse_uuid(&husband_text, "marriages.husband_id")?,
        wife_id: parse_uuid(&wife_text, "marriages.wife_id")?,
        marriage_date: row.get("marriage_date")?,
        status,
    };
    marriage.validate()?;
    Ok(marriage)
}
