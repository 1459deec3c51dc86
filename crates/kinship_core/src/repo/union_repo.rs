//! Union repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist union edges with their ordered child lists.
//! - Allocate `UNION_NNNN` ids and enforce live-pair uniqueness in one
//!   write transaction.
//!
//! # Invariants
//! - Listing order is creation order (`seq ASC`) unless stated otherwise.
//! - `union_children` primary key keeps child membership unique.
//! - Verification writes only succeed while the row is still `Pending`.

use crate::model::member::MemberId;
use crate::model::union::{
    format_union_code, normalized_pair, NewUnion, Union, UnionRef, UnionStatus, UnionType,
    Verification, VerificationStatus, VerifyAction,
};
use crate::model::ActorId;
use crate::repo::{
    bool_to_int, ensure_connection_ready, parse_optional_uuid, parse_uuid, RepoError,
    RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use uuid::Uuid;

const UNION_SELECT_SQL: &str = "SELECT
    uuid,
    union_id,
    husband_id,
    wife_id,
    marriage_date,
    marriage_place,
    union_type,
    status,
    is_verified,
    verification_status,
    verified_by,
    verified_at,
    rejection_reason,
    created_by
FROM unions";

const UNION_COLUMNS: &[&str] = &[
    "uuid",
    "union_id",
    "seq",
    "husband_id",
    "wife_id",
    "pair_low",
    "pair_high",
    "marriage_date",
    "marriage_place",
    "union_type",
    "status",
    "is_verified",
    "verification_status",
    "verified_by",
    "verified_at",
    "rejection_reason",
    "created_by",
];

/// Filter options for union listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnionListQuery {
    pub verification_status: Option<VerificationStatus>,
    pub include_deceased: bool,
    /// Orders by `seq DESC` instead of creation order.
    pub newest_first: bool,
}

/// Repository interface for union storage.
pub trait UnionRepository {
    /// Inserts a union, allocating its `union_id`.
    ///
    /// Returns `Conflict` when a live union already links the same pair.
    fn create_union(&self, draft: &NewUnion) -> RepoResult<Union>;
    fn get_union(&self, id: UnionRef) -> RepoResult<Option<Union>>;
    fn get_union_by_code(&self, union_id: &str) -> RepoResult<Option<Union>>;
    /// Finds the live union linking `a` and `b` in either role order.
    fn find_live_pair(&self, a: MemberId, b: MemberId) -> RepoResult<Option<Union>>;
    fn count_unions(&self) -> RepoResult<u64>;
    /// Appends a child. Returns `false` when the child was already attached.
    fn add_child(&self, id: UnionRef, child_id: MemberId) -> RepoResult<bool>;
    fn set_status(&self, id: UnionRef, status: UnionStatus) -> RepoResult<()>;
    /// Applies a verification decision if the union is still `Pending`.
    ///
    /// Returns `false` when the union was already finalized.
    fn finalize_verification(
        &self,
        id: UnionRef,
        action: VerifyAction,
        actor: ActorId,
        rejection_reason: Option<&str>,
    ) -> RepoResult<bool>;
    fn list_unions(&self, query: &UnionListQuery) -> RepoResult<Vec<Union>>;
    /// Unions where the member is husband, wife or child, in creation order.
    fn list_by_member(&self, member_id: MemberId) -> RepoResult<Vec<Union>>;
}

/// SQLite-backed union repository.
pub struct SqliteUnionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUnionRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "unions", UNION_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl UnionRepository for SqliteUnionRepository<'_> {
    fn create_union(&self, draft: &NewUnion) -> RepoResult<Union> {
        draft.validate()?;
        let (pair_low, pair_high) = normalized_pair(draft.husband_id, draft.wife_id);
        let union_uuid = Uuid::new_v4();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if live_pair_exists(&tx, pair_low, pair_high)? {
            return Err(RepoError::Conflict(format!(
                "a live union already links {} and {}",
                draft.husband_id, draft.wife_id
            )));
        }

        let seq = next_union_seq(&tx)?;
        tx.execute(
            "INSERT INTO unions (
                uuid,
                union_id,
                seq,
                husband_id,
                wife_id,
                pair_low,
                pair_high,
                marriage_date,
                marriage_place,
                union_type,
                status,
                is_verified,
                verification_status,
                created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'Active', 0, 'Pending', ?11);",
            params![
                union_uuid.to_string(),
                format_union_code(seq),
                seq,
                draft.husband_id.to_string(),
                draft.wife_id.to_string(),
                pair_low.to_string(),
                pair_high.to_string(),
                draft.marriage_date,
                draft.marriage_place.as_deref(),
                draft.union_type.as_str(),
                draft.created_by.map(|actor| actor.to_string()),
            ],
        )?;

        for (position, child_id) in draft.children_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO union_children (union_uuid, child_uuid, position)
                 VALUES (?1, ?2, ?3);",
                params![union_uuid.to_string(), child_id.to_string(), position as i64],
            )?;
        }
        tx.commit()?;

        load_required_union(self.conn, union_uuid)
    }

    fn get_union(&self, id: UnionRef) -> RepoResult<Option<Union>> {
        load_union_where(self.conn, "uuid = ?1", id.to_string())
    }

    fn get_union_by_code(&self, union_id: &str) -> RepoResult<Option<Union>> {
        load_union_where(self.conn, "union_id = ?1", union_id.trim().to_string())
    }

    fn find_live_pair(&self, a: MemberId, b: MemberId) -> RepoResult<Option<Union>> {
        let (pair_low, pair_high) = normalized_pair(a, b);
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid
                 FROM unions
                 WHERE pair_low = ?1
                   AND pair_high = ?2
                   AND status <> 'Deceased';",
                params![pair_low.to_string(), pair_high.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(text) => self.get_union(parse_uuid(&text, "unions.uuid")?),
            None => Ok(None),
        }
    }

    fn count_unions(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM unions;", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn add_child(&self, id: UnionRef, child_id: MemberId) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM unions WHERE uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::NotFound { entity: "union", id });
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO union_children (union_uuid, child_uuid, position)
             VALUES (
                ?1,
                ?2,
                (SELECT COALESCE(MAX(position), -1) + 1
                 FROM union_children
                 WHERE union_uuid = ?1)
             );",
            params![id.to_string(), child_id.to_string()],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE unions
                 SET updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                [id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    fn set_status(&self, id: UnionRef, status: UnionStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE unions
             SET status = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![status.as_str(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "union", id });
        }
        Ok(())
    }

    fn finalize_verification(
        &self,
        id: UnionRef,
        action: VerifyAction,
        actor: ActorId,
        rejection_reason: Option<&str>,
    ) -> RepoResult<bool> {
        let target = action.target_status();
        let changed = self.conn.execute(
            "UPDATE unions
             SET verification_status = ?1,
                 is_verified = ?2,
                 rejection_reason = ?3,
                 verified_by = ?4,
                 verified_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?5
               AND verification_status = 'Pending';",
            params![
                target.as_str(),
                bool_to_int(target == VerificationStatus::Approved),
                match action {
                    VerifyAction::Reject => rejection_reason,
                    VerifyAction::Approve => None,
                },
                actor.to_string(),
                id.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn list_unions(&self, query: &UnionListQuery) -> RepoResult<Vec<Union>> {
        let mut sql = format!("{UNION_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = query.verification_status {
            sql.push_str(" AND verification_status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if !query.include_deceased {
            sql.push_str(" AND status <> 'Deceased'");
        }
        if query.newest_first {
            sql.push_str(" ORDER BY seq DESC");
        } else {
            sql.push_str(" ORDER BY seq ASC");
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut unions = Vec::new();
        while let Some(row) = rows.next()? {
            unions.push(parse_union_row(self.conn, row)?);
        }
        Ok(unions)
    }

    fn list_by_member(&self, member_id: MemberId) -> RepoResult<Vec<Union>> {
        let mut stmt = self.conn.prepare(&format!(
            "{UNION_SELECT_SQL}
             WHERE husband_id = ?1
                OR wife_id = ?1
                OR uuid IN (
                    SELECT union_uuid FROM union_children WHERE child_uuid = ?1
                )
             ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([member_id.to_string()])?;
        let mut unions = Vec::new();
        while let Some(row) = rows.next()? {
            unions.push(parse_union_row(self.conn, row)?);
        }
        Ok(unions)
    }
}

fn live_pair_exists(conn: &Connection, pair_low: MemberId, pair_high: MemberId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM unions
            WHERE pair_low = ?1
              AND pair_high = ?2
              AND status <> 'Deceased'
        );",
        params![pair_low.to_string(), pair_high.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Count-based sequence: `count + 1`, advanced past any sequence already
/// taken (imported rows can leave gaps). Must run inside the write
/// transaction that performs the insert.
fn next_union_seq(conn: &Connection) -> RepoResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM unions;", [], |row| row.get(0))?;
    let mut candidate = count + 1;
    loop {
        let taken: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM unions WHERE seq = ?1 OR union_id = ?2);",
            params![candidate, format_union_code(candidate)],
            |row| row.get(0),
        )?;
        if taken == 0 {
            return Ok(candidate);
        }
        candidate += 1;
    }
}

fn load_required_union(conn: &Connection, id: UnionRef) -> RepoResult<Union> {
    load_union_where(conn, "uuid = ?1", id.to_string())?
        .ok_or(RepoError::NotFound { entity: "union", id })
}

fn load_union_where(conn: &Connection, clause: &str, value: String) -> RepoResult<Option<Union>> {
    let mut stmt = conn.prepare(&format!("{UNION_SELECT_SQL} WHERE {clause};"))?;
    let mut rows = stmt.query([value])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_union_row(conn, row)?));
    }
    Ok(None)
}

fn load_children(conn: &Connection, union_uuid: &str) -> RepoResult<Vec<MemberId>> {
    let mut stmt = conn.prepare(
        "SELECT child_uuid
         FROM union_children
         WHERE union_uuid = ?1
         ORDER BY position ASC, child_uuid ASC;",
    )?;
    let mut rows = stmt.query([union_uuid])?;
    let mut children = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        children.push(parse_uuid(&text, "union_children.child_uuid")?);
    }
    Ok(children)
}

fn parse_union_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Union> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "unions.uuid")?;

    let type_text: String = row.get("union_type")?;
    let union_type = UnionType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid union type `{type_text}` in unions.union_type"))
    })?;

    let status_text: String = row.get("status")?;
    let status = UnionStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid union status `{status_text}` in unions.status"))
    })?;

    let verification_text: String = row.get("verification_status")?;
    let verification_status = VerificationStatus::parse(&verification_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid verification status `{verification_text}` in unions.verification_status"
        ))
    })?;

    let is_verified = match row.get::<_, i64>("is_verified")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_verified value `{other}` in unions.is_verified"
            )));
        }
    };

    let husband_text: String = row.get("husband_id")?;
    let wife_text: String = row.get("wife_id")?;

    let union = Union {
        uuid,
        union_id: row.get("union_id")?,
        husband_id: parse_uuid(&husband_text, "unions.husband_id")?,
        wife_id: parse_uuid(&wife_text, "unions.wife_id")?,
        marriage_date: row.get("marriage_date")?,
        marriage_place: row.get("marriage_place")?,
        union_type,
        children_ids: load_children(conn, &uuid_text)?,
        status,
        verification: Verification {
            is_verified,
            status: verification_status,
            verified_by: parse_optional_uuid(row.get("verified_by")?, "unions.verified_by")?,
            verified_at: row.get("verified_at")?,
            rejection_reason: row.get("rejection_reason")?,
        },
        created_by: parse_optional_uuid(row.get("created_by")?, "unions.created_by")?,
    };
    union.validate()?;
    Ok(union)
}
