//! Member repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over `members` plus targeted writes for derived state
//!   (back-pointers, lineage cache, denormalized location names).
//! - Serve the eligible-candidate query with gender / status filters.
//!
//! # Invariants
//! - Write paths call `Member::validate()` before SQL mutations.
//! - Candidate listing order is deterministic: `first_name ASC, uuid ASC`.
//! - An unreadable lineage cache reads as empty; it never fails a member read.

use crate::model::member::{
    FamilyLineageLinks, Gender, LegacyLocation, LineageLinks, LocationNames, MaritalStatus,
    Member, MemberId,
};
use crate::model::union::UnionRef;
use crate::repo::{
    ensure_connection_ready, parse_optional_uuid, parse_uuid, RepoError, RepoResult,
};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const MEMBER_SELECT_SQL: &str = "SELECT
    uuid,
    first_name,
    middle_name,
    last_name,
    full_name,
    gender,
    marital_status,
    current_union_id,
    parental_union_id,
    family_lineage_links,
    spouse_id,
    state,
    district,
    city,
    village,
    state_name,
    district_name,
    taluka_name,
    village_name
FROM members";

const MEMBER_COLUMNS: &[&str] = &[
    "uuid",
    "first_name",
    "middle_name",
    "last_name",
    "full_name",
    "gender",
    "marital_status",
    "current_union_id",
    "parental_union_id",
    "family_lineage_links",
    "spouse_id",
    "state",
    "district",
    "city",
    "village",
    "state_name",
    "district_name",
    "taluka_name",
    "village_name",
];

/// Filter options for member listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberListQuery {
    pub gender: Option<Gender>,
    /// Empty means any status.
    pub marital_statuses: Vec<MaritalStatus>,
    pub exclude_id: Option<MemberId>,
    pub limit: Option<u32>,
}

/// Partial write for derived name fields. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberNameUpdate {
    pub full_name: Option<String>,
    pub state_name: Option<String>,
    pub district_name: Option<String>,
    pub taluka_name: Option<String>,
    pub village_name: Option<String>,
}

impl MemberNameUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.state_name.is_none()
            && self.district_name.is_none()
            && self.taluka_name.is_none()
            && self.village_name.is_none()
    }
}

/// Repository interface for member storage.
pub trait MemberRepository {
    fn create_member(&self, member: &Member) -> RepoResult<MemberId>;
    /// Replaces caller-owned fields. Back-pointers and the lineage cache are
    /// left alone; they have dedicated writers.
    fn update_member(&self, member: &Member) -> RepoResult<()>;
    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>>;
    fn list_members(&self, query: &MemberListQuery) -> RepoResult<Vec<Member>>;
    /// All member ids in stable `uuid` order, for record-at-a-time passes.
    fn list_member_ids(&self) -> RepoResult<Vec<MemberId>>;
    /// Ids of members carrying a legacy spouse reference, in `uuid` order.
    fn list_legacy_spouse_ids(&self) -> RepoResult<Vec<MemberId>>;
    fn count_members(&self) -> RepoResult<u64>;
    fn set_lineage_links(&self, id: MemberId, links: &LineageLinks) -> RepoResult<()>;
    fn set_current_union(&self, id: MemberId, union: Option<UnionRef>) -> RepoResult<()>;
    fn set_parental_union(&self, id: MemberId, union: Option<UnionRef>) -> RepoResult<()>;
    fn set_family_links(&self, id: MemberId, links: &FamilyLineageLinks) -> RepoResult<()>;
    fn apply_name_update(&self, id: MemberId, update: &MemberNameUpdate) -> RepoResult<()>;
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "members", MEMBER_COLUMNS)?;
        Ok(Self { conn })
    }

    fn ensure_changed(&self, changed: usize, id: MemberId) -> RepoResult<()> {
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "member",
                id,
            });
        }
        Ok(())
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn create_member(&self, member: &Member) -> RepoResult<MemberId> {
        member.validate()?;
        let links = serde_json::to_string(&member.family_lineage_links)?;

        self.conn.execute(
            "INSERT INTO members (
                uuid,
                first_name,
                middle_name,
                last_name,
                full_name,
                gender,
                marital_status,
                current_union_id,
                parental_union_id,
                family_lineage_links,
                spouse_id,
                state,
                district,
                city,
                village,
                state_name,
                district_name,
                taluka_name,
                village_name
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19);",
            params![
                member.uuid.to_string(),
                member.first_name.as_str(),
                member.middle_name.as_deref(),
                member.last_name.as_deref(),
                member.full_name.as_str(),
                member.gender.as_str(),
                member.marital_status.as_str(),
                member.lineage_links.current_union_id.map(|id| id.to_string()),
                member.lineage_links.parental_union_id.map(|id| id.to_string()),
                links,
                member.spouse_id.map(|id| id.to_string()),
                member.location.state.as_deref(),
                member.location.district.as_deref(),
                member.location.city.as_deref(),
                member.location.village.as_deref(),
                member.location_names.state_name.as_deref(),
                member.location_names.district_name.as_deref(),
                member.location_names.taluka_name.as_deref(),
                member.location_names.village_name.as_deref(),
            ],
        )?;

        Ok(member.uuid)
    }

    fn update_member(&self, member: &Member) -> RepoResult<()> {
        member.validate()?;

        let changed = self.conn.execute(
            "UPDATE members
             SET
                first_name = ?1,
                middle_name = ?2,
                last_name = ?3,
                full_name = ?4,
                gender = ?5,
                marital_status = ?6,
                spouse_id = ?7,
                state = ?8,
                district = ?9,
                city = ?10,
                village = ?11,
                state_name = ?12,
                district_name = ?13,
                taluka_name = ?14,
                village_name = ?15,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?16;",
            params![
                member.first_name.as_str(),
                member.middle_name.as_deref(),
                member.last_name.as_deref(),
                member.full_name.as_str(),
                member.gender.as_str(),
                member.marital_status.as_str(),
                member.spouse_id.map(|id| id.to_string()),
                member.location.state.as_deref(),
                member.location.district.as_deref(),
                member.location.city.as_deref(),
                member.location.village.as_deref(),
                member.location_names.state_name.as_deref(),
                member.location_names.district_name.as_deref(),
                member.location_names.taluka_name.as_deref(),
                member.location_names.village_name.as_deref(),
                member.uuid.to_string(),
            ],
        )?;
        self.ensure_changed(changed, member.uuid)
    }

    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn list_members(&self, query: &MemberListQuery) -> RepoResult<Vec<Member>> {
        let mut sql = format!("{MEMBER_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(gender) = query.gender {
            sql.push_str(" AND gender = ?");
            bind_values.push(Value::Text(gender.as_str().to_string()));
        }

        if !query.marital_statuses.is_empty() {
            let placeholders = vec!["?"; query.marital_statuses.len()].join(", ");
            sql.push_str(&format!(" AND marital_status IN ({placeholders})"));
            for status in &query.marital_statuses {
                bind_values.push(Value::Text(status.as_str().to_string()));
            }
        }

        if let Some(exclude_id) = query.exclude_id {
            sql.push_str(" AND uuid <> ?");
            bind_values.push(Value::Text(exclude_id.to_string()));
        }

        sql.push_str(" ORDER BY first_name ASC, uuid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row)?);
        }
        Ok(members)
    }

    fn list_member_ids(&self) -> RepoResult<Vec<MemberId>> {
        collect_ids(self.conn, "SELECT uuid FROM members ORDER BY uuid ASC;")
    }

    fn list_legacy_spouse_ids(&self) -> RepoResult<Vec<MemberId>> {
        collect_ids(
            self.conn,
            "SELECT uuid FROM members WHERE spouse_id IS NOT NULL ORDER BY uuid ASC;",
        )
    }

    fn count_members(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM members;", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn set_lineage_links(&self, id: MemberId, links: &LineageLinks) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members
             SET current_union_id = ?1,
                 parental_union_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?3;",
            params![
                links.current_union_id.map(|value| value.to_string()),
                links.parental_union_id.map(|value| value.to_string()),
                id.to_string(),
            ],
        )?;
        self.ensure_changed(changed, id)
    }

    fn set_current_union(&self, id: MemberId, union: Option<UnionRef>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members
             SET current_union_id = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![union.map(|value| value.to_string()), id.to_string()],
        )?;
        self.ensure_changed(changed, id)
    }

    fn set_parental_union(&self, id: MemberId, union: Option<UnionRef>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members
             SET parental_union_id = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![union.map(|value| value.to_string()), id.to_string()],
        )?;
        self.ensure_changed(changed, id)
    }

    fn set_family_links(&self, id: MemberId, links: &FamilyLineageLinks) -> RepoResult<()> {
        let document = serde_json::to_string(links)?;
        let changed = self.conn.execute(
            "UPDATE members
             SET family_lineage_links = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![document, id.to_string()],
        )?;
        self.ensure_changed(changed, id)
    }

    fn apply_name_update(&self, id: MemberId, update: &MemberNameUpdate) -> RepoResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let changed = self.conn.execute(
            "UPDATE members
             SET full_name = COALESCE(?1, full_name),
                 state_name = COALESCE(?2, state_name),
                 district_name = COALESCE(?3, district_name),
                 taluka_name = COALESCE(?4, taluka_name),
                 village_name = COALESCE(?5, village_name),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?6;",
            params![
                update.full_name.as_deref(),
                update.state_name.as_deref(),
                update.district_name.as_deref(),
                update.taluka_name.as_deref(),
                update.village_name.as_deref(),
                id.to_string(),
            ],
        )?;
        self.ensure_changed(changed, id)
    }
}

fn collect_ids(conn: &Connection, sql: &str) -> RepoResult<Vec<MemberId>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        ids.push(parse_uuid(&text, "members.uuid")?);
    }
    Ok(ids)
}

/// The cache is rebuildable from union edges, so an unreadable document is
/// treated as empty and overwritten by the next refresh.
fn parse_lineage_document(uuid: MemberId, document: Option<String>) -> FamilyLineageLinks {
    let Some(document) = document.filter(|document| !document.trim().is_empty()) else {
        return FamilyLineageLinks::default();
    };
    match serde_json::from_str(&document) {
        Ok(links) => links,
        Err(err) => {
            warn!(
                "event=lineage_read module=repo status=skip reason=invalid_cache member={} error={}",
                uuid, err
            );
            FamilyLineageLinks::default()
        }
    }
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<Member> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "members.uuid")?;

    let gender_text: String = row.get("gender")?;
    let gender = Gender::parse(&gender_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid gender `{gender_text}` in members.gender"))
    })?;

    let status_text: String = row.get("marital_status")?;
    let marital_status = MaritalStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid marital status `{status_text}` in members.marital_status"
        ))
    })?;

    let family_lineage_links =
        parse_lineage_document(uuid, row.get::<_, Option<String>>("family_lineage_links")?);

    let member = Member {
        uuid,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        last_name: row.get("last_name")?,
        full_name: row.get("full_name")?,
        gender,
        marital_status,
        lineage_links: LineageLinks {
            current_union_id: parse_optional_uuid(
                row.get("current_union_id")?,
                "members.current_union_id",
            )?,
            parental_union_id: parse_optional_uuid(
                row.get("parental_union_id")?,
                "members.parental_union_id",
            )?,
        },
        family_lineage_links,
        spouse_id: parse_optional_uuid(row.get("spouse_id")?, "members.spouse_id")?,
        location: LegacyLocation {
            state: row.get("state")?,
            district: row.get("district")?,
            city: row.get("city")?,
            village: row.get("village")?,
        },
        location_names: LocationNames {
            state_name: row.get("state_name")?,
            district_name: row.get("district_name")?,
            taluka_name: row.get("taluka_name")?,
            village_name: row.get("village_name")?,
        },
    };
    member.validate()?;
    Ok(member)
}
