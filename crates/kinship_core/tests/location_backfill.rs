use kinship_core::db::open_db_in_memory;
use kinship_core::location::{GeoEntry, LocationLevel, LookupResponse};
use kinship_core::model::member::LegacyLocation;
use kinship_core::{
    Gender, GeoLookup, LocationBackfill, LookupError, Member, MemberId, MemberRepository,
    ReconcileError, SqliteMemberRepository,
};
use rusqlite::Connection;
use std::cell::RefCell;
use std::sync::atomic::AtomicBool;

#[derive(Default)]
struct FakeGeo {
    states_down: bool,
    districts_down: bool,
    calls: RefCell<Vec<String>>,
}

fn entry(code: &str, id: &str, name: &str) -> GeoEntry {
    GeoEntry {
        code: Some(code.to_string()),
        id: Some(id.to_string()),
        name: name.to_string(),
    }
}

fn answer(entries: Vec<GeoEntry>) -> LookupResponse {
    LookupResponse {
        success: true,
        entries,
    }
}

impl GeoLookup for FakeGeo {
    fn fetch(
        &self,
        level: LocationLevel,
        parent: Option<(&str, &str)>,
    ) -> Result<LookupResponse, LookupError> {
        let call = match parent {
            Some((param, value)) => format!("{}?{param}={value}", level.endpoint()),
            None => level.endpoint().to_string(),
        };
        self.calls.borrow_mut().push(call.clone());
        if level == LocationLevel::State && self.states_down {
            return Err(LookupError::Unavailable("connection refused".to_string()));
        }
        if level == LocationLevel::District && self.districts_down {
            return Err(LookupError::Timeout);
        }
        Ok(match call.as_str() {
            "states" => answer(vec![
                entry("27", "14", "Maharashtra"),
                entry("24", "7", "Gujarat"),
            ]),
            "districts?state_code=27" => answer(vec![entry("521", "88", "Pune")]),
            "districts?state_code=24" => LookupResponse::default(),
            "districts?state_id=24" => answer(vec![entry("474", "31", "Surat")]),
            "talukas?district_code=521" => answer(vec![entry("4101", "900", "Haveli")]),
            _ => LookupResponse::default(),
        })
    }
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn insert(conn: &Connection, first: &str, location: LegacyLocation) -> MemberId {
    let mut member = Member::new(first, Some("Joshi"), Gender::Male);
    member.location = location;
    SqliteMemberRepository::try_new(conn)
        .unwrap()
        .create_member(&member)
        .unwrap()
}

fn load(conn: &Connection, id: MemberId) -> Member {
    SqliteMemberRepository::try_new(conn)
        .unwrap()
        .get_member(id)
        .unwrap()
        .unwrap()
}

fn location(state: &str, district: &str, city: &str, village: &str) -> LegacyLocation {
    let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
    LegacyLocation {
        state: non_empty(state),
        district: non_empty(district),
        city: non_empty(city),
        village: non_empty(village),
    }
}

fn run(conn: &Connection, geo: &FakeGeo) -> Result<kinship_core::ReconcileReport, ReconcileError> {
    LocationBackfill::new(SqliteMemberRepository::try_new(conn).unwrap(), geo)
        .run(&AtomicBool::new(false))
}

#[test]
fn numeric_codes_resolve_through_every_level() {
    let conn = setup();
    let id = insert(&conn, "Ajit", location("27", "521", "4101", "Wagholi"));
    let geo = FakeGeo::default();

    let report = run(&conn, &geo).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.updated, 1);

    let names = load(&conn, id).location_names;
    assert_eq!(names.state_name.as_deref(), Some("Maharashtra"));
    assert_eq!(names.district_name.as_deref(), Some("Pune"));
    assert_eq!(names.taluka_name.as_deref(), Some("Haveli"));
    assert_eq!(names.village_name.as_deref(), Some("Wagholi"));
}

#[test]
fn name_values_are_kept_and_used_to_find_codes() {
    let conn = setup();
    let id = insert(&conn, "Bhushan", location("maharashtra", "Pune", "4101", ""));
    let geo = FakeGeo::default();

    run(&conn, &geo).unwrap();

    let names = load(&conn, id).location_names;
    assert_eq!(names.state_name.as_deref(), Some("maharashtra"));
    assert_eq!(names.district_name.as_deref(), Some("Pune"));
    assert_eq!(names.taluka_name.as_deref(), Some("Haveli"));
    assert_eq!(names.village_name, None);
}

#[test]
fn alternate_parameter_is_used_when_primary_is_unsuccessful() {
    let conn = setup();
    let id = insert(&conn, "Chinmay", location("24", "474", "", ""));
    let geo = FakeGeo::default();

    run(&conn, &geo).unwrap();

    assert_eq!(
        load(&conn, id).location_names.district_name.as_deref(),
        Some("Surat")
    );
    let calls = geo.calls.borrow();
    assert!(calls.contains(&"districts?state_code=24".to_string()));
    assert!(calls.contains(&"districts?state_id=24".to_string()));
}

#[test]
fn unknown_numeric_codes_are_not_written() {
    let conn = setup();
    let id = insert(&conn, "Darshan", location("99", "", "", ""));
    let geo = FakeGeo::default();

    let report = run(&conn, &geo).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(load(&conn, id).location_names.state_name, None);
}

#[test]
fn existing_names_and_correct_full_names_are_left_alone() {
    let conn = setup();
    let mut member = Member::new("Eknath", Some("Joshi"), Gender::Male);
    member.location = location("27", "", "", "");
    member.location_names.state_name = Some("MH".to_string());
    SqliteMemberRepository::try_new(&conn)
        .unwrap()
        .create_member(&member)
        .unwrap();
    let geo = FakeGeo::default();

    let report = run(&conn, &geo).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(
        load(&conn, member.uuid).location_names.state_name.as_deref(),
        Some("MH")
    );
}

#[test]
fn stale_full_name_is_rederived() {
    let conn = setup();
    let id = insert(&conn, "Farhan", LegacyLocation::default());
    conn.execute(
        "UPDATE members SET middle_name = '  Ali ', full_name = 'stale' WHERE uuid = ?1;",
        [id.to_string()],
    )
    .unwrap();
    let geo = FakeGeo::default();

    let report = run(&conn, &geo).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(load(&conn, id).full_name, "Farhan Ali Joshi");

    let rerun = run(&conn, &geo).unwrap();
    assert_eq!(rerun.updated, 0);
    assert_eq!(rerun.unchanged, 1);
}

#[test]
fn district_outage_marks_member_unresolved_and_continues() {
    let conn = setup();
    let needs_district = insert(&conn, "Gaurav", location("27", "521", "", ""));
    let state_only = insert(&conn, "Harsh", location("24", "", "", ""));
    let geo = FakeGeo {
        districts_down: true,
        ..FakeGeo::default()
    };

    let report = run(&conn, &geo).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.unresolved, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(load(&conn, needs_district).location_names.state_name, None);
    assert_eq!(
        load(&conn, state_only).location_names.state_name.as_deref(),
        Some("Gujarat")
    );
}

#[test]
fn states_outage_aborts_the_pass() {
    let conn = setup();
    insert(&conn, "Irfan", location("27", "", "", ""));
    let geo = FakeGeo {
        states_down: true,
        ..FakeGeo::default()
    };

    let err = run(&conn, &geo).unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::ExternalLookupUnavailable(LookupError::Unavailable(_))
    ));
}

#[test]
fn district_lists_are_fetched_once_per_state() {
    let conn = setup();
    insert(&conn, "Jatin", location("27", "521", "", ""));
    insert(&conn, "Kedar", location("27", "521", "", ""));
    let geo = FakeGeo::default();

    run(&conn, &geo).unwrap();
    let district_calls = geo
        .calls
        .borrow()
        .iter()
        .filter(|call| call.starts_with("districts"))
        .count();
    assert_eq!(district_calls, 1);
}
