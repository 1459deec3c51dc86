use kinship_core::db::open_db_in_memory;
use kinship_core::service::relation_service::{kinship_neighborhood, ELIGIBLE_CANDIDATE_LIMIT};
use kinship_core::{
    CreateUnionRequest, EligibleQuery, Gender, MaritalStatus, Member, MemberId, MemberRepository,
    RelationService, RelationServiceError, SqliteMemberRepository, SqliteUnionRepository, Union,
    UnionService,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn members(conn: &Connection) -> SqliteMemberRepository<'_> {
    SqliteMemberRepository::try_new(conn).unwrap()
}

fn relations(conn: &Connection) -> RelationService<SqliteMemberRepository<'_>, SqliteUnionRepository<'_>> {
    RelationService::new(members(conn), SqliteUnionRepository::try_new(conn).unwrap())
}

fn person(conn: &Connection, first: &str, gender: Gender) -> MemberId {
    members(conn)
        .create_member(&Member::new(first, Some("Verma"), gender))
        .unwrap()
}

fn marry(conn: &Connection, husband: MemberId, wife: MemberId, children: &[MemberId]) -> Union {
    let service = UnionService::new(members(conn), SqliteUnionRepository::try_new(conn).unwrap());
    let mut request = CreateUnionRequest::new(husband, wife);
    request.children_ids = children.to_vec();
    service.create_union(request).unwrap()
}

struct Family {
    me: MemberId,
    wife: MemberId,
    father: MemberId,
    mother: MemberId,
    sister: MemberId,
    brother: MemberId,
    dada: MemberId,
    dadi: MemberId,
    kaka: MemberId,
    kaki: MemberId,
    bua: MemberId,
    fufa: MemberId,
    nana: MemberId,
    nani: MemberId,
    mama: MemberId,
    mami: MemberId,
    mausi: MemberId,
    mausa: MemberId,
    father_in_law: MemberId,
    mother_in_law: MemberId,
    saala: MemberId,
    saali: MemberId,
    jija: MemberId,
}

fn build_family(conn: &Connection) -> Family {
    let family = Family {
        me: person(conn, "Aarav", Gender::Male),
        wife: person(conn, "Isha", Gender::Female),
        father: person(conn, "Rajesh", Gender::Male),
        mother: person(conn, "Sunita", Gender::Female),
        sister: person(conn, "Priya", Gender::Female),
        brother: person(conn, "Kabir", Gender::Male),
        dada: person(conn, "Shankar", Gender::Male),
        dadi: person(conn, "Parvati", Gender::Female),
        kaka: person(conn, "Mahesh", Gender::Male),
        kaki: person(conn, "Rekha", Gender::Female),
        bua: person(conn, "Kamla", Gender::Female),
        fufa: person(conn, "Dinesh", Gender::Male),
        nana: person(conn, "Gopal", Gender::Male),
        nani: person(conn, "Savitri", Gender::Female),
        mama: person(conn, "Vinod", Gender::Male),
        mami: person(conn, "Seema", Gender::Female),
        mausi: person(conn, "Asha", Gender::Female),
        mausa: person(conn, "Naresh", Gender::Male),
        father_in_law: person(conn, "Prakash", Gender::Male),
        mother_in_law: person(conn, "Usha", Gender::Female),
        saala: person(conn, "Rohan", Gender::Male),
        saali: person(conn, "Neha", Gender::Female),
        jija: person(conn, "Amit", Gender::Male),
    };

    marry(conn, family.dada, family.dadi, &[family.father, family.kaka, family.bua]);
    marry(conn, family.nana, family.nani, &[family.mother, family.mama, family.mausi]);
    marry(conn, family.father, family.mother, &[family.me, family.sister, family.brother]);
    marry(conn, family.kaka, family.kaki, &[]);
    marry(conn, family.fufa, family.bua, &[]);
    marry(conn, family.mama, family.mami, &[]);
    marry(conn, family.mausa, family.mausi, &[]);
    marry(
        conn,
        family.father_in_law,
        family.mother_in_law,
        &[family.wife, family.saala, family.saali],
    );
    marry(conn, family.me, family.wife, &[]);
    marry(conn, family.jija, family.sister, &[]);
    family
}

#[test]
fn derivation_fills_every_branch_from_edges() {
    let conn = setup();
    let family = build_family(&conn);
    let links = relations(&conn).derive_family_links(family.me).unwrap();

    let immediate = &links.immediate_relations;
    assert_eq!(immediate.father_id, Some(family.father));
    assert_eq!(immediate.mother_id, Some(family.mother));
    assert_eq!(immediate.spouse_id, Some(family.wife));
    assert_eq!(immediate.siblings_ids, vec![family.sister, family.brother]);
    assert!(immediate.children_ids.is_empty());

    let paternal = &links.extended_network.paternal;
    assert_eq!(paternal.dada_id, Some(family.dada));
    assert_eq!(paternal.dadi_id, Some(family.dadi));
    assert_eq!(paternal.kaka_ids, vec![family.kaka]);
    assert_eq!(paternal.kaki_ids, vec![family.kaki]);
    assert_eq!(paternal.bua_ids, vec![family.bua]);
    assert_eq!(paternal.fufa_ids, vec![family.fufa]);

    let maternal = &links.extended_network.maternal;
    assert_eq!(maternal.nana_id, Some(family.nana));
    assert_eq!(maternal.nani_id, Some(family.nani));
    assert_eq!(maternal.mama_ids, vec![family.mama]);
    assert_eq!(maternal.mami_ids, vec![family.mami]);
    assert_eq!(maternal.mausi_ids, vec![family.mausi]);
    assert_eq!(maternal.mausa_ids, vec![family.mausa]);

    let in_laws = &links.extended_network.in_laws;
    assert_eq!(in_laws.father_in_law_id, Some(family.father_in_law));
    assert_eq!(in_laws.mother_in_law_id, Some(family.mother_in_law));
    assert_eq!(in_laws.saala_ids, vec![family.saala]);
    assert_eq!(in_laws.saali_ids, vec![family.saali]);
    assert_eq!(in_laws.jija_ids, vec![family.jija]);
}

#[test]
fn incremental_refreshes_match_full_recompute() {
    let conn = setup();
    let family = build_family(&conn);
    let repo = members(&conn);

    let ids = repo.list_member_ids().unwrap();
    let cached = ids
        .iter()
        .map(|id| repo.get_member(*id).unwrap().unwrap().family_lineage_links)
        .collect::<Vec<_>>();

    let refreshed = relations(&conn).refresh_all_family_links().unwrap();
    assert_eq!(refreshed.refreshed, ids.len());
    assert_eq!(refreshed.failed, 0);
    let recomputed = ids
        .iter()
        .map(|id| repo.get_member(*id).unwrap().unwrap().family_lineage_links)
        .collect::<Vec<_>>();
    assert_eq!(cached, recomputed);

    let me = repo.get_member(family.me).unwrap().unwrap();
    assert_eq!(
        me.family_lineage_links.extended_network.paternal.kaki_ids,
        vec![family.kaki]
    );
}

#[test]
fn family_network_resolves_cached_references() {
    let conn = setup();
    let family = build_family(&conn);
    let network = relations(&conn).family_network(family.me).unwrap();

    assert_eq!(network.member.uuid, family.me);
    assert_eq!(network.member.name, "Aarav Verma");
    assert_eq!(
        network
            .immediate_relations
            .father
            .as_ref()
            .map(|summary| summary.first_name.as_str()),
        Some("Rajesh")
    );
    assert_eq!(
        network
            .immediate_relations
            .siblings
            .iter()
            .map(|summary| summary.uuid)
            .collect::<Vec<_>>(),
        vec![family.sister, family.brother]
    );
    assert_eq!(network.paternal.kaka.len(), 1);
    assert_eq!(network.maternal.mausa[0].uuid, family.mausa);
    assert_eq!(network.in_laws.jija[0].gender, Gender::Male);

    let json = serde_json::to_value(&network).unwrap();
    assert_eq!(json["member"]["name"], "Aarav Verma");
    assert!(json["in_laws"]["saali"].is_array());
}

#[test]
fn family_network_drops_dangling_references() {
    let conn = setup();
    let family = build_family(&conn);
    let repo = members(&conn);

    let mut links = repo
        .get_member(family.brother)
        .unwrap()
        .unwrap()
        .family_lineage_links;
    let ghost = Uuid::new_v4();
    links.immediate_relations.siblings_ids.push(ghost);
    links.immediate_relations.spouse_id = Some(ghost);
    repo.set_family_links(family.brother, &links).unwrap();

    let network = relations(&conn).family_network(family.brother).unwrap();
    assert_eq!(network.immediate_relations.spouse, None);
    assert_eq!(network.immediate_relations.siblings.len(), 2);
}

#[test]
fn family_network_of_isolated_member_is_empty() {
    let conn = setup();
    let loner = person(&conn, "Om", Gender::Male);
    let network = relations(&conn).family_network(loner).unwrap();

    assert_eq!(network.immediate_relations.father, None);
    assert!(network.immediate_relations.children.is_empty());
    assert!(network.paternal.kaka.is_empty());
    assert_eq!(network.in_laws.father_in_law, None);

    let err = relations(&conn).family_network(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, RelationServiceError::MemberNotFound(_)));
}

#[test]
fn deceased_union_keeps_parent_child_edges_but_drops_spouse() {
    let conn = setup();
    let husband = person(&conn, "Anil", Gender::Male);
    let wife = person(&conn, "Bharti", Gender::Female);
    let child = person(&conn, "Chhaya", Gender::Female);
    let union = marry(&conn, husband, wife, &[child]);

    let service = UnionService::new(members(&conn), SqliteUnionRepository::try_new(&conn).unwrap());
    service.soft_delete(union.uuid).unwrap();

    let engine = relations(&conn);
    let child_links = engine.derive_family_links(child).unwrap();
    assert_eq!(child_links.immediate_relations.father_id, Some(husband));
    assert_eq!(child_links.immediate_relations.mother_id, Some(wife));

    let husband_links = engine.derive_family_links(husband).unwrap();
    assert_eq!(husband_links.immediate_relations.spouse_id, None);
    assert_eq!(husband_links.immediate_relations.children_ids, vec![child]);

    let wife_network = engine.family_network(wife).unwrap();
    assert_eq!(wife_network.immediate_relations.spouse, None);
    assert_eq!(
        wife_network
            .immediate_relations
            .children
            .iter()
            .map(|summary| summary.uuid)
            .collect::<Vec<_>>(),
        vec![child]
    );
}

fn corrupt_cache(conn: &Connection, id: MemberId) {
    conn.execute(
        "UPDATE members SET family_lineage_links = '{not json' WHERE uuid = ?1;",
        [id.to_string()],
    )
    .unwrap();
}

#[test]
fn unreadable_cache_row_does_not_block_reads_or_refresh() {
    let conn = setup();
    let husband = person(&conn, "Kishore", Gender::Male);
    let wife = person(&conn, "Lata", Gender::Female);
    let first = person(&conn, "Mohan", Gender::Male);
    let second = person(&conn, "Nisha", Gender::Female);
    marry(&conn, husband, wife, &[first, second]);
    corrupt_cache(&conn, second);

    let engine = relations(&conn);
    let network = engine.family_network(first).unwrap();
    assert_eq!(network.immediate_relations.siblings.len(), 1);
    assert_eq!(network.immediate_relations.siblings[0].uuid, second);

    let broken = engine.family_network(second).unwrap();
    assert_eq!(broken.immediate_relations.father, None);

    let refreshed = engine.refresh_all_family_links().unwrap();
    assert_eq!(refreshed.refreshed, 4);
    assert_eq!(refreshed.failed, 0);

    let rebuilt = engine.family_network(second).unwrap();
    assert_eq!(
        rebuilt.immediate_relations.father.map(|summary| summary.uuid),
        Some(husband)
    );
    let raw: String = conn
        .query_row(
            "SELECT family_lineage_links FROM members WHERE uuid = ?1;",
            [second.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
}

#[test]
fn refresh_counts_failing_members_and_continues() {
    let conn = setup();
    let husband = person(&conn, "Prakash", Gender::Male);
    let wife = person(&conn, "Rekha", Gender::Female);
    let son = person(&conn, "Sachin", Gender::Male);
    let daughter = person(&conn, "Tanvi", Gender::Female);
    marry(&conn, husband, wife, &[son, daughter]);

    conn.execute_batch("PRAGMA ignore_check_constraints = ON;").unwrap();
    conn.execute(
        "UPDATE members SET gender = 'Unknown' WHERE uuid = ?1;",
        [daughter.to_string()],
    )
    .unwrap();
    conn.execute_batch("PRAGMA ignore_check_constraints = OFF;").unwrap();

    let refreshed = relations(&conn).refresh_all_family_links().unwrap();
    assert_eq!(refreshed.failed, 1);
    assert_eq!(refreshed.refreshed, 3);

    let father = members(&conn).get_member(husband).unwrap().unwrap();
    assert_eq!(
        father.family_lineage_links.immediate_relations.children_ids,
        vec![son, daughter]
    );
}

#[test]
fn neighborhood_reaches_two_member_hops() {
    let conn = setup();
    let family = build_family(&conn);
    let unions = SqliteUnionRepository::try_new(&conn).unwrap();

    let around_kaki = kinship_neighborhood(&unions, &[family.kaki], 2).unwrap();
    assert!(around_kaki.contains(&family.kaka));
    assert!(around_kaki.contains(&family.father));
    assert!(!around_kaki.contains(&family.me));

    let around_kaka = kinship_neighborhood(&unions, &[family.kaka], 2).unwrap();
    assert!(around_kaka.contains(&family.me));
    assert!(!around_kaka.contains(&family.wife));
}

#[test]
fn eligible_candidates_apply_gender_filter_and_order() {
    let conn = setup();
    let requester = person(&conn, "Yogesh", Gender::Male);
    let zeenat = person(&conn, "Zeenat", Gender::Female);
    let anjali = person(&conn, "Anjali", Gender::Female);
    let bhavesh = person(&conn, "Bhavesh", Gender::Male);
    let engine = relations(&conn);

    let mausi = engine
        .eligible_candidates(&EligibleQuery {
            relation: "mausi".to_string(),
            ..EligibleQuery::default()
        })
        .unwrap();
    assert_eq!(
        mausi.iter().map(|summary| summary.uuid).collect::<Vec<_>>(),
        vec![anjali, zeenat]
    );

    let fathers = engine
        .eligible_candidates(&EligibleQuery {
            relation: "father".to_string(),
            requester_gender: None,
            exclude_id: Some(requester),
        })
        .unwrap();
    assert_eq!(
        fathers.iter().map(|summary| summary.uuid).collect::<Vec<_>>(),
        vec![bhavesh]
    );

    let anyone = engine
        .eligible_candidates(&EligibleQuery {
            relation: "neighbour".to_string(),
            ..EligibleQuery::default()
        })
        .unwrap();
    assert_eq!(anyone.len(), 4);
    assert_eq!(anyone[0].first_name, "Anjali");
}

#[test]
fn spouse_candidates_are_opposite_gender_and_unwidowed() {
    let conn = setup();
    let requester = person(&conn, "Kunal", Gender::Male);
    let single = person(&conn, "Lata", Gender::Female);
    let repo = members(&conn);
    let mut widowed = Member::new("Mala", None, Gender::Female);
    widowed.marital_status = MaritalStatus::Widowed;
    repo.create_member(&widowed).unwrap();
    let man = person(&conn, "Nitin", Gender::Male);
    let engine = relations(&conn);

    let for_male = engine
        .eligible_candidates(&EligibleQuery {
            relation: "spouse".to_string(),
            requester_gender: Some(Gender::Male),
            exclude_id: Some(requester),
        })
        .unwrap();
    assert_eq!(
        for_male.iter().map(|summary| summary.uuid).collect::<Vec<_>>(),
        vec![single]
    );

    let unknown_requester = engine
        .eligible_candidates(&EligibleQuery {
            relation: "spouse".to_string(),
            ..EligibleQuery::default()
        })
        .unwrap();
    assert_eq!(
        unknown_requester
            .iter()
            .map(|summary| summary.uuid)
            .collect::<Vec<_>>(),
        vec![requester, man]
    );
}

#[test]
fn eligible_candidates_are_capped() {
    let conn = setup();
    let repo = members(&conn);
    for index in 0..(ELIGIBLE_CANDIDATE_LIMIT + 5) {
        repo.create_member(&Member::new(format!("Sister{index:03}"), None, Gender::Female))
            .unwrap();
    }

    let candidates = relations(&conn)
        .eligible_candidates(&EligibleQuery {
            relation: "sibling".to_string(),
            ..EligibleQuery::default()
        })
        .unwrap();
    assert_eq!(candidates.len(), ELIGIBLE_CANDIDATE_LIMIT as usize);
    assert_eq!(candidates[0].first_name, "Sister000");
    assert!(candidates
        .windows(2)
        .all(|pair| pair[0].first_name <= pair[1].first_name));
}
