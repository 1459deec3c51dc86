//! Relationship derivation use-case service.
//!
//! # Responsibility
//! - Filter the member population into eligible candidates for a relation
//!   slot.
//! - Serve the family network view from the cached `family_lineage_links`.
//! - Own the one derivation that recomputes that cache from union edges.
//!
//! # Invariants
//! - Network reads never fail on partial data: missing branches are empty
//!   and dangling references are dropped.
//! - The cache is only written through `refresh_*` functions in this module.
//! - Derivation reads edges, never member back-pointers.

use crate::model::member::{
    FamilyLineageLinks, Gender, ImmediateRelations, InLawRelations, MaritalStatus,
    MaternalRelations, Member, MemberId, PaternalRelations,
};
use crate::model::relation::RelationType;
use crate::model::union::{select_current_union, select_parental_union, Union};
use crate::repo::member_repo::{MemberListQuery, MemberRepository};
use crate::repo::union_repo::UnionRepository;
use crate::repo::{RepoError, RepoResult};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Upper bound on eligible-candidate results.
pub const ELIGIBLE_CANDIDATE_LIMIT: u32 = 200;

/// Member-to-member hops whose cached views can change after one edge
/// mutation (e.g. a nephew's `kaki` after his uncle marries).
pub const REFRESH_NEIGHBORHOOD_DEPTH: usize = 2;

/// Outcome of one cache refresh batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineageRefresh {
    pub refreshed: usize,
    /// Members whose derivation or write failed; their cache is left as is.
    pub failed: usize,
}

/// Errors from relation service operations.
#[derive(Debug)]
pub enum RelationServiceError {
    MemberNotFound(MemberId),
    Repo(RepoError),
}

impl Display for RelationServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RelationServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::MemberNotFound(_) => None,
        }
    }
}

impl From<RepoError> for RelationServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "member",
                id,
            } => Self::MemberNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Eligible-candidate request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleQuery {
    /// Relation wire name (`father`, `spouse`, `mausi`, ...). Unknown names
    /// apply no gender filter.
    pub relation: String,
    /// Requesting member's gender; only consulted for `spouse`.
    pub requester_gender: Option<Gender>,
    pub exclude_id: Option<MemberId>,
}

/// Projection of a member returned by candidate and network reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub uuid: MemberId,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    pub city: Option<String>,
    pub village: Option<String>,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            uuid: member.uuid,
            first_name: member.first_name.clone(),
            middle_name: member.middle_name.clone(),
            last_name: member.last_name.clone(),
            gender: member.gender,
            marital_status: member.marital_status,
            city: member.location.city.clone(),
            village: member.location.village.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSubject {
    pub uuid: MemberId,
    /// `first last`.
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedImmediate {
    pub father: Option<MemberSummary>,
    pub mother: Option<MemberSummary>,
    pub spouse: Option<MemberSummary>,
    pub siblings: Vec<MemberSummary>,
    pub children: Vec<MemberSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedPaternal {
    pub dada: Option<MemberSummary>,
    pub dadi: Option<MemberSummary>,
    pub kaka: Vec<MemberSummary>,
    pub kaki: Vec<MemberSummary>,
    pub bua: Vec<MemberSummary>,
    pub fufa: Vec<MemberSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedMaternal {
    pub nana: Option<MemberSummary>,
    pub nani: Option<MemberSummary>,
    pub mama: Vec<MemberSummary>,
    pub mami: Vec<MemberSummary>,
    pub mausi: Vec<MemberSummary>,
    pub mausa: Vec<MemberSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedInLaws {
    pub father_in_law: Option<MemberSummary>,
    pub mother_in_law: Option<MemberSummary>,
    pub jija: Vec<MemberSummary>,
    pub saala: Vec<MemberSummary>,
    pub saali: Vec<MemberSummary>,
}

/// Populated family network for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyNetwork {
    pub member: NetworkSubject,
    pub immediate_relations: ResolvedImmediate,
    pub paternal: ResolvedPaternal,
    pub maternal: ResolvedMaternal,
    pub in_laws: ResolvedInLaws,
}

/// Relationship derivation facade over member and union repositories.
pub struct RelationService<M: MemberRepository, U: UnionRepository> {
    members: M,
    unions: U,
}

impl<M: MemberRepository, U: UnionRepository> RelationService<M, U> {
    pub fn new(members: M, unions: U) -> Self {
        Self { members, unions }
    }

    /// Lists members eligible for `query.relation`.
    ///
    /// # Contract
    /// - Gender filter comes from the relation's `GenderConstraint`.
    /// - `spouse` also restricts to `Single` / `Married` members.
    /// - At most `ELIGIBLE_CANDIDATE_LIMIT` rows, `first_name ASC`.
    pub fn eligible_candidates(&self, query: &EligibleQuery) -> RepoResult<Vec<MemberSummary>> {
        let relation = RelationType::parse(query.relation.as_str());
        let gender = relation
            .and_then(|relation| relation.gender_constraint().resolve(query.requester_gender));
        let marital_statuses = if relation == Some(RelationType::Spouse) {
            vec![MaritalStatus::Single, MaritalStatus::Married]
        } else {
            Vec::new()
        };

        let members = self.members.list_members(&MemberListQuery {
            gender,
            marital_statuses,
            exclude_id: query.exclude_id,
            limit: Some(ELIGIBLE_CANDIDATE_LIMIT),
        })?;
        Ok(members.iter().map(MemberSummary::from).collect())
    }

    /// Returns the populated network from the member's cached links.
    pub fn family_network(&self, id: MemberId) -> Result<FamilyNetwork, RelationServiceError> {
        let member = self
            .members
            .get_member(id)?
            .ok_or(RelationServiceError::MemberNotFound(id))?;
        let links = &member.family_lineage_links;
        let immediate = &links.immediate_relations;
        let paternal = &links.extended_network.paternal;
        let maternal = &links.extended_network.maternal;
        let in_laws = &links.extended_network.in_laws;
        let mut resolver = SummaryResolver::new(&self.members);

        Ok(FamilyNetwork {
            member: NetworkSubject {
                uuid: member.uuid,
                name: member.display_name(),
            },
            immediate_relations: ResolvedImmediate {
                father: resolver.one(immediate.father_id)?,
                mother: resolver.one(immediate.mother_id)?,
                spouse: resolver.one(immediate.spouse_id)?,
                siblings: resolver.many(&immediate.siblings_ids)?,
                children: resolver.many(&immediate.children_ids)?,
            },
            paternal: ResolvedPaternal {
                dada: resolver.one(paternal.dada_id)?,
                dadi: resolver.one(paternal.dadi_id)?,
                kaka: resolver.many(&paternal.kaka_ids)?,
                kaki: resolver.many(&paternal.kaki_ids)?,
                bua: resolver.many(&paternal.bua_ids)?,
                fufa: resolver.many(&paternal.fufa_ids)?,
            },
            maternal: ResolvedMaternal {
                nana: resolver.one(maternal.nana_id)?,
                nani: resolver.one(maternal.nani_id)?,
                mama: resolver.many(&maternal.mama_ids)?,
                mami: resolver.many(&maternal.mami_ids)?,
                mausi: resolver.many(&maternal.mausi_ids)?,
                mausa: resolver.many(&maternal.mausa_ids)?,
            },
            in_laws: ResolvedInLaws {
                father_in_law: resolver.one(in_laws.father_in_law_id)?,
                mother_in_law: resolver.one(in_laws.mother_in_law_id)?,
                jija: resolver.many(&in_laws.jija_ids)?,
                saala: resolver.many(&in_laws.saala_ids)?,
                saali: resolver.many(&in_laws.saali_ids)?,
            },
        })
    }

    /// Computes (without storing) the lineage links for one member.
    pub fn derive_family_links(
        &self,
        id: MemberId,
    ) -> Result<FamilyLineageLinks, RelationServiceError> {
        if self.members.get_member(id)?.is_none() {
            return Err(RelationServiceError::MemberNotFound(id));
        }
        Ok(derive_family_links(&self.members, &self.unions, id)?)
    }

    /// Recomputes and stores the cache for `ids`.
    pub fn refresh_family_links(&self, ids: &[MemberId]) -> LineageRefresh {
        refresh_family_links(&self.members, &self.unions, ids)
    }

    /// Recomputes and stores the cache for every member.
    pub fn refresh_all_family_links(&self) -> RepoResult<LineageRefresh> {
        let ids = self.members.list_member_ids()?;
        Ok(refresh_family_links(&self.members, &self.unions, &ids))
    }
}

/// Derives one member's lineage links from union edges.
pub fn derive_family_links<M: MemberRepository, U: UnionRepository>(
    members: &M,
    unions: &U,
    id: MemberId,
) -> RepoResult<FamilyLineageLinks> {
    KinshipGraph::new(members, unions).derive(id)
}

/// Recomputes and stores lineage links for `ids`.
///
/// A member that fails is logged and counted; the batch continues.
pub fn refresh_family_links<M: MemberRepository, U: UnionRepository>(
    members: &M,
    unions: &U,
    ids: &[MemberId],
) -> LineageRefresh {
    let started_at = Instant::now();
    let mut graph = KinshipGraph::new(members, unions);
    let mut outcome = LineageRefresh::default();
    for id in ids {
        let written = graph
            .derive(*id)
            .and_then(|links| members.set_family_links(*id, &links));
        match written {
            Ok(()) => outcome.refreshed += 1,
            Err(err) => {
                warn!(
                    "event=lineage_refresh module=relation status=error member={} error={}",
                    id, err
                );
                outcome.failed += 1;
            }
        }
    }
    let status = if outcome.failed == 0 { "ok" } else { "partial" };
    info!(
        "event=lineage_refresh module=relation status={} members={} failed={} duration_ms={}",
        status,
        outcome.refreshed,
        outcome.failed,
        started_at.elapsed().as_millis()
    );
    outcome
}

/// Refreshes every member within `REFRESH_NEIGHBORHOOD_DEPTH` hops of `seeds`.
pub fn refresh_neighborhood<M: MemberRepository, U: UnionRepository>(
    members: &M,
    unions: &U,
    seeds: &[MemberId],
) -> RepoResult<LineageRefresh> {
    let affected = kinship_neighborhood(unions, seeds, REFRESH_NEIGHBORHOOD_DEPTH)?;
    let ids = affected.into_iter().collect::<Vec<_>>();
    Ok(refresh_family_links(members, unions, &ids))
}

/// Collects members reachable from `seeds` through partner/child edges in at
/// most `depth` hops. Seeds are always included.
pub fn kinship_neighborhood<U: UnionRepository>(
    unions: &U,
    seeds: &[MemberId],
    depth: usize,
) -> RepoResult<BTreeSet<MemberId>> {
    let mut visited = seeds.iter().copied().collect::<BTreeSet<_>>();
    let mut frontier = visited.iter().copied().collect::<Vec<_>>();

    for _ in 0..depth {
        let mut next = Vec::new();
        for id in frontier {
            for union in unions.list_by_member(id)? {
                let neighbors = [union.husband_id, union.wife_id]
                    .into_iter()
                    .chain(union.children_ids.iter().copied());
                for neighbor in neighbors {
                    if visited.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(visited)
}

/// Memoized read-only view of the edge graph for one derivation batch.
struct KinshipGraph<'a, M, U> {
    members: &'a M,
    unions: &'a U,
    edges: HashMap<MemberId, Vec<Union>>,
    genders: HashMap<MemberId, Option<Gender>>,
}

impl<'a, M: MemberRepository, U: UnionRepository> KinshipGraph<'a, M, U> {
    fn new(members: &'a M, unions: &'a U) -> Self {
        Self {
            members,
            unions,
            edges: HashMap::new(),
            genders: HashMap::new(),
        }
    }

    fn derive(&mut self, id: MemberId) -> RepoResult<FamilyLineageLinks> {
        let (father, mother) = self.parents(id)?;
        let spouse = self.spouse(id)?;

        let immediate = ImmediateRelations {
            father_id: father,
            mother_id: mother,
            spouse_id: spouse,
            siblings_ids: self.siblings(id)?,
            children_ids: self.children(id)?,
        };

        let mut paternal = PaternalRelations::default();
        if let Some(father) = father {
            (paternal.dada_id, paternal.dadi_id) = self.parents(father)?;
            paternal.kaka_ids = self.siblings_with_gender(father, Gender::Male)?;
            paternal.kaki_ids = self.spouses_of(&paternal.kaka_ids)?;
            paternal.bua_ids = self.siblings_with_gender(father, Gender::Female)?;
            paternal.fufa_ids = self.spouses_of(&paternal.bua_ids)?;
        }

        let mut maternal = MaternalRelations::default();
        if let Some(mother) = mother {
            (maternal.nana_id, maternal.nani_id) = self.parents(mother)?;
            maternal.mama_ids = self.siblings_with_gender(mother, Gender::Male)?;
            maternal.mami_ids = self.spouses_of(&maternal.mama_ids)?;
            maternal.mausi_ids = self.siblings_with_gender(mother, Gender::Female)?;
            maternal.mausa_ids = self.spouses_of(&maternal.mausi_ids)?;
        }

        let mut in_laws = InLawRelations::default();
        if let Some(spouse) = spouse {
            (in_laws.father_in_law_id, in_laws.mother_in_law_id) = self.parents(spouse)?;
            in_laws.saala_ids = self.siblings_with_gender(spouse, Gender::Male)?;
            in_laws.saali_ids = self.siblings_with_gender(spouse, Gender::Female)?;
        }
        let sisters = self.siblings_with_gender(id, Gender::Female)?;
        in_laws.jija_ids = self.spouses_of(&sisters)?;

        let mut links = FamilyLineageLinks {
            immediate_relations: immediate,
            ..FamilyLineageLinks::default()
        };
        links.extended_network.paternal = paternal;
        links.extended_network.maternal = maternal;
        links.extended_network.in_laws = in_laws;
        Ok(links)
    }

    fn unions_of(&mut self, id: MemberId) -> RepoResult<&[Union]> {
        if !self.edges.contains_key(&id) {
            let loaded = self.unions.list_by_member(id)?;
            self.edges.insert(id, loaded);
        }
        Ok(self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn gender_of(&mut self, id: MemberId) -> RepoResult<Option<Gender>> {
        if let Some(gender) = self.genders.get(&id) {
            return Ok(*gender);
        }
        let gender = self.members.get_member(id)?.map(|member| member.gender);
        self.genders.insert(id, gender);
        Ok(gender)
    }

    fn parents(&mut self, id: MemberId) -> RepoResult<(Option<MemberId>, Option<MemberId>)> {
        let unions = self.unions_of(id)?;
        Ok(select_parental_union(unions, id)
            .map(|union| (Some(union.husband_id), Some(union.wife_id)))
            .unwrap_or((None, None)))
    }

    fn spouse(&mut self, id: MemberId) -> RepoResult<Option<MemberId>> {
        let unions = self.unions_of(id)?;
        Ok(select_current_union(unions, id).and_then(|union| union.other_partner(id)))
    }

    fn siblings(&mut self, id: MemberId) -> RepoResult<Vec<MemberId>> {
        let unions = self.unions_of(id)?;
        Ok(select_parental_union(unions, id)
            .map(|union| {
                union
                    .children_ids
                    .iter()
                    .copied()
                    .filter(|child| *child != id)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Children of every union `id` partners in, Deceased unions included.
    fn children(&mut self, id: MemberId) -> RepoResult<Vec<MemberId>> {
        let unions = self.unions_of(id)?;
        let mut children = Vec::new();
        for union in unions.iter().filter(|union| union.is_partner(id)) {
            for child in &union.children_ids {
                if !children.contains(child) {
                    children.push(*child);
                }
            }
        }
        Ok(children)
    }

    fn siblings_with_gender(&mut self, id: MemberId, gender: Gender) -> RepoResult<Vec<MemberId>> {
        let mut matching = Vec::new();
        for sibling in self.siblings(id)? {
            if self.gender_of(sibling)? == Some(gender) {
                matching.push(sibling);
            }
        }
        Ok(matching)
    }

    fn spouses_of(&mut self, ids: &[MemberId]) -> RepoResult<Vec<MemberId>> {
        let mut spouses = Vec::new();
        for id in ids {
            if let Some(spouse) = self.spouse(*id)? {
                if !spouses.contains(&spouse) {
                    spouses.push(spouse);
                }
            }
        }
        Ok(spouses)
    }
}

/// Resolves cached references to summaries, dropping dangling ids.
struct SummaryResolver<'a, M> {
    members: &'a M,
    cache: HashMap<MemberId, Option<MemberSummary>>,
}

impl<'a, M: MemberRepository> SummaryResolver<'a, M> {
    fn new(members: &'a M) -> Self {
        Self {
            members,
            cache: HashMap::new(),
        }
    }

    fn one(&mut self, id: Option<MemberId>) -> RepoResult<Option<MemberSummary>> {
        let Some(id) = id else {
            return Ok(None);
        };
        if let Some(summary) = self.cache.get(&id) {
            return Ok(summary.clone());
        }
        let summary = self
            .members
            .get_member(id)?
            .map(|member| MemberSummary::from(&member));
        if summary.is_none() {
            debug!("event=family_network module=relation status=skip reason=dangling_ref member={id}");
        }
        self.cache.insert(id, summary.clone());
        Ok(summary)
    }

    fn many(&mut self, ids: &[MemberId]) -> RepoResult<Vec<MemberSummary>> {
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(summary) = self.one(Some(*id))? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }
}
