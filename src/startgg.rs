use {
    async_trait::async_trait,
    graphql_client::{
        GraphQLQuery,
        QueryBody,
    },
    crate::{
        http::{
            self,
            detailed_error_for_status,
            json_with_text_in_error,
        },
        prelude::*,
    },
};

/// From https://dev.start.gg/docs/rate-limits:
///
/// > You may not average more than 80 requests per 60 seconds.
const RATE_LIMIT: Duration = Duration::from_millis(60_000 / 80);

const API_URL: &str = "https://api.start.gg/gql/alpha";

// page sizes stay below start.gg's query complexity limit
const SEEDS_PER_PAGE: i64 = 100;
const SETS_PER_PAGE: i64 = 60;
const STANDINGS_PER_PAGE: i64 = 400;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Http(#[from] http::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("{} GraphQL errors", .0.len())]
    GraphQL(Vec<graphql_client::Error>),
    #[error("GraphQL response returned neither `data` nor `errors`")]
    NoDataNoErrors,
    #[error("no match on {0}, event slug may be wrong")]
    NoQueryMatch(&'static str),
    #[error("event has no phases")]
    NoPhases,
    #[error("set {set} has an unexpected format: {reason}")]
    MalformedSet {
        set: ID,
        reason: &'static str,
    },
    #[error("entrant {entrant} in set {set} has no seed in the first phase")]
    UnknownEntrant {
        entrant: ID,
        set: ID,
    },
    #[error("entrant {entrant} was eliminated in set {set} but has no standing (standings must be fetched right before sets)")]
    MissingStanding {
        entrant: ID,
        set: ID,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdInner {
    Number(serde_json::Number),
    String(String),
}

impl From<IdInner> for ID {
    fn from(inner: IdInner) -> Self {
        Self(match inner {
            IdInner::Number(n) => n.to_string(),
            IdInner::String(s) => s,
        })
    }
}

/// start.gg IDs are sometimes returned as numbers and sometimes as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(from = "IdInner", into = "String")]
pub(crate) struct ID(pub(crate) String);

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ID> for String {
    fn from(ID(s): ID) -> Self {
        s
    }
}

macro_rules! startgg_query {
    ($name:ident, $module:ident, $path:literal) => {
        pub(crate) struct $name;

        impl GraphQLQuery for $name {
            type Variables = $module::Variables;
            type ResponseData = $module::ResponseData;

            fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
                QueryBody {
                    variables,
                    query: include_str!(concat!("../assets/graphql/", $path)),
                    operation_name: stringify!($name),
                }
            }
        }
    };
}

startgg_query!(EventNameQuery, event_name_query, "startgg-event-name-query.graphql");
startgg_query!(PhasesQuery, phases_query, "startgg-phases-query.graphql");
startgg_query!(SeedsQuery, seeds_query, "startgg-seeds-query.graphql");
startgg_query!(StandingsQuery, standings_query, "startgg-standings-query.graphql");
startgg_query!(CompletedSetsQuery, completed_sets_query, "startgg-completed-sets-query.graphql");

pub(crate) mod event_name_query {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) event_slug: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) event: Option<EventNameQueryEvent>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct EventNameQueryEvent {
        pub(crate) name: Option<String>,
        pub(crate) tournament: Option<EventNameQueryEventTournament>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct EventNameQueryEventTournament {
        pub(crate) name: Option<String>,
    }
}

pub(crate) mod phases_query {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) event_slug: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) event: Option<PhasesQueryEvent>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct PhasesQueryEvent {
        pub(crate) phases: Option<Vec<Option<PhasesQueryEventPhases>>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct PhasesQueryEventPhases {
        pub(crate) id: Option<ID>,
        pub(crate) name: Option<String>,
        pub(crate) phase_order: Option<i64>,
    }
}

pub(crate) mod seeds_query {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) event_slug: String,
        pub(crate) page: i64,
        pub(crate) per_page: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) event: Option<SeedsQueryEvent>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct SeedsQueryEvent {
        pub(crate) entrants: Option<SeedsQueryEventEntrants>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct SeedsQueryEventEntrants {
        pub(crate) page_info: Option<PageInfo>,
        pub(crate) nodes: Option<Vec<Option<SeedsQueryEventEntrantsNodes>>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct SeedsQueryEventEntrantsNodes {
        pub(crate) id: Option<ID>,
        pub(crate) name: Option<String>,
        pub(crate) seeds: Option<Vec<Option<SeedsQueryEventEntrantsNodesSeeds>>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct SeedsQueryEventEntrantsNodesSeeds {
        pub(crate) phase: Option<SeedsQueryEventEntrantsNodesSeedsPhase>,
        pub(crate) seed_num: Option<i64>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct SeedsQueryEventEntrantsNodesSeedsPhase {
        pub(crate) id: Option<ID>,
    }
}

pub(crate) mod standings_query {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) event_slug: String,
        pub(crate) page: i64,
        pub(crate) per_page: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) event: Option<StandingsQueryEvent>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct StandingsQueryEvent {
        pub(crate) standings: Option<StandingsQueryEventStandings>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct StandingsQueryEventStandings {
        pub(crate) page_info: Option<PageInfo>,
        pub(crate) nodes: Option<Vec<Option<StandingsQueryEventStandingsNodes>>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct StandingsQueryEventStandingsNodes {
        pub(crate) placement: Option<i64>,
        pub(crate) entrant: Option<StandingsQueryEventStandingsNodesEntrant>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct StandingsQueryEventStandingsNodesEntrant {
        pub(crate) id: Option<ID>,
    }
}

pub(crate) mod completed_sets_query {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) event_slug: String,
        pub(crate) page: i64,
        pub(crate) per_page: i64,
        /// Unix timestamp in seconds.
        pub(crate) updated_after: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) event: Option<CompletedSetsQueryEvent>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEvent {
        pub(crate) sets: Option<CompletedSetsQueryEventSets>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct CompletedSetsQueryEventSets {
        pub(crate) page_info: Option<PageInfo>,
        pub(crate) nodes: Option<Vec<Option<CompletedSetsQueryEventSetsNodes>>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct CompletedSetsQueryEventSetsNodes {
        pub(crate) id: Option<ID>,
        pub(crate) round: Option<i64>,
        pub(crate) winner_id: Option<ID>,
        pub(crate) completed_at: Option<i64>,
        pub(crate) slots: Option<Vec<Option<CompletedSetsQueryEventSetsNodesSlots>>>,
        pub(crate) phase_group: Option<CompletedSetsQueryEventSetsNodesPhaseGroup>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesSlots {
        pub(crate) entrant: Option<CompletedSetsQueryEventSetsNodesSlotsEntrant>,
        pub(crate) standing: Option<CompletedSetsQueryEventSetsNodesSlotsStanding>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesSlotsEntrant {
        pub(crate) id: Option<ID>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesSlotsStanding {
        pub(crate) stats: Option<CompletedSetsQueryEventSetsNodesSlotsStandingStats>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesSlotsStandingStats {
        pub(crate) score: Option<CompletedSetsQueryEventSetsNodesSlotsStandingStatsScore>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesSlotsStandingStatsScore {
        pub(crate) value: Option<f64>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct CompletedSetsQueryEventSetsNodesPhaseGroup {
        pub(crate) phase: Option<CompletedSetsQueryEventSetsNodesPhaseGroupPhase>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct CompletedSetsQueryEventSetsNodesPhaseGroupPhase {
        pub(crate) name: Option<String>,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub(crate) total_pages: Option<i64>,
}

/// Sets fetched in one poll, in the order start.gg returned them.
#[derive(Debug, Default)]
pub(crate) struct CompletedSets {
    pub(crate) sets: Vec<(ID, MatchResult)>,
    /// When the fetch began. Becomes the watermark for the next poll, so sets finishing mid-fetch are seen again rather than skipped.
    pub(crate) fetch_started: DateTime<Utc>,
}

impl CompletedSets {
    /// Adds a set, replacing an earlier copy if pagination shifted it onto a later page.
    fn insert(&mut self, id: ID, result: MatchResult) {
        if let Some((_, existing)) = self.sets.iter_mut().find(|(existing_id, _)| *existing_id == id) {
            *existing = result;
        } else {
            self.sets.push((id, result));
        }
    }
}

/// Where bracket data comes from.
#[async_trait]
pub(crate) trait BracketSource {
    /// Tournament and event name.
    async fn event_names(&mut self) -> Result<(String, String), Error>;
    /// Seeds of the first phase, keyed by entrant.
    async fn initial_seeding(&mut self) -> Result<HashMap<ID, Participant>, Error>;
    /// Current placements, keyed by entrant.
    async fn standings(&mut self) -> Result<HashMap<ID, u32>, Error>;
    /// Every set with a winner that was updated at or after `watermark`.
    ///
    /// `standings` must have been fetched immediately before, or eliminations may be missing their placement.
    async fn newly_completed_sets(&mut self, watermark: DateTime<Utc>, standings: &HashMap<ID, u32>, seeding: &HashMap<ID, Participant>) -> Result<CompletedSets, Error>;
}

/// Sends GraphQL request bodies to start.gg.
#[async_trait]
pub(crate) trait Transport {
    async fn post(&mut self, body: serde_json::Value) -> reqwest::Result<reqwest::Response>;
}

/// Authenticated requests to the public API endpoint.
pub(crate) struct HttpTransport {
    http_client: reqwest::Client,
    auth_token: String,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&mut self, body: serde_json::Value) -> reqwest::Result<reqwest::Response> {
        self.http_client.post(API_URL)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send().await
    }
}

/// start.gg API client scoped to one event.
pub(crate) struct Client<T = HttpTransport> {
    transport: T,
    event_slug: String,
    next_request: Instant,
}

impl Client {
    pub(crate) fn new(http_client: reqwest::Client, auth_token: String, event_slug: String) -> Self {
        Self::with_transport(HttpTransport { http_client, auth_token }, event_slug)
    }
}

impl<T: Transport + Send> Client<T> {
    fn with_transport(transport: T, event_slug: String) -> Self {
        Self { transport, event_slug, next_request: Instant::now() }
    }

    async fn query<Q: GraphQLQuery>(&mut self, variables: Q::Variables) -> Result<Q::ResponseData, Error> {
        let body = serde_json::to_value(Q::build_query(variables))?;
        sleep_until(self.next_request).await;
        let response = self.transport.post(body).await;
        self.next_request = Instant::now() + RATE_LIMIT;
        response_data::<Q>(response?).await
    }

    /// Requests pages 1, 2, … of a paginated query until the last page.
    ///
    /// `record` consumes one page and returns the total number of pages.
    async fn paginate<Q: GraphQLQuery>(&mut self, variables: impl Fn(i64) -> Q::Variables, mut record: impl FnMut(Q::ResponseData) -> Result<i64, Error>) -> Result<(), Error> {
        let mut page = 1;
        loop {
            let total_pages = record(self.query::<Q>(variables(page)).await?)?;
            log::debug!("retrieved page {page}/{total_pages}");
            if page >= total_pages { return Ok(()) }
            page += 1;
        }
    }

    async fn first_phase(&mut self) -> Result<ID, Error> {
        let response = self.query::<PhasesQuery>(phases_query::Variables { event_slug: self.event_slug.clone() }).await?;
        let phases_query::ResponseData {
            event: Some(phases_query::PhasesQueryEvent { phases: Some(phases) }),
        } = response else { return Err(Error::NoQueryMatch("PhasesQuery")) };
        first_phase(phases)
    }
}

/// Fails on non-success statuses, and on GraphQL errors even if some data came back.
async fn response_data<Q: GraphQLQuery>(response: reqwest::Response) -> Result<Q::ResponseData, Error> {
    let response = detailed_error_for_status(response).await?;
    let graphql_client::Response { data, errors, extensions: _ } = json_with_text_in_error::<graphql_client::Response<Q::ResponseData>>(response).await?;
    match (data, errors) {
        (Some(_), Some(errors)) if !errors.is_empty() => Err(Error::GraphQL(errors)),
        (Some(data), _) => Ok(data),
        (None, Some(errors)) => Err(Error::GraphQL(errors)),
        (None, None) => Err(Error::NoDataNoErrors),
    }
}

/// The phase with the lowest phase order, which is the one seeds are taken from.
fn first_phase(phases: Vec<Option<phases_query::PhasesQueryEventPhases>>) -> Result<ID, Error> {
    phases.into_iter()
        .filter_map(identity)
        .filter_map(|phases_query::PhasesQueryEventPhases { id, name, phase_order }| {
            log::debug!("phase {name:?} has order {phase_order:?}");
            Some((id?, phase_order.unwrap_or(i64::MAX)))
        })
        .min_by_key(|&(_, phase_order)| phase_order)
        .map(|(id, _)| id)
        .ok_or(Error::NoPhases)
}

fn record_seeds(entrants: Vec<Option<seeds_query::SeedsQueryEventEntrantsNodes>>, phase: &ID, seeding: &mut HashMap<ID, Participant>) {
    for entrant in entrants.into_iter().filter_map(identity) {
        let seeds_query::SeedsQueryEventEntrantsNodes { id: Some(id), name: Some(name), seeds: Some(seeds) } = entrant else { continue };
        let seed = seeds.into_iter()
            .filter_map(identity)
            .find(|seeds_query::SeedsQueryEventEntrantsNodesSeeds { phase: seed_phase, .. }| seed_phase.as_ref().and_then(|seed_phase| seed_phase.id.as_ref()) == Some(phase))
            .and_then(|seeds_query::SeedsQueryEventEntrantsNodesSeeds { seed_num, .. }| seed_num)
            .and_then(|seed_num| u32::try_from(seed_num).ok());
        if let Some(seed) = seed {
            seeding.insert(id, Participant::new(&name, seed));
        } else {
            log::debug!("entrant {name} ({id}) is not seeded in the first phase");
        }
    }
}

fn record_standings(nodes: Vec<Option<standings_query::StandingsQueryEventStandingsNodes>>, standings: &mut HashMap<ID, u32>) {
    for node in nodes.into_iter().filter_map(identity) {
        let standings_query::StandingsQueryEventStandingsNodes {
            placement: Some(placement),
            entrant: Some(standings_query::StandingsQueryEventStandingsNodesEntrant { id: Some(id) }),
        } = node else { continue };
        if let Ok(placement) = u32::try_from(placement) {
            standings.insert(id, placement);
        }
    }
}

/// Translates one set from the API.
///
/// Returns `Ok(None)` for sets without a winner.
fn match_from_node(node: completed_sets_query::CompletedSetsQueryEventSetsNodes, standings: &HashMap<ID, u32>, seeding: &HashMap<ID, Participant>) -> Result<Option<(ID, MatchResult)>, Error> {
    use completed_sets_query::{
        CompletedSetsQueryEventSetsNodes as Node,
        CompletedSetsQueryEventSetsNodesPhaseGroup as PhaseGroup,
        CompletedSetsQueryEventSetsNodesPhaseGroupPhase as Phase,
        CompletedSetsQueryEventSetsNodesSlots as SetSlot,
        CompletedSetsQueryEventSetsNodesSlotsStanding as Standing,
        CompletedSetsQueryEventSetsNodesSlotsStandingStats as Stats,
        CompletedSetsQueryEventSetsNodesSlotsStandingStatsScore as Score,
    };

    fn entrant_id(slot: &Option<SetSlot>) -> Option<&ID> {
        slot.as_ref()?.entrant.as_ref()?.id.as_ref()
    }

    fn games(slot: &Option<SetSlot>) -> Option<Games> {
        let Some(SetSlot { standing: Some(Standing { stats: Some(Stats { score: Some(Score { value: Some(value) }) }) }), .. }) = slot else { return None };
        Some(Games::from_score(*value))
    }

    let Node { id: Some(id), round, winner_id, completed_at, slots, phase_group } = node else { return Ok(None) };
    let Some(winner_id) = winner_id else { return Ok(None) };
    let malformed = |reason| Error::MalformedSet { set: id.clone(), reason };
    let Some(slots) = slots else { return Err(malformed("no slots")) };
    let [slot1, slot2] = <[_; 2]>::try_from(slots).map_err(|_| malformed("not exactly two slots"))?;
    let (Some(entrant1), Some(entrant2)) = (entrant_id(&slot1), entrant_id(&slot2)) else { return Err(malformed("missing entrant")) };
    let Some(PhaseGroup { phase: Some(Phase { name: Some(phase) }) }) = phase_group else { return Err(malformed("no phase name")) };
    let completed_at = completed_at
        .and_then(|completed_at| DateTime::from_timestamp(completed_at, 0))
        .ok_or_else(|| malformed("no completion time"))?;
    let participant = |entrant: &ID| seeding.get(entrant).cloned().ok_or_else(|| Error::UnknownEntrant { entrant: entrant.clone(), set: id.clone() });
    let winner = if winner_id == *entrant1 {
        Slot::P1
    } else if winner_id == *entrant2 {
        Slot::P2
    } else {
        return Err(malformed("winner is not an entrant"))
    };
    let side = BracketSide::from_round(round.unwrap_or_default());
    let loser_placement = match side {
        BracketSide::Winners => None,
        BracketSide::Losers => {
            let loser = match winner {
                Slot::P1 => entrant2,
                Slot::P2 => entrant1,
            };
            Some(*standings.get(loser).ok_or_else(|| Error::MissingStanding { entrant: loser.clone(), set: id.clone() })?)
        }
    };
    let result = MatchResult {
        p1: participant(entrant1)?,
        p2: participant(entrant2)?,
        games: [games(&slot1), games(&slot2)],
        side,
        phase,
        completed_at,
        winner,
        loser_placement,
    };
    Ok(Some((id, result)))
}

#[async_trait]
impl<T: Transport + Send> BracketSource for Client<T> {
    async fn event_names(&mut self) -> Result<(String, String), Error> {
        log::info!("retrieving name of tournament...");
        let response = self.query::<EventNameQuery>(event_name_query::Variables { event_slug: self.event_slug.clone() }).await?;
        let event_name_query::ResponseData {
            event: Some(event_name_query::EventNameQueryEvent {
                name: Some(event_name),
                tournament: Some(event_name_query::EventNameQueryEventTournament { name: Some(tournament_name) }),
            }),
        } = response else { return Err(Error::NoQueryMatch("EventNameQuery")) };
        Ok((tournament_name, event_name))
    }

    async fn initial_seeding(&mut self) -> Result<HashMap<ID, Participant>, Error> {
        let phase = self.first_phase().await?;
        let event_slug = self.event_slug.clone();
        let mut seeding = HashMap::default();
        self.paginate::<SeedsQuery>(
            |page| seeds_query::Variables { event_slug: event_slug.clone(), per_page: SEEDS_PER_PAGE, page },
            |response| {
                let seeds_query::ResponseData {
                    event: Some(seeds_query::SeedsQueryEvent {
                        entrants: Some(seeds_query::SeedsQueryEventEntrants {
                            page_info: Some(PageInfo { total_pages: Some(total_pages) }),
                            nodes: Some(entrants),
                        }),
                    }),
                } = response else { return Err(Error::NoQueryMatch("SeedsQuery")) };
                record_seeds(entrants, &phase, &mut seeding);
                Ok(total_pages)
            },
        ).await?;
        log::info!("retrieved {} seeds", seeding.len());
        Ok(seeding)
    }

    async fn standings(&mut self) -> Result<HashMap<ID, u32>, Error> {
        log::info!("retrieving standings...");
        let event_slug = self.event_slug.clone();
        let mut standings = HashMap::default();
        self.paginate::<StandingsQuery>(
            |page| standings_query::Variables { event_slug: event_slug.clone(), per_page: STANDINGS_PER_PAGE, page },
            |response| {
                let standings_query::ResponseData {
                    event: Some(standings_query::StandingsQueryEvent {
                        standings: Some(standings_query::StandingsQueryEventStandings {
                            page_info: Some(PageInfo { total_pages: Some(total_pages) }),
                            nodes: Some(nodes),
                        }),
                    }),
                } = response else { return Err(Error::NoQueryMatch("StandingsQuery")) };
                record_standings(nodes, &mut standings);
                Ok(total_pages)
            },
        ).await?;
        log::info!("retrieved {} standings", standings.len());
        Ok(standings)
    }

    async fn newly_completed_sets(&mut self, watermark: DateTime<Utc>, standings: &HashMap<ID, u32>, seeding: &HashMap<ID, Participant>) -> Result<CompletedSets, Error> {
        log::info!("retrieving sets...");
        let event_slug = self.event_slug.clone();
        let mut completed = CompletedSets { sets: Vec::default(), fetch_started: Utc::now() };
        self.paginate::<CompletedSetsQuery>(
            |page| completed_sets_query::Variables { event_slug: event_slug.clone(), per_page: SETS_PER_PAGE, updated_after: watermark.timestamp(), page },
            |response| {
                let completed_sets_query::ResponseData {
                    event: Some(completed_sets_query::CompletedSetsQueryEvent {
                        sets: Some(completed_sets_query::CompletedSetsQueryEventSets {
                            page_info: Some(PageInfo { total_pages: Some(total_pages) }),
                            nodes: Some(nodes),
                        }),
                    }),
                } = response else { return Err(Error::NoQueryMatch("CompletedSetsQuery")) };
                for node in nodes.into_iter().filter_map(identity) {
                    if let Some((id, result)) = match_from_node(node, standings, seeding)? {
                        completed.insert(id, result);
                    }
                }
                Ok(total_pages)
            },
        ).await?;
        log::info!("retrieved {} finished sets", completed.sets.len());
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use {
        std::collections::VecDeque,
        serde_json::json,
        super::*,
    };

    fn seeding() -> HashMap<ID, Participant> {
        HashMap::from([
            (ID::from(IdInner::Number(1.into())), Participant::new("Alice", 1)),
            (ID::from(IdInner::Number(2.into())), Participant::new("Bob_", 12)),
        ])
    }

    fn sets_page(nodes: serde_json::Value) -> Vec<Option<completed_sets_query::CompletedSetsQueryEventSetsNodes>> {
        let response = serde_json::from_value::<completed_sets_query::ResponseData>(json!({
            "event": {
                "sets": {
                    "pageInfo": { "totalPages": 1 },
                    "nodes": nodes,
                },
            },
        })).unwrap();
        response.event.unwrap().sets.unwrap().nodes.unwrap()
    }

    fn set_node(id: u64, round: i64, winner_id: Option<u64>, scores: [serde_json::Value; 2]) -> serde_json::Value {
        json!({
            "id": id,
            "round": round,
            "winnerId": winner_id,
            "completedAt": 1_700_000_000,
            "slots": [
                { "entrant": { "id": 1 }, "standing": { "stats": { "score": { "value": scores[0] } } } },
                { "entrant": { "id": "2" }, "standing": { "stats": { "score": { "value": scores[1] } } } },
            ],
            "phaseGroup": { "phase": { "name": "Top 64" } },
        })
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let ids = serde_json::from_value::<Vec<ID>>(json!([123, "456", "preview_1_2"])).unwrap();
        assert_eq!(ids, [ID("123".to_owned()), ID("456".to_owned()), ID("preview_1_2".to_owned())]);
    }

    #[test]
    fn query_body_names_operation() {
        let body = serde_json::to_value(CompletedSetsQuery::build_query(completed_sets_query::Variables {
            event_slug: "tournament/genesis/event/singles".to_owned(),
            page: 2,
            per_page: SETS_PER_PAGE,
            updated_after: 1_700_000_000,
        })).unwrap();
        assert_eq!(body["operationName"], "CompletedSetsQuery");
        assert_eq!(body["variables"], json!({ "eventSlug": "tournament/genesis/event/singles", "page": 2, "perPage": 60, "updatedAfter": 1_700_000_000 }));
        assert!(body["query"].as_str().unwrap().contains("updatedAfter: $updatedAfter"));
    }

    #[test]
    fn first_phase_has_lowest_order() {
        let phases = serde_json::from_value::<Vec<Option<phases_query::PhasesQueryEventPhases>>>(json!([
            { "id": 30, "name": "Top 8", "phaseOrder": 3 },
            { "id": 10, "name": "Pools", "phaseOrder": 1 },
            null,
            { "id": 20, "name": "Top 64", "phaseOrder": 2 },
        ])).unwrap();
        assert_eq!(first_phase(phases).unwrap(), ID("10".to_owned()));
        assert!(matches!(first_phase(Vec::default()), Err(Error::NoPhases)));
    }

    #[test]
    fn seeds_come_from_first_phase() {
        let entrants = serde_json::from_value::<Vec<Option<seeds_query::SeedsQueryEventEntrantsNodes>>>(json!([
            { "id": 1, "name": "Alice", "seeds": [{ "phase": { "id": 20 }, "seedNum": 3 }, { "phase": { "id": 10 }, "seedNum": 1 }] },
            { "id": 2, "name": "Late Entry", "seeds": [{ "phase": { "id": 20 }, "seedNum": 9 }] },
        ])).unwrap();
        let mut seeding = HashMap::default();
        record_seeds(entrants, &ID("10".to_owned()), &mut seeding);
        assert_eq!(seeding.len(), 1);
        assert_eq!(seeding[&ID("1".to_owned())], Participant::new("Alice", 1));
    }

    #[test]
    fn standings_skip_incomplete_nodes() {
        let nodes = serde_json::from_value::<Vec<Option<standings_query::StandingsQueryEventStandingsNodes>>>(json!([
            { "placement": 17, "entrant": { "id": 1 } },
            { "placement": null, "entrant": { "id": 2 } },
            null,
        ])).unwrap();
        let mut standings = HashMap::default();
        record_standings(nodes, &mut standings);
        assert_eq!(standings, HashMap::from([(ID("1".to_owned()), 17)]));
    }

    #[test]
    fn winners_side_set() {
        let mut nodes = sets_page(json!([set_node(99, 2, Some(2), [json!(1.0), json!(3.0)])]));
        let (id, result) = match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding()).unwrap().unwrap();
        assert_eq!(id, ID("99".to_owned()));
        assert_eq!(result.winner, Slot::P2);
        assert_eq!(result.side, BracketSide::Winners);
        assert_eq!(result.loser_placement, None);
        assert_eq!(result.phase, "Top 64");
        assert_eq!(result.completed_at.timestamp(), 1_700_000_000);
        assert_eq!(result.to_string(), r"**Bob\_** (seed 12) 3-1 **Alice** (seed 1)");
    }

    #[test]
    fn losers_side_set_looks_up_placement() {
        let standings = HashMap::from([(ID("1".to_owned()), 17)]);
        let mut nodes = sets_page(json!([set_node(99, -3, Some(2), [json!(-1.0), json!(0.0)])]));
        let (_, result) = match_from_node(nodes.remove(0).unwrap(), &standings, &seeding()).unwrap().unwrap();
        assert_eq!(result.side, BracketSide::Losers);
        assert_eq!(result.loser_placement, Some(17));
        assert!(result.is_dq());
    }

    #[test]
    fn missing_standing_is_an_error() {
        let mut nodes = sets_page(json!([set_node(99, -3, Some(2), [json!(2.0), json!(3.0)])]));
        let error = match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding()).unwrap_err();
        assert!(matches!(error, Error::MissingStanding { entrant, .. } if entrant == ID("1".to_owned())));
    }

    #[test]
    fn unfinished_set_is_skipped() {
        let mut nodes = sets_page(json!([set_node(99, 1, None, [json!(null), json!(null)])]));
        assert!(match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding()).unwrap().is_none());
    }

    #[test]
    fn unreported_score_is_none() {
        let mut nodes = sets_page(json!([set_node(99, 1, Some(1), [json!(null), json!(null)])]));
        let (_, result) = match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding()).unwrap().unwrap();
        assert_eq!(result.games, [None, None]);
        assert_eq!(result.to_string(), r"**Alice** (seed 1) > **Bob\_** (seed 12)");
    }

    #[test]
    fn winner_outside_set_is_an_error() {
        let mut nodes = sets_page(json!([set_node(99, 1, Some(3), [json!(2.0), json!(0.0)])]));
        let error = match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding()).unwrap_err();
        assert!(matches!(error, Error::MalformedSet { reason: "winner is not an entrant", .. }));
    }

    #[test]
    fn unseeded_entrant_is_an_error() {
        let mut nodes = sets_page(json!([set_node(99, 1, Some(1), [json!(2.0), json!(0.0)])]));
        let seeding = HashMap::from([(ID("1".to_owned()), Participant::new("Alice", 1))]);
        let error = match_from_node(nodes.remove(0).unwrap(), &HashMap::default(), &seeding).unwrap_err();
        assert!(matches!(error, Error::UnknownEntrant { .. }));
    }

    #[test]
    fn repeated_set_replaces_earlier_copy() {
        let mut completed = CompletedSets::default();
        let first = crate::model::tests::set(("A", 9), ("B", 1), (2, 1), BracketSide::Winners, "Pools", 10);
        let second = crate::model::tests::set(("A", 9), ("B", 1), (2, 0), BracketSide::Winners, "Pools", 20);
        completed.insert(ID("1".to_owned()), first);
        completed.insert(ID("2".to_owned()), second.clone());
        completed.insert(ID("1".to_owned()), second.clone());
        assert_eq!(completed.sets.len(), 2);
        assert_eq!(completed.sets[0], (ID("1".to_owned()), second));
    }

    /// Answers requests with canned responses, in order.
    struct FakeTransport {
        responses: VecDeque<reqwest::Response>,
        requests: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post(&mut self, body: serde_json::Value) -> reqwest::Result<reqwest::Response> {
            self.requests.push(body);
            Ok(self.responses.pop_front().expect("more requests than canned responses"))
        }
    }

    fn response(status: u16, body: impl ToString) -> reqwest::Response {
        reqwest::Response::from(::http::Response::builder().status(status).body(body.to_string()).unwrap())
    }

    fn fake_client(responses: impl IntoIterator<Item = reqwest::Response>) -> Client<FakeTransport> {
        Client::with_transport(FakeTransport { responses: responses.into_iter().collect(), requests: Vec::default() }, "tournament/genesis-9/event/ultimate-singles".to_owned())
    }

    fn requested_pages(client: &Client<FakeTransport>, operation: &str) -> Vec<i64> {
        client.transport.requests.iter()
            .filter(|request| request["operationName"] == operation)
            .map(|request| request["variables"]["page"].as_i64().unwrap())
            .collect()
    }

    fn seeds_response(total_pages: i64, entrants: serde_json::Value) -> reqwest::Response {
        response(200, json!({ "data": { "event": { "entrants": { "pageInfo": { "totalPages": total_pages }, "nodes": entrants } } } }))
    }

    fn standings_response(total_pages: i64, nodes: serde_json::Value) -> reqwest::Response {
        response(200, json!({ "data": { "event": { "standings": { "pageInfo": { "totalPages": total_pages }, "nodes": nodes } } } }))
    }

    fn sets_response(total_pages: i64, nodes: serde_json::Value) -> reqwest::Response {
        response(200, json!({ "data": { "event": { "sets": { "pageInfo": { "totalPages": total_pages }, "nodes": nodes } } } }))
    }

    #[tokio::test(start_paused = true)]
    async fn seeding_reads_every_page() {
        let entrant = |id: u64, seed: u64| json!({ "id": id, "name": format!("Player {id}"), "seeds": [{ "phase": { "id": 10 }, "seedNum": seed }] });
        let mut client = fake_client([
            response(200, json!({ "data": { "event": { "phases": [{ "id": 10, "name": "Pools", "phaseOrder": 1 }] } } })),
            seeds_response(3, json!([entrant(1, 1), entrant(2, 2)])),
            seeds_response(3, json!([entrant(3, 3), entrant(4, 4)])),
            seeds_response(3, json!([entrant(5, 5)])),
        ]);
        let seeding = client.initial_seeding().await.unwrap();
        assert_eq!(seeding.len(), 5);
        assert_eq!(seeding[&ID("5".to_owned())], Participant::new("Player 5", 5));
        assert_eq!(requested_pages(&client, "SeedsQuery"), [1, 2, 3]);
        assert!(client.transport.responses.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_or_empty_result_is_one_request() {
        let mut client = fake_client([
            standings_response(1, json!([{ "placement": 1, "entrant": { "id": 1 } }])),
            standings_response(0, json!([])),
        ]);
        assert_eq!(client.standings().await.unwrap().len(), 1);
        assert_eq!(requested_pages(&client, "StandingsQuery"), [1]);
        assert!(client.standings().await.unwrap().is_empty());
        assert_eq!(requested_pages(&client, "StandingsQuery"), [1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn sets_are_collected_across_pages() {
        let watermark = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let mut client = fake_client([
            sets_response(2, json!([set_node(98, 1, Some(1), [json!(2.0), json!(0.0)]), set_node(99, 1, Some(2), [json!(1.0), json!(2.0)])])),
            sets_response(2, json!([set_node(99, 1, Some(2), [json!(0.0), json!(2.0)]), set_node(100, 1, None, [json!(null), json!(null)])])),
        ]);
        let completed = client.newly_completed_sets(watermark, &HashMap::default(), &seeding()).await.unwrap();
        assert_eq!(completed.sets.iter().map(|(id, _)| id.0.as_str()).collect::<Vec<_>>(), ["98", "99"]);
        assert_eq!(completed.sets[1].1.games, [Some(Games::Count(0)), Some(Games::Count(2))]);
        assert_eq!(requested_pages(&client, "CompletedSetsQuery"), [1, 2]);
        assert!(client.transport.requests.iter().all(|request| request["variables"]["updatedAfter"] == 1_600_000_000));
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_is_fatal() {
        let mut client = fake_client([response(500, "internal server error")]);
        match client.standings().await {
            Err(Error::Http(http::Error::Status(http::StatusError { status, body, .. }))) => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "internal server error");
            }
            result => panic!("expected a status error, got {result:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn graphql_errors_are_fatal() {
        let mut client = fake_client([
            response(200, json!({
                "data": { "event": { "name": "Ultimate Singles", "tournament": { "name": "Genesis 9" } } },
                "errors": [{ "message": "complexity too high" }],
            })),
            response(200, json!({})),
            response(200, json!({ "data": { "event": null } })),
            response(200, json!({ "data": { "event": { "name": "Ultimate Singles", "tournament": { "name": "Genesis 9" } } } })),
        ]);
        assert!(matches!(client.event_names().await, Err(Error::GraphQL(errors)) if errors[0].message == "complexity too high"));
        assert!(matches!(client.event_names().await, Err(Error::NoDataNoErrors)));
        assert!(matches!(client.event_names().await, Err(Error::NoQueryMatch("EventNameQuery"))));
        assert_eq!(client.event_names().await.unwrap(), ("Genesis 9".to_owned(), "Ultimate Singles".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_keeps_text() {
        let mut client = fake_client([response(200, "<html>maintenance</html>")]);
        assert!(matches!(client.standings().await, Err(Error::Http(http::Error::Json { body, .. })) if body == "<html>maintenance</html>"));
    }
}
