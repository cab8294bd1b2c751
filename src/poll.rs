//! The fetch, classify, render, publish cycle.

use {
    tokio::time::MissedTickBehavior,
    crate::{
        prelude::*,
        reddit::{
            self,
            PostId,
            Publisher,
        },
        report,
        startgg::{
            self,
            BracketSource,
            CompletedSets,
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Reddit(#[from] reddit::Error),
    #[error(transparent)] StartGG(#[from] startgg::Error),
    #[error("cannot {action} while {stage:?}")]
    Stage {
        action: &'static str,
        stage: Stage,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Event names and seeds not fetched yet.
    Initializing,
    /// Seeds known, no post to edit yet.
    PublishingFirst,
    Polling,
    /// A step failed. Nothing is retried.
    Terminated,
}

pub(crate) struct Poller<S, P> {
    source: S,
    publisher: P,
    settings: Settings,
    stage: Stage,
    names: Option<(String, String)>,
    seeding: HashMap<ID, Participant>,
    post: Option<PostId>,
    /// Start of the previous fetch. The next fetch asks for everything updated since then.
    watermark: DateTime<Utc>,
    tracker: Tracker,
}

impl<S: BracketSource, P: Publisher> Poller<S, P> {
    pub(crate) fn new(source: S, publisher: P, settings: Settings) -> Self {
        Self {
            stage: Stage::Initializing,
            names: None,
            seeding: HashMap::default(),
            post: None,
            watermark: settings.since,
            tracker: Tracker::default(),
            source, publisher, settings,
        }
    }

    fn expect_stage(&self, expected: Stage, action: &'static str) -> Result<(), Error> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(Error::Stage { action, stage: self.stage })
        }
    }

    /// Moves to [`Stage::Terminated`] if `result` is an error.
    fn check<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_err() {
            self.stage = Stage::Terminated;
        }
        result
    }

    /// Fetches the event's name and its seeds, which stay fixed for the rest of the run.
    pub(crate) async fn initialize(&mut self) -> Result<(), Error> {
        self.expect_stage(Stage::Initializing, "initialize")?;
        let result = self.initialize_inner().await;
        self.check(result)?;
        self.stage = Stage::PublishingFirst;
        Ok(())
    }

    async fn initialize_inner(&mut self) -> Result<(), Error> {
        let names = self.source.event_names().await?;
        log::info!("event: {} - {}", names.0, names.1);
        self.seeding = self.source.initial_seeding().await?;
        self.names = Some(names);
        Ok(())
    }

    /// Creates the post, or picks up the one the operator supplied.
    pub(crate) async fn publish_first(&mut self) -> Result<(), Error> {
        self.expect_stage(Stage::PublishingFirst, "publish")?;
        let post = if let Some(post) = self.settings.post.clone() {
            log::info!("editing existing post with id {post}");
            post
        } else {
            let (tournament_name, event_name) = self.names.as_ref().map(|(tournament, event)| (tournament.as_str(), event.as_str())).unwrap_or_default();
            let title = report::title(tournament_name, event_name);
            let body = report::disclaimer(self.settings.interval_minutes(), &self.settings.rules);
            let result = self.publisher.create_post(&title, &body).await.map_err(Error::from);
            self.check(result)?
        };
        self.post = Some(post);
        self.stage = Stage::Polling;
        Ok(())
    }

    /// One poll: refresh standings, fetch sets updated since the last poll, reclassify them, and update the post if anything came in.
    ///
    /// Returns how many sets were processed.
    pub(crate) async fn tick(&mut self) -> Result<usize, Error> {
        self.expect_stage(Stage::Polling, "poll")?;
        let result = self.tick_inner().await;
        self.check(result)
    }

    async fn tick_inner(&mut self) -> Result<usize, Error> {
        // placements of eliminated players are looked up in these, so they must be fresher than the sets
        let standings = self.source.standings().await?;
        let CompletedSets { sets, fetch_started } = self.source.newly_completed_sets(self.watermark, &standings, &self.seeding).await?;
        self.watermark = fetch_started;
        if sets.is_empty() {
            log::info!("no new sets");
            return Ok(0)
        }
        let count = sets.len();
        for (id, result) in sets {
            let description = result.to_string();
            let previous = self.tracker.category_of(&id);
            match (previous, self.tracker.observe(&self.settings.rules, id, result)) {
                (None, Some(category)) => log::info!("identified {description} as {category}"),
                (Some(previous), Some(category)) if previous != category => log::info!("reclassified {description} from {previous} to {category}"),
                (Some(previous), None) => log::info!("{description} is no longer {previous}"),
                (_, _) => {}
            }
        }
        let body = report::render(self.settings.interval_minutes(), &self.settings.rules, &self.tracker);
        let Some(ref post) = self.post else { return Err(Error::Stage { action: "edit", stage: self.stage }) };
        self.publisher.edit_post(post, &body).await?;
        log::info!("updated post ({count} sets processed, {} reported in total)", self.tracker.len());
        Ok(count)
    }

    /// Runs until a step fails. Polls are spaced by the configured interval, measured from the start of each poll.
    pub(crate) async fn run(mut self) -> Result<(), Error> {
        self.initialize().await?;
        self.publish_first().await?;
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await?;
        }
    }
}
