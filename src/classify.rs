//! Seed-based classification of finished sets, and the incrementally maintained category lists.

use {
    enum_iterator::{
        Sequence,
        all,
    },
    crate::prelude::*,
};

/// Thresholds chosen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rules {
    /// Lowest (numerically highest) seed whose losses are reported.
    pub(crate) cutoff: u32,
    /// Minimum seed gap for a loss to count as an upset.
    pub(crate) differential: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, derive_more::Display)]
pub(crate) enum Category {
    #[display("upset")]
    Upset,
    #[display("notable")]
    Notable,
    #[display("winners DQ")]
    DqWinners,
    #[display("losers DQ")]
    DqLosers,
}

impl Category {
    fn index(self) -> usize {
        match self {
            Self::Upset => 0,
            Self::Notable => 1,
            Self::DqWinners => 2,
            Self::DqLosers => 3,
        }
    }
}

impl Rules {
    /// Signed seed gap from the winner's point of view. Positive means the worse seed won.
    fn seed_gap(result: &MatchResult) -> i64 {
        i64::from(result.winner().seed) - i64::from(result.loser().seed)
    }

    fn is_upset(&self, result: &MatchResult) -> bool {
        Self::seed_gap(result) >= i64::from(self.differential) && result.loser().seed <= self.cutoff
    }

    fn is_notable(&self, result: &MatchResult) -> bool {
        result.winner().seed <= self.cutoff
            && Self::seed_gap(result) < i64::from(self.differential)
            && (result.winner().seed > result.loser().seed || result.went_last_game())
    }

    /// Assigns a set to at most one category. Upsets take precedence over notable sets, which take precedence over DQs.
    pub(crate) fn classify(&self, result: &MatchResult) -> Option<Category> {
        let dq = result.is_dq();
        if !dq && self.is_upset(result) {
            Some(Category::Upset)
        } else if !dq && self.is_notable(result) {
            Some(Category::Notable)
        } else if dq && result.loser().seed <= self.cutoff {
            Some(match result.side {
                BracketSide::Winners => Category::DqWinners,
                BracketSide::Losers => Category::DqLosers,
            })
        } else {
            None
        }
    }
}

/// The sets currently reported, and which category each is reported in.
///
/// The per-category lists are kept in completion order. `membership` is the reverse index,
/// so a re-observed set can be pulled out of its old list without scanning all four.
/// Sets that fall out of every category are forgotten.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    store: HashMap<ID, MatchResult>,
    membership: HashMap<ID, Category>,
    lists: [Vec<ID>; 4],
}

impl Tracker {
    /// Records a new or updated set and reclassifies it from scratch.
    pub(crate) fn observe(&mut self, rules: &Rules, id: ID, result: MatchResult) -> Option<Category> {
        if let Some(previous) = self.membership.remove(&id) {
            self.lists[previous.index()].retain(|member| *member != id);
        }
        let Some(category) = rules.classify(&result) else {
            self.store.remove(&id);
            return None
        };
        let completed_at = result.completed_at;
        self.store.insert(id.clone(), result);
        let store = &self.store;
        let list = &mut self.lists[category.index()];
        // after any sets that finished at the same time, to keep ties in observation order
        let position = list.partition_point(|member| store[member].completed_at <= completed_at);
        list.insert(position, id.clone());
        self.membership.insert(id, category);
        Some(category)
    }

    /// The sets currently in `category`, ordered by completion time.
    pub(crate) fn members(&self, category: Category) -> impl Iterator<Item = &MatchResult> + '_ {
        self.lists[category.index()].iter().map(|id| &self.store[id])
    }

    pub(crate) fn category_of(&self, id: &ID) -> Option<Category> {
        self.membership.get(id).copied()
    }

    pub(crate) fn is_empty(&self, category: Category) -> bool {
        self.lists[category.index()].is_empty()
    }

    /// Phase names in the order they first appear among all classified sets, by completion time.
    pub(crate) fn phase_order(&self) -> Vec<&str> {
        let mut classified = all::<Category>()
            .flat_map(|category| self.members(category))
            .collect::<Vec<_>>();
        classified.sort_by_key(|result| result.completed_at);
        let mut phases = Vec::<&str>::default();
        for result in classified {
            if !phases.contains(&&*result.phase) {
                phases.push(&result.phase);
            }
        }
        phases
    }

    /// Number of sets reported across all categories.
    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }
}
