//! Renders the classified sets as the markdown body of the post.

use {
    itertools::Itertools as _,
    crate::prelude::*,
};

/// The text the post starts with, and the whole body of a freshly created post.
pub(crate) fn disclaimer(interval_minutes: u64, rules: &Rules) -> String {
    let Rules { cutoff, differential } = rules;
    format!("This post was made and will be updated approximately every {interval_minutes} minutes by a bot.\n\n\
        Upsets are defined as a top {cutoff} seed losing to a player seeded {differential} or more places below them. \
        Notable sets are defined as a top {cutoff} seed losing to a player seeded less than {differential} places below them, \
        or a top {cutoff} seed going last game with a player seeded below them. \
        DQs are noted for top {cutoff} seeds.\n\n\
        Characters will not be added because I have not yet solved computer vision with regards to Smash.")
}

pub(crate) fn title(tournament_name: &str, event_name: &str) -> String {
    format!("{tournament_name} - {event_name} Upset Thread")
}

/// Full post body for the current state of the tracker.
pub(crate) fn render(interval_minutes: u64, rules: &Rules, tracker: &Tracker) -> String {
    Report { interval_minutes, rules, tracker }.to_string()
}

struct Report<'a> {
    interval_minutes: u64,
    rules: &'a Rules,
    tracker: &'a Tracker,
}

impl Report<'_> {
    /// Sets of one category, by phase, then winners before losers side.
    fn fmt_sets(&self, f: &mut fmt::Formatter<'_>, phases: &[&str], category: Category) -> fmt::Result {
        for phase in phases {
            let (winners, losers) = self.tracker.members(category)
                .filter(|result| result.phase == *phase)
                .partition::<Vec<_>, _>(|result| result.side == BracketSide::Winners);
            if winners.is_empty() && losers.is_empty() { continue }
            write!(f, "#{phase}\n\n")?;
            for (heading, sets) in [("Winners", winners), ("Losers", losers)] {
                if sets.is_empty() { continue }
                writeln!(f, "###{heading}")?;
                for set in sets {
                    writeln!(f, "{set}  ")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }

    /// Each disqualified player once. Players disqualified on both sides of the bracket get no annotation.
    fn fmt_dqs(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let winners = self.tracker.members(Category::DqWinners).map(MatchResult::loser).collect_vec();
        let losers = self.tracker.members(Category::DqLosers).map(MatchResult::loser).collect_vec();
        for player in &winners {
            if losers.contains(player) {
                writeln!(f, "{player}  ")?;
            } else {
                writeln!(f, "{player} (winners)  ")?;
            }
        }
        for player in &losers {
            if !winners.contains(player) {
                writeln!(f, "{player} (losers)  ")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n", disclaimer(self.interval_minutes, self.rules))?;
        let phases = self.tracker.phase_order();
        if !self.tracker.is_empty(Category::Upset) {
            write!(f, "---\n\n#Upsets\n\n")?;
            self.fmt_sets(f, &phases, Category::Upset)?;
        }
        if !self.tracker.is_empty(Category::Notable) {
            write!(f, "---\n\n#Notable Sets\n\n")?;
            self.fmt_sets(f, &phases, Category::Notable)?;
        }
        if !self.tracker.is_empty(Category::DqWinners) || !self.tracker.is_empty(Category::DqLosers) {
            write!(f, "---\n\n#DQs\n\n")?;
            self.fmt_dqs(f)?;
        }
        Ok(())
    }
}
