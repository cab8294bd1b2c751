//! Value types for seeded participants and completed sets.

use crate::prelude::*;

/// Escapes characters that have a meaning in reddit markdown.
///
/// `|` would break tables and has no escape that renders reliably, so it is replaced with a lookalike.
pub(crate) fn sanitize(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' | '^' | '_' | '*' | '~' | '>' | '#' => {
                sanitized.push('\\');
                sanitized.push(c);
            }
            '|' => sanitized.push('l'),
            _ => sanitized.push(c),
        }
    }
    sanitized
}

/// An entrant as seeded in the first phase of the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Participant {
    name: String,
    pub(crate) seed: u32,
}

impl Participant {
    pub(crate) fn new(name: &str, seed: u32) -> Self {
        Self { name: sanitize(name), seed }
    }

    /// The display name, already escaped for markdown.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "**{}** (seed {})", self.name(), self.seed)
    }
}

/// The number of games a participant took in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Games {
    Count(u32),
    /// start.gg reports `-1` for a participant who was disqualified or did not show up.
    Disqualified,
}

impl Games {
    /// Translates start.gg's score value, where negative values mark a DQ.
    pub(crate) fn from_score(value: f64) -> Self {
        if value < 0.0 {
            Self::Disqualified
        } else {
            Self::Count(value.round() as u32)
        }
    }
}

impl fmt::Display for Games {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => count.fmt(f),
            Self::Disqualified => write!(f, "DQ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BracketSide {
    Winners,
    Losers,
}

impl BracketSide {
    /// start.gg numbers losers rounds negatively.
    pub(crate) fn from_round(round: i64) -> Self {
        if round < 0 { Self::Losers } else { Self::Winners }
    }
}

/// Which of the two slots of a set a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    P1,
    P2,
}

impl Slot {
    fn other(self) -> Self {
        match self {
            Self::P1 => Self::P2,
            Self::P2 => Self::P1,
        }
    }
}

/// A set with a recorded winner.
///
/// Unfinished sets are never represented; the adapter skips sets without a winner.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatchResult {
    pub(crate) p1: Participant,
    pub(crate) p2: Participant,
    /// Games won by each slot, `None` where the score was not reported.
    pub(crate) games: [Option<Games>; 2],
    pub(crate) side: BracketSide,
    pub(crate) phase: String,
    pub(crate) completed_at: DateTime<Utc>,
    pub(crate) winner: Slot,
    /// Final placement of the eliminated participant. Only set for losers side sets.
    pub(crate) loser_placement: Option<u32>,
}

impl MatchResult {
    fn participant(&self, slot: Slot) -> &Participant {
        match slot {
            Slot::P1 => &self.p1,
            Slot::P2 => &self.p2,
        }
    }

    fn games_of(&self, slot: Slot) -> Option<Games> {
        match slot {
            Slot::P1 => self.games[0],
            Slot::P2 => self.games[1],
        }
    }

    pub(crate) fn winner(&self) -> &Participant {
        self.participant(self.winner)
    }

    pub(crate) fn loser(&self) -> &Participant {
        self.participant(self.winner.other())
    }

    pub(crate) fn winner_games(&self) -> Option<Games> {
        self.games_of(self.winner)
    }

    pub(crate) fn loser_games(&self) -> Option<Games> {
        self.games_of(self.winner.other())
    }

    pub(crate) fn is_dq(&self) -> bool {
        self.games.contains(&Some(Games::Disqualified))
    }

    /// Whether the loser took all but one of the games the winner needed.
    ///
    /// Missing or DQ scores never count as going the distance.
    pub(crate) fn went_last_game(&self) -> bool {
        match (self.winner_games(), self.loser_games()) {
            (Some(Games::Count(winner)), Some(Games::Count(loser))) => winner == loser + 1,
            _ => false,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.winner())?;
        match (self.winner_games(), self.loser_games()) {
            (Some(winner), Some(loser)) => write!(f, "{winner}-{loser}")?,
            _ => write!(f, ">")?,
        }
        write!(f, " {}", self.loser())?;
        if let (BracketSide::Losers, Some(placement)) = (self.side, self.loser_placement) {
            write!(f, " [places {}]", ordinal(placement))?;
        }
        Ok(())
    }
}

/// English ordinal, e.g. `17th`.
pub(crate) fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
