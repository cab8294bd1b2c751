pub(crate) use {
    std::{
        collections::HashMap,
        convert::identity,
        fmt,
        time::Duration,
    },
    chrono::prelude::*,
    serde::{
        Deserialize,
        Serialize,
    },
    tokio::time::{
        Instant,
        sleep_until,
    },
    crate::{
        classify::{
            Category,
            Rules,
            Tracker,
        },
        config::{
            Config,
            Settings,
        },
        model::{
            BracketSide,
            Games,
            MatchResult,
            Participant,
            Slot,
        },
        startgg::ID,
    },
};
