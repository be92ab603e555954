//! `erna-scheduler`: the recurring trigger that turns waiting lists into groups.
//!
//! # Overview
//!
//! A [`round::MatchRound`] is one firing at one minute: it consumes the
//! scheduled events due at that minute, adds the configured locations when
//! the minute is a recurring slot of the [`calendar::MatchCalendar`], checks
//! the skip ledger, then matches and purges. The [`engine::TriggerEngine`]
//! drives rounds from a Tokio interval, firing each minute at most once.
//!
//! # Round outcomes
//!
//! | Outcome   | Meaning                                              |
//! |-----------|------------------------------------------------------|
//! | `Idle`    | Nothing due at this minute                           |
//! | `Skipped` | Due, but the day is on the skip ledger               |
//! | `Matched` | Groups formed; the matched waiting lists were purged |

pub mod calendar;
pub mod engine;
pub mod error;
pub mod round;
pub mod types;

pub use calendar::MatchCalendar;
pub use engine::TriggerEngine;
pub use error::{Result, TriggerError};
pub use round::MatchRound;
pub use types::{RoundOutcome, RoundReport};
