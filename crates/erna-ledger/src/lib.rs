//! `erna-ledger`: idempotent bookkeeping for scheduled match events and skip dates.
//!
//! Both ledgers pair a pending set with a permanent history keyed the same
//! way. A history record's presence is the idempotency guard: creating an
//! entry whose key already has history is a no-op that returns the
//! original record.
//!
//! | Ledger           | Key                    | Pending set consumed by         |
//! |------------------|------------------------|---------------------------------|
//! | `ScheduleLedger` | (location, datetime)   | `consume_due`, startup pruning  |
//! | `SkipLedger`     | datetime               | never; read by the trigger      |

pub mod error;
pub mod schedule;
pub mod skip;

pub use error::{LedgerError, Result};
pub use schedule::{NextEvent, ScheduleLedger};
pub use skip::SkipLedger;
