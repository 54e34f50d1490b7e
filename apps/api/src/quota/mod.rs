//! Plan entitlements, the minutes ledger, and quota gates.
//!
//! Three layers, separated so the money-adjacent logic stays testable
//! without a database:
//!   - `catalog`: the static plan table (what each tier grants)
//!   - `entitlements` + `ledger`: who holds which plan, and the persisted
//!     minute balance with its concurrency discipline
//!   - `guard`: the decision layer handlers actually call

pub mod catalog;
pub mod entitlements;
pub mod guard;
pub mod handlers;
pub mod ledger;
pub mod store;
