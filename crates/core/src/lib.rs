//! Fieldwatch incident lifecycle and duplicate-resolution engine.
//!
//! Pure domain rules live in [`transition`], [`verification`],
//! [`cost_approval`], [`merge`] and [`hierarchy`]. [`lifecycle`] and
//! [`merge_coordinator`] run those rules against an [`store::IncidentStore`]
//! and the external [`oracle::SimilarityOracle`].

#[macro_use]
pub mod types;

pub mod cost_approval;
pub mod error;
pub mod hierarchy;
pub mod incident;
pub mod lifecycle;
pub mod merge;
pub mod merge_coordinator;
pub mod oracle;
pub mod roles;
pub mod store;
pub mod transition;
pub mod verification;
