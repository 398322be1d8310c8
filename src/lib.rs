//! Forkbot: finds stale, permissively licensed repositories, forks them,
//! applies a fixed set of maintenance improvements and proposes the result
//! upstream as a pull request.
//!
//! A run is driven by [`controller::RunController`]. Each candidate passes
//! through [`acquisition`], the [`pipeline`] of [`stages`], and
//! [`publication`], and is then recorded in the [`ledger`] so it is never
//! processed twice.

pub mod acquisition;
pub mod command;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod generative;
pub mod git;
pub mod github;
pub mod ledger;
pub mod pipeline;
pub mod publication;
pub mod stages;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
