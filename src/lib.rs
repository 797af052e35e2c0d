//! SudoMode: governance and approval for agent intents.
//!
//! This library exposes the core components for integration testing and
//! programmatic use. The binary entrypoint is in `main.rs`.
//!
//! An intent goes through [`governance::GovernanceService::govern`], which
//! asks the [`policy::PolicyEngine`] for a verdict. Intents that need a
//! human land in the [`approval::ApprovalStore`] and are announced through a
//! [`governance::Notifier`]; callers wait on them with
//! [`client::SudoClient`].

pub mod approval;
pub mod audit;
pub mod cli;
pub mod client;
pub mod condition;
pub mod config;
pub mod gateway;
pub mod governance;
pub mod policy;
