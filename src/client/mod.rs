pub mod poller;

pub use poller::{
    GovernanceApi, PollError, PollOptions, SudoClient, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
