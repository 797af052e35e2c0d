pub mod approvals;
pub mod check;
pub mod exec;
pub mod log;
pub mod serve;
