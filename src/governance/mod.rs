pub mod notifier;
pub mod service;
pub mod webhook;

pub use notifier::{ApprovalNotice, LogNotifier, Notifier};
pub use service::{GovernanceService, ResolutionEvent};
pub use webhook::WebhookNotifier;
