pub mod broker;
pub mod poller;
pub mod receipt;
pub mod reconciler;
pub mod status;
pub mod webhook;

pub use broker::{ChannelSink, LiveEvent, LiveEventKind, NotificationBroker, Sink, SubscriptionGuard};
pub use poller::{PollError, PollSummary, Poller};
pub use receipt::SettlementEnricher;
pub use reconciler::{ReconcileAction, ReconcileOutcome, Reconciler, TransferObservation};
pub use webhook::{WebhookAdapter, WebhookError};
