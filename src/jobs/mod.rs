pub mod dispatch;
pub mod evaluate;
pub mod notify;
pub mod reconcile;
pub mod sweep;

pub use dispatch::MailDispatcher;
pub use evaluate::WatchEvaluator;
pub use notify::NotificationBuilder;
pub use reconcile::WatchReconciler;
pub use sweep::MarketSweep;
