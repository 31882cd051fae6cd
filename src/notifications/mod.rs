//! Transition alert delivery.

pub mod models;
pub mod senders;
pub mod service;

pub use models::{AlertContext, ChannelConfig};
pub use service::{NotificationError, NotificationService, Notifier};
