pub mod keyboards;
pub mod messages;
pub mod notification;

pub use notification::{ChannelRoutes, Notifier, TelegramNotifier};
