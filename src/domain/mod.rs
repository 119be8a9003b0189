pub mod article;
pub mod types;

pub use article::Article;
pub use types::{DeliveryState, QueueItem, StatsSnapshot};
