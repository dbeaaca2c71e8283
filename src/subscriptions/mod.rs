pub mod subscriber;
pub mod subscriber_list;
pub mod subscription_tree;

pub use subscriber::{ClientId, Subscriber};
pub use subscriber_list::SubscriberList;
pub use subscription_tree::{MatchedSubscribers, SubscriptionTree};
