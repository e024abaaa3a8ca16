//! API layer - HTTP endpoint handlers organized by domain.

mod extract;
mod health;
mod notifications;
mod routes;

pub use extract::ApiJson;
pub use health::{health, index, stats};
pub use notifications::{
    MessageIdResponse, MulticastResponse, RepeatedDataMessagesResponse, TopicMembershipResponse,
};
pub use routes::api_routes;
