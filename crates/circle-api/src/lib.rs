pub mod auth;
pub mod comments;
mod convert;
pub mod error;
pub mod extract;
mod fallback;
pub mod friends;
pub mod likes;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod users;
