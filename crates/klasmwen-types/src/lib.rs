pub mod api;
pub mod models;
pub mod notifications;
pub mod pagination;
pub mod permissions;
