//! Domain services. Handlers stay thin and call into these.

pub mod imaging;
pub mod link_service;
pub mod media_store;
pub mod movie_service;
pub mod notification_service;
pub mod photo_service;
pub mod user_service;
