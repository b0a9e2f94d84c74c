pub mod auth;
pub mod health_handlers;
pub mod movie_handlers;
pub mod photo_handlers;
