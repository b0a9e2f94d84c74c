//! Photo album service: uploads with derived images, view counting,
//! slideshow movies of the most viewed photos and periodic notification mail.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;
