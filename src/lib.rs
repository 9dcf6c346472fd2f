//! Arena Server - room coordinator and combat resolver for arena brawls

pub mod app;
pub mod combat;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
