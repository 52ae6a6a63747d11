pub mod assist;
pub mod calls;
pub mod config;
pub mod hub;
pub mod presence;
pub mod relay;
pub mod routes;
pub mod video;
pub mod websocket;
