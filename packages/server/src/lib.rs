// Briefcast - API Core
//
// Ingests user-submitted URLs, enriches them in the background, turns a
// user's backlog into a synthesized podcast and folds everything into a
// daily digest email. Live status reaches clients over SSE.
//
// Infrastructure lives in kernel/, business logic in domains/*.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
