// handlers/mod.rs - HTTP handlers by access tier
//
// Public (no auth): service info and health checks
// Protected (bearer auth via `middleware::require_user`): AI relay and query history

pub mod protected;
pub mod public;
