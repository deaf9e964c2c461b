// handlers/protected/mod.rs - Handlers behind bearer authentication
//
// Every handler here receives `Extension<AuthUser>` inserted by
// `middleware::require_user`; store access is always scoped to that user.

pub mod ai;
pub mod history;
