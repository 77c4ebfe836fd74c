// TapYou client core: backend access, session context, chat reconciliation,
// task board and the application event loop.

pub mod api;
pub mod app;
pub mod chat;
pub mod config;
pub mod protocol;
pub mod session;
pub mod tasks;
