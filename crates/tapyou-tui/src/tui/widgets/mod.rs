// TUI widget modules, one per panel or overlay.

pub mod compose;
pub mod delete_confirm;
pub mod help_bar;
pub mod login;
pub mod quit_confirm;
pub mod status_bar;
pub mod status_picker;
pub mod task_list;
pub mod transcript;
