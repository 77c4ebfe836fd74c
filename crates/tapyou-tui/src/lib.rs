// Terminal front end for the TapYou planner.

pub mod tui;
