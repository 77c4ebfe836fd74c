pub mod session;
pub mod transcript;

pub use session::{ChatEvent, ChatOutcome, ChatSession, ChatStatus, ChatTimings};
pub use transcript::{Author, Entry, EntryState, LocalId, Transcript};
