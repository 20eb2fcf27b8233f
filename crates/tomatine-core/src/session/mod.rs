mod machine;
mod service;

pub use machine::{PomodoroSession, SessionKind, SessionState};
pub use service::SessionService;
