pub mod models;
pub mod store;

pub use models::{Role, Session, SessionPhase, Turn};
pub use store::{SessionError, SessionStore};
