//! Local persistence for session flags.

mod session;

pub use session::{
    SessionContext, SessionStore, DISMISSED_IMPORT_ALERTS_KEY, IS_AUTHENTICATED_KEY,
};
