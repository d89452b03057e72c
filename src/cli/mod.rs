//! Terminal front end: interactive query entry and its line-editor helper.

pub mod helper;
pub mod interactive;

pub use helper::EmfqlHelper;
pub use interactive::{run_session, EditorSource, LineSource};
