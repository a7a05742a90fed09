/*!
 * Session Module
 * Per-peer packet dispatch over a framed transport
 */

mod session;
mod types;

pub use session::Session;
pub use types::{SessionContext, SessionSummary};
