//! Content lifecycle: the immutable entity, its events, the transactional
//! command handlers and the service that composes them with the guard.

mod error;
pub mod events;
pub mod handlers;
mod model;
mod service;

pub use error::{ContentError, ContentResult};
pub use events::ContentEvent;
pub use model::{
    ContentItem, ContentQuery, ContentStatus, NewContent, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
    MAX_SCHEDULE_HORIZON_DAYS, MIN_CONTENT_ID_LEN,
};
pub use service::{Actor, ContentReceipt, ContentService, TransferReceipt, DEFAULT_EVENT_SOURCE};
