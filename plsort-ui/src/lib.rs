//! # plsort UI
//!
//! Client-side control surface for the playlist sorter: request a change plan
//! from the sorting service, adjust the user's overrides, execute the plan and
//! follow its progress over the service's event stream.
//!
//! **Architecture:**
//! - [`overrides`]: session-persistent selections (dry run, groupings, playlist opt-outs)
//! - [`client`]: HTTP requests to the service, one request per call
//! - [`sse`]: Server-Sent Events decoding
//! - [`stream`]: event stream consumer state machine
//! - [`session`]: plan session orchestrating the above
//! - [`view`] / [`render`]: derived review state and its text rendering

pub mod client;
pub mod error;
pub mod overrides;
pub mod render;
pub mod session;
pub mod sse;
pub mod stream;
pub mod view;

#[cfg(test)]
mod test_support;

pub use client::{CredentialFile, PlanClient, PlanService, StreamConnector};
pub use error::{SessionError, SessionResult};
pub use overrides::{FileStorage, MemoryStorage, OverrideSnapshot, OverrideStorage, OverrideStore};
pub use session::{PlanSession, SessionUpdate};
pub use stream::{Dispatch, EventStreamConsumer, StreamObserver, StreamState};
pub use view::SessionView;
