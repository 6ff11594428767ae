//! Stream Session and Streaming Supervisor: the largest single component —
//! per-device agent lifecycle, parameter-set caching, and the
//! restart/warm-TTL state machine.

mod paramcache;
pub mod session;
pub mod supervisor;

pub use session::{SessionState, StreamSession};
pub use supervisor::StreamingSupervisor;
