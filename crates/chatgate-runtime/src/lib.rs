//! Chatgate Runtime Services
//!
//! Tokio-based orchestration over the `chatgate-core` primitives: the
//! global concurrency gate, the composed cache manager, the canonical state
//! store with its single persistence writer, the membership checker, the
//! batched broadcast dispatcher, and the daily statistics task. The
//! [`runtime::ChatgateRuntime`] ties them together with an explicit
//! start/shutdown lifecycle; nothing here is a process-wide singleton.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod broadcast;
pub mod cache_manager;
pub mod gate;
pub mod membership;
pub mod messaging;
pub mod runtime;
pub mod stats;
pub mod storage;
pub mod store;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use broadcast::{BroadcastDispatcher, BroadcastProgress, BroadcastReport};
pub use cache_manager::CacheManager;
pub use gate::{ConcurrencyGate, GatePermit};
pub use membership::MembershipChecker;
pub use messaging::{MembershipStatus, Messenger};
pub use runtime::ChatgateRuntime;
pub use storage::{BlobStorage, FileStorage, MemoryStorage};
pub use store::{PersistTask, PersistenceWriter, StateStore};
