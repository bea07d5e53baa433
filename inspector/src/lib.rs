//! EVM-replay instrumentation: interned address identities and
//! deterministic, append-only operation logs.
//!
//! While replaying a chain, an external execution engine feeds every
//! value-transfer and contract-interaction operation into a
//! [`Recorder`]. The recorder aggregates repeated operations per
//! transaction, substitutes dense integer identifiers for addresses
//! through the [`AddressRegistry`], and serializes the result into
//! line-oriented logs a downstream reader can parse one line at a time.
//!
//! The output is reproducible: records are explicitly sorted before
//! serialization, and the address mapping store makes identifiers stable
//! across process restarts.
//!
//! # Non-Goals
//! - Executing or validating transactions - replay belongs to the caller.
//! - Random access over previously written records - all logs are
//!   append-only.
//! - Thread safety - one engine instance belongs to one replay thread.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod aggregator;
pub mod context;
pub mod fs;
pub mod record;
pub mod recorder;
pub mod registry;

pub use record::{AddressId, BlockMeta, CoinbaseReward, OperationKind, OperationRecord};
pub use recorder::{InspectError, InspectResult, Recorder, Sinks};
pub use registry::AddressRegistry;
