//! Sample delivery strategies for remote load-generating agents.
//!
//! Every strategy implements [`SampleSender`] and is bound to one
//! [`RemoteListener`](loadrelay_core::RemoteListener). Callers normally go
//! through [`SenderFactory`], which maps the configured mode token to a
//! strategy:
//!
//! | Mode | Delivery |
//! |---|---|
//! | `Standard` | one remote call per sample |
//! | `Hold` | everything at test end |
//! | `Batch` | one batch per count or time threshold |
//! | `Statistical` | per-key aggregates per threshold |
//! | `Asynch` | bounded queue, background worker |
//! | `DiskStore` | spill file replayed at test end |
//! | `Stripped*` | any of the above, payload of successful samples removed |

pub mod asynch;
pub mod batch;
pub mod disk_store;
pub mod factory;
pub mod hold;
pub mod mock;
pub mod sender;
pub mod standard;
pub mod statistical;
pub mod stripped;
pub mod threshold;

pub use asynch::{AsynchSender, QueueWaitStats};
pub use batch::BatchSender;
pub use disk_store::DiskStoreSender;
pub use factory::{SenderConstructor, SenderFactory, SenderMode, SenderRegistry};
pub use hold::HoldSender;
pub use sender::SampleSender;
pub use standard::StandardSender;
pub use statistical::{AggregateResult, AggregationTable, StatisticalSender};
pub use stripped::StrippedSender;
pub use threshold::FlushTrigger;
