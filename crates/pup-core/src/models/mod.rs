//! Shared models: records, collections, and queued mutations.

mod operation;
mod record;

pub use operation::{DeadLetter, OpKind, PendingOp};
pub use record::{Collection, Record};
