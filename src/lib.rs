// === Public Modules (The Canonical Paths) ===
pub mod data;
pub mod engine;
pub mod error;
pub mod expr;
pub mod kernel;
pub mod registry;

// === Facades (Re-exporting the common surface) ===
pub use crate::data::dataset::{Dataset, OhlcvBundle, Partition, PartitionKey};
pub use crate::data::domain::{Source, Symbol, TimeUnit, Timeframe, TimestampMs};
pub use crate::data::series::{align, AlignHow, FillPolicy, Series};
pub use crate::engine::stream::{Snapshot, StreamBackend, Tick};
pub use crate::engine::{CancelToken, Engine, EvalOptions, Evaluation, NodeOutput};
pub use crate::error::{TaError, TaResult};
pub use crate::expr::parser::parse;
pub use crate::expr::planner::{plan, Plan};
pub use crate::registry::Registry;
