pub mod blocks;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod io;
pub mod runtime;
pub mod serialization;
pub mod signals;
pub mod store;
pub mod target;
pub mod vm;

pub use engine::Engine;
pub use error::{VmError, VmResult};
pub use events::{EventLog, Observer, VmEvent};
pub use runtime::Runtime;
pub use target::{Costume, SpriteInfo, Target, TargetId};
pub use vm::{LoadOutcome, VirtualMachine};
