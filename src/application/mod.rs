pub mod autonomy_engine;
pub mod task_executor;

pub use autonomy_engine::{assign_level, AutonomyEngine};
pub use task_executor::{ExecutionOptions, TaskExecutor};
