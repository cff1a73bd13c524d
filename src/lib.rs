pub mod api_client;
pub mod config;
pub mod demux;
pub mod emitter;
pub mod error;
pub mod line_reader;
pub mod model;
pub mod script;
pub mod shell_session;
pub mod sleep_reaper;
pub mod step_runner;
pub mod supervisor;
pub mod teardown;

pub use api_client::{LoggingApi, RecordingApi, StatusApi};
pub use config::ExecutorConfig;
pub use emitter::{Emitter, RecordingEmitter, WriterEmitter};
pub use error::ExecutorError;
pub use model::{Build, CommandDef, StepOutcome};
pub use supervisor::Supervisor;
