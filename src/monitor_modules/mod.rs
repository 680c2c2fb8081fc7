pub mod config;
pub mod record;
pub mod sampler;
pub mod sampling_loop;
pub mod shutdown;
pub mod sink;

pub use config::{MonitorMode, MonitorSettings, Variant};
pub use sampler::{Sampler, SystemSampler};
pub use sampling_loop::{run_sampling_loop, LoopExit};
pub use shutdown::{stop_channel, StopHandle, StopSignal, StopTrigger};
pub use sink::LogSink;
