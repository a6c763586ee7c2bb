// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod dispatcher;
pub mod sink;

pub use dispatcher::{DispatchMode, EmitDispatcher};
pub use sink::{FileSink, LogSink, Sink};
