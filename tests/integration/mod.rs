//! Integration tests driving patch modules and the pipeline against a
//! synthetic extension on disk.

mod fixtures;
mod modules;
mod pipeline;
