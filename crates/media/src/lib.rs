//! Media and helper glue around the core submission loop.
//!
//! Everything here is a pure function boundary: frame-file enumeration,
//! image resizing, ffmpeg-based frame extraction, and LLM prompt
//! generation. No module shares state with the protocol layer.

pub mod extract;
pub mod frames;
pub mod llm;
pub mod resize;
