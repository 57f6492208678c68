//! Context capture for dualrail
//!
//! This crate answers "who, where and under what conditions" at the moment a
//! rail records something. It is shared by the logging rail and the debugging
//! rail; neither rail depends on the other.
//!
//! # Contract
//!
//! Every probe is read-only and infallible from the caller's point of view.
//! A probe that cannot read its source (no `/proc`, unreadable sudoers file,
//! no disk matching the working directory) reports the [`UNKNOWN`] sentinel
//! instead of an error. Capturing context must never abort the logging call
//! it serves.
//!
//! ```
//! use dualrail_core_probe::{ContextCapturer, Identity, ProbeSettings};
//!
//! let identity = Identity::current();
//! let capturer = ContextCapturer::new(ProbeSettings::default());
//! let ctx = capturer.capture(&identity);
//!
//! assert_eq!(ctx.pid, std::process::id());
//! println!("{} in {}", ctx.shell, ctx.cwd);
//! ```

pub mod context;
pub mod identity;
pub mod probes;

pub use context::{ContextCapturer, ProbeSettings, SystemContext};
pub use identity::Identity;
pub use probes::{ProcessMemory, ShellContext, SudoersContext, SystemMetrics};

/// Sentinel reported by any probe that could not read its source
pub const UNKNOWN: &str = "unknown";
