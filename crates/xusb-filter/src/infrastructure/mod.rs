//! Infrastructure layer: configuration, diagnostics, and concrete I/O targets.
//!
//! # Sub-modules
//!
//! - **`diagnostics`** – Optional hex dumps and completion logging.  Purely
//!   observational.
//!
//! - **`io_target`** – Implementations of `IoTarget`: a recording target for
//!   tests and a simulated controller stack (bus + function driver) used by
//!   the binary.
//!
//! - **`storage`** – TOML configuration file persistence.

pub mod diagnostics;
pub mod io_target;
pub mod storage;
