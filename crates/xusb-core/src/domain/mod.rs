//! Pure decision rules shared by the filter layers.
//!
//! Nothing in here holds state or performs I/O.  Each function takes the
//! data the filter observed and returns a verdict:
//!
//! - **`intercept`** – Should the lower filter treat this submission as the
//!   start of a new input polling cycle?
//! - **`classify`** – Did this completed transfer carry a genuine controller
//!   state report?
//! - **`legacy`** – Is this legacy get-state payload structurally valid?

pub mod classify;
pub mod intercept;
pub mod legacy;
