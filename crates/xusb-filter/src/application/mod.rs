//! Application layer: the two filter layers and the gate between them.
//!
//! # Sub-modules
//!
//! - **`request`** – The request object passed between layers and its
//!   single-shot completion channel.
//!
//! - **`forward`** – The [`forward::IoTarget`] seam (the next-lower driver)
//!   and pass-through forwarding, fire-and-forget or with a completion routine.
//!
//! - **`gate`** – The Input Gate shared by the upper and lower layers.  This
//!   is the only mutable state that crosses the layer boundary.
//!
//! - **`upper`** – Routes client requests: wait-for-input through the gate,
//!   legacy get-state through a payload check when no gate exists,
//!   everything else straight through.
//!
//! - **`lower`** – Watches device-bound transfers: opens the gate when an
//!   input poll is submitted and closes it when a genuine report completes.
//!
//! - **`device`** – Device contexts: role, creation, and upper/lower pairing.

pub mod device;
pub mod forward;
pub mod gate;
pub mod lower;
pub mod request;
pub mod upper;
