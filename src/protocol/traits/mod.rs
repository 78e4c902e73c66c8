//! Abstraction traits at the stack's seams: the lower-layer bus driver and
//! the upper-layer payload buffer collaborator.
pub mod bus_driver;
pub mod payload_buffer;
