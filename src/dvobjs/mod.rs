//! Built-in dynamic objects.

pub mod system;

pub use system::make_system;
