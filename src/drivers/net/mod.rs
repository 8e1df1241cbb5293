//! Network interface drivers.

pub mod atlantic;
