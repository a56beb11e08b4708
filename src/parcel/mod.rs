pub mod key;
pub mod service;

pub use key::ParcelKey;
pub use service::{ParcelError, ParcelService, PlacedTree};
