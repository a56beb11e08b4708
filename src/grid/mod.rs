pub mod address;
pub mod color;
pub mod interpolate;
pub mod selection;

pub use address::TreeAddress;
pub use color::{tree_color, RegimeRange};
pub use interpolate::{interpolate, interpolate_slice, Corner, GridError, GridPoint};
pub use selection::{CornerSelection, SelectionStep};
