pub mod cell;
pub mod grid;

pub use cell::{classify, motion_ratio, CellBounds, GridGeometry, Intensity};
pub use grid::{cell_label, Cell, GridSnapshot, GridStateMachine, TickStats};
