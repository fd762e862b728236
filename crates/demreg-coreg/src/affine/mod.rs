//! Translation-family estimators.

mod dh_minimize;
mod nuth_kaab;
mod vertical_shift;

pub use dh_minimize::{DhMinimize, DhMinimizeParams};
pub use nuth_kaab::{NuthKaab, NuthKaabParams};
pub use vertical_shift::{VerticalShift, VerticalShiftMethod, VerticalShiftParams};
