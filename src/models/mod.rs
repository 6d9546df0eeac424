pub mod control;
pub mod de;
pub mod document;
pub mod enums;
pub mod result;

pub use control::*;
pub use document::*;
pub use enums::*;
pub use result::*;
