//! Record extraction primitives shared by every registry parser.

mod blocks;
mod dates;
mod path;
mod template;

pub use blocks::{Block, BlockKind, BlockTemplate};
pub use dates::{normalize_date, DateFormat};
pub use path::{child_map, FieldPath, LeafPath, Role};
pub use template::Template;
