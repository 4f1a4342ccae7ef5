//! ISO-BMFF box parsing.
//!
//! This module provides the byte-level box walker and the init-segment
//! parser the flatten pipeline is built on. Boxes are represented as
//! absolute offset + length records into the source buffer; containers
//! are walked by re-invoking the walker on the parent's body range.

mod boxes;
mod cursor;
mod init;
mod walker;

pub use boxes::{BoxHeader, BoxType};
pub use cursor::ByteCursor;
pub use init::{parse_init_segment, TrackConfig};
pub use walker::{find_box, walk, walk_children};
