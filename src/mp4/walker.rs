//! Box iteration over byte ranges.

use super::{BoxHeader, BoxType};
use crate::error::{Error, Result};

/// Walk the boxes in `buf[start..end)` and return them in order.
///
/// Handles compact (32-bit) and large (64-bit) sizes plus the `size == 0`
/// to-end sentinel. A truncated tail (a header that runs past `end`, or a
/// size smaller than its own header) stops iteration without an error.
pub fn walk(buf: &[u8], start: u64, end: u64) -> Result<Vec<BoxHeader>> {
    let end = end.min(buf.len() as u64);
    let mut boxes = Vec::new();
    let mut pos = start;

    while pos + 8 <= end {
        let at = pos as usize;
        let size32 = u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let box_type = BoxType::from_bytes([buf[at + 4], buf[at + 5], buf[at + 6], buf[at + 7]]);

        let (size, header_size) = if size32 == 1 {
            if pos + 16 > end {
                break;
            }
            let size64 = u64::from_be_bytes([
                buf[at + 8],
                buf[at + 9],
                buf[at + 10],
                buf[at + 11],
                buf[at + 12],
                buf[at + 13],
                buf[at + 14],
                buf[at + 15],
            ]);
            if size64 > i64::MAX as u64 {
                return Err(Error::BoxTooLarge {
                    offset: pos,
                    size: size64,
                });
            }
            (size64, 16u8)
        } else if size32 == 0 {
            // Terminating box: extends to the end of the range.
            (end - pos, 8u8)
        } else {
            (size32 as u64, 8u8)
        };

        if size < header_size as u64 || pos + size > end {
            break;
        }

        boxes.push(BoxHeader {
            box_type,
            start: pos,
            size,
            header_size,
        });
        pos += size;
    }

    Ok(boxes)
}

/// Walk the children of a container box.
pub fn walk_children(buf: &[u8], parent: &BoxHeader) -> Result<Vec<BoxHeader>> {
    walk(buf, parent.body_start(), parent.end())
}

/// Find the first box of the given type.
pub fn find_box<'b>(boxes: &'b [BoxHeader], box_type: BoxType) -> Option<&'b BoxHeader> {
    boxes.iter().find(|b| b.box_type == box_type)
}
