//! Lossless HTML scanning primitives.
//!
//! [`stream::TreeStream`] turns a serialized fragment into structural events
//! that carry their verbatim source slices; [`text::DecodedChars`] walks one
//! text run character by character, mapping decoded characters back to raw
//! byte offsets. Together they let the marker compare decoded text while
//! splicing markup at exact raw positions.

pub mod stream;
pub mod text;

pub use stream::{attr_value, class_list, Attr, NodeEvent, NodeId, TreeStream, ROOT};
pub use text::{DecodedChar, DecodedChars};
