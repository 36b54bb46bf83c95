//! Archive codec for host <-> container file transfer
//!
//! Directory trees travel as tar streams, the format the Docker archive API
//! speaks in both directions. Encoding walks a host path; decoding consumes a
//! stream in one pass and skips files whose content is already in place.

pub mod change;
pub mod decode;
pub mod encode;
pub mod pipe;

pub use change::{detect_change, write_file, Body, Change, TeeReader};
pub use decode::{decode_into, DecodeStats};
pub use encode::encode_dir;
