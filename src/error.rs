//! The narrow set of conditions a caller can get wrong before a tick runs.
//!
//! The force kernel itself is a pure numeric pipeline and reports no errors
//! (bad geometry degrades gracefully; see the crate docs on softening and
//! bounding-box degeneracy). This type exists only for preconditions that
//! would otherwise be an out-of-bounds panic in safe Rust.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BhError {
    #[error("link endpoint {index} is out of range for {point_n} points")]
    LinkIndexOutOfRange { index: u32, point_n: usize },
}
