use thiserror::Error;

/// Raised when a caller builds a value whose fields contradict each other.
///
/// These never reach the wire; construction fails before anything is sent.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidConfiguration {
    #[error("image width must be greater than zero")]
    ZeroImageWidth,
    #[error("image height must be greater than zero")]
    ZeroImageHeight,
    #[error("unsupported colour depth {0}; expected 8, 16 or 32 bits")]
    UnsupportedColorDepth(u32),
    #[error("malformed rectangle ({left}, {top}, {right}, {bottom})")]
    MalformedRect {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
}
