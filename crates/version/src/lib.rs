//! Build-time version metadata: crate version, git commit, rustc version,
//! and protocol version (the crate's major version, per semver).

/// Human-readable build banner, e.g.
/// `forge-version (release 0.1.0) (commit a1b2c3d) (rustc 1.82.0) (protocol 0)`.
pub const VERSION_INFO: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " (release ",
    env!("CARGO_PKG_VERSION"),
    ") ",
    "(commit ",
    env!("GIT_COMMIT_HASH"),
    ") ",
    "(rustc ",
    env!("RUSTC_VERSION"),
    ") ",
    "(protocol ",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ")",
);

/// Returns the build banner. A function (rather than bare `pub use` of the
/// const) so callers don't need to know it's compile-time constant.
pub fn version_info() -> &'static str {
    VERSION_INFO
}
