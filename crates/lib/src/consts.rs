//! Shared constants.

/// Maximum number of diagnostics collected before a phase gives up.
pub const MAX_ERRORS: usize = 10;

/// Minimum build runner version the emitted manifest requires.
pub const NINJA_REQUIRED_VERSION: &str = "1.7.0";

/// Column at which long manifest lines are wrapped with `$`.
pub const NINJA_LINE_WIDTH: usize = 80;

/// Indentation used for scoped manifest bindings.
pub const NINJA_INDENT: &str = "  ";

/// Name of the build runner's built-in phony rule.
pub const PHONY_RULE: &str = "phony";

/// Root phony target every module's checkbuild chains to.
pub const CHECKBUILD_TARGET: &str = "checkbuild";

/// Names of the root phonies for host and device variants.
pub const HOST_TARGET: &str = "host";
pub const DEVICE_TARGET: &str = "target";

/// Prefix of per-directory aggregate phonies.
pub const MODULES_IN_PREFIX: &str = "MODULES-IN";

/// Environment variable consumed and cleared at startup.
pub const SYSROOT_ENV: &str = "SYSROOT";

/// Property maps that may be set from build files.
pub const MAP_PROPERTY_ALLOWLIST: &[&str] = &["env"];
