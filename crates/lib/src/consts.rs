//! Well-known names and directory conventions.

/// Name of the per-package build description file.
pub const BUILD_FILE_NAME: &str = "BUCK";

/// Project configuration file, relative to the project root.
pub const CONFIG_FILE_NAME: &str = ".brickconfig";

/// Root of everything the tool writes inside a project.
pub const BUCK_OUT_DIR: &str = "buck-out";

/// Conventional root for generated outputs, relative to the project root.
pub const GEN_DIR: &str = "buck-out/gen";

/// Default artifact cache location, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = "buck-out/cache";

/// Number of stderr lines kept on a failed step.
pub const STDERR_TAIL_LINES: usize = 20;

/// Suffix of files written by test runners into a test output directory.
pub const TEST_RESULT_EXTENSION: &str = "json";
