//! Limits and control object names of the server.

/// Statement ceiling for one procedure section of an unbound process.
pub const MAX_STATEMENTS: usize = 50_000;

/// Name prefix of the control cubes holding element attribute values.
pub const ELEMENT_ATTRIBUTES_PREFIX: &str = "}ElementAttributes_";

/// Control dimension the server appends to cubes when sandboxes are enabled.
pub const SANDBOX_DIMENSION: &str = "}Sandboxes";

/// Control cube holding per-cube properties such as the transaction log switch.
pub const CUBE_PROPERTIES_CUBE: &str = "}CubeProperties";

/// Control cube holding per-hierarchy properties such as the default member.
pub const HIERARCHY_PROPERTIES_CUBE: &str = "}HierarchyProperties";

/// Default nesting depth used when expanding consolidation components.
pub const DEFAULT_COMPONENT_DEPTH: usize = 99;

/// Default number of decimals written for numeric values in generated statements.
pub const DEFAULT_PRECISION: usize = 8;
