// Global safety caps to prevent pathological inputs from running away

// Parser: default nesting bound for statements/expressions. Parens count two
// levels and every fold of a left-associative chain counts one; the bound keeps
// parsing, analysis and codegen within a 2 MiB thread stack.
pub const DEFAULT_MAX_DEPTH: usize = 64;
// Diagnostics: default number of stored messages per unit
pub const DEFAULT_MAX_ERRORS: usize = 100;

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
pub const JAVA_LANG_STRING: &str = "java/lang/String";
pub const JAVA_LANG_STRING_BUILDER: &str = "java/lang/StringBuilder";

pub const INIT: &str = "<init>";
pub const CLINIT: &str = "<clinit>";
