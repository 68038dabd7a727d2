//! VM parameters

/// Number of operand slots on the belt.
///
/// Pushes drop the oldest slot; no other operation moves items.
pub const BELT_SIZE: usize = 16;

/// Maximum nesting depth accepted by the loop tree decoder.
pub const MAX_LOOP_DEPTH: usize = 64;

/// Surface language version accepted by the compiler.
pub const LANG_VERSION: &str = "0.0.1";
