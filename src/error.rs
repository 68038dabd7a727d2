//! Runtime, compile and validation error implementation

use core::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[non_exhaustive]
/// Trap reason representation for the interpreter.
///
/// A trap aborts execution of the current script and invalidates the
/// containing transaction. Traps are disjoint from the in-band `Err`
/// sentinel carried by belt numbers, which programs can inspect and
/// filter themselves.
pub enum TrapReason {
    /// The byte can't be mapped to any known `TrapReason`.
    UnknownTrapReason = 0x00,
    /// Found `Unreachable` instruction.
    UnreachableCode = 0x01,
    /// A `Verify`, `VerifyOk` or `RelVerify` condition did not hold.
    VerifyFailed = 0x02,
    /// A belt access expected a number but found a slice.
    ExpectedNumber = 0x03,
    /// A belt access expected a slice but found a number.
    ExpectedSlice = 0x04,
    /// An `Err` value reached a position that requires a concrete number,
    /// such as a branch condition or a slice bound.
    UnexpectedErrValue = 0x05,
    /// A belt index is outside the belt.
    BeltIndexOutOfRange = 0x06,
    /// A local index is outside the locals table.
    LocalIndexOutOfRange = 0x07,
    /// A slice operation moved past the slice boundaries.
    SliceOutOfBounds = 0x08,
    /// A store would write past the end of the target slice.
    StoreOutOfBounds = 0x09,
    /// A store targeted a slice over an immutable buffer.
    ImmutableSliceWrite = 0x0a,
    /// A cast instruction was asked to convert in the wrong direction.
    InvalidCastDirection = 0x0b,
    /// The loop stack was advanced with no loop in progress.
    NoCurrentLoop = 0x0c,
    /// The witness loop-tree forest has no tree left for this loop.
    LoopForestExhausted = 0x0d,
    /// A loop started inside an iteration described as a leaf.
    LoopInLeaf = 0x0e,
    /// A nested loop started before the enclosing loop began iterating.
    LoopBeforeIteration = 0x0f,
    /// A loop was driven past the iteration count its tree describes.
    LoopIteratedTooFar = 0x10,
    /// A nested loop started with no child shape left in this iteration.
    NoSuchNestedLoop = 0x11,
    /// A `continue` reached an `if`/`else` block boundary.
    ContinueOutsideLoop = 0x12,
    /// A witness data buffer index is out of range.
    DataIndexOutOfRange = 0x13,
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for TrapReason {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<u8> for TrapReason {
    /// Converts the `u8` into a `TrapReason`.
    fn from(b: u8) -> Self {
        use TrapReason::*;
        match b {
            0x01 => UnreachableCode,
            0x02 => VerifyFailed,
            0x03 => ExpectedNumber,
            0x04 => ExpectedSlice,
            0x05 => UnexpectedErrValue,
            0x06 => BeltIndexOutOfRange,
            0x07 => LocalIndexOutOfRange,
            0x08 => SliceOutOfBounds,
            0x09 => StoreOutOfBounds,
            0x0a => ImmutableSliceWrite,
            0x0b => InvalidCastDirection,
            0x0c => NoCurrentLoop,
            0x0d => LoopForestExhausted,
            0x0e => LoopInLeaf,
            0x0f => LoopBeforeIteration,
            0x10 => LoopIteratedTooFar,
            0x11 => NoSuchNestedLoop,
            0x12 => ContinueOutsideLoop,
            0x13 => DataIndexOutOfRange,
            _ => UnknownTrapReason,
        }
    }
}

/// Interpreter runtime error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VmError {
    /// The execution trapped. `ic` counts the instructions executed up to
    /// and including the trapping one.
    #[error("execution trap: {reason} at instruction {ic}")]
    Trap {
        /// What went wrong.
        reason: TrapReason,
        /// Executed-instruction count at the trap site.
        ic: u64,
    },
}

impl VmError {
    /// Return the trap reason carried by this error.
    pub const fn reason(&self) -> TrapReason {
        match self {
            Self::Trap { reason, .. } => *reason,
        }
    }
}

/// A rejected program, located in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}")]
pub struct CompileError {
    /// What was rejected.
    pub kind: CompileErrorKind,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
}

/// Everything the compiler rejects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CompileErrorKind {
    #[error("unsupported version `{0}` (supported: {})", crate::consts::LANG_VERSION)]
    UnsupportedVersion(String),
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected token `{found}`, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
    },
    #[error(
        "belt item with the name `{0}` not found, maybe it was pushed off \
         the belt? Consider using locals in this case"
    )]
    ItemNotFound(String),
    #[error("belt item `{name}` is inconsistent between branches (the other branch holds `{other}`)")]
    InconsistentItem { name: String, other: String },
    #[error("invalid type: `{name}` is a {found}")]
    TypeMismatch { name: String, found: &'static str },
    #[error("incompatible operands: `{a}` and `{b}` disagree on signedness")]
    SignednessMismatch { a: String, b: String },
    #[error("invalid literal `{0}`")]
    BadLiteral(String),
    #[error("literal `{0}` does not fit its declared type")]
    LiteralOutOfRange(String),
    #[error("cannot assign literals to locals")]
    LiteralToLocal,
    #[error("can only assign belt items to locals, not local to local")]
    LocalFromLocal,
    #[error("can only assign locals to belt items, not belt item to belt item")]
    BeltToBelt,
    #[error("local `{0}` not defined")]
    LocalNotDefined(String),
    #[error("can only assign the front belt item (`{front}`) to a local, got `{requested}`")]
    NotFrontOfBelt { front: String, requested: String },
    #[error("locals can only be assigned from a named belt item")]
    LocalFromExpression,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{0}` is not implemented")]
    Unimplemented(String),
    #[error("`{call}` takes {expected} argument(s), got {found}")]
    BadArity {
        call: String,
        expected: &'static str,
        found: usize,
    },
    #[error("`{call}` produces {expected} result(s), got {found} name(s)")]
    BadResultArity {
        call: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot use `{0}` for this width")]
    CastWidth(String),
    #[error("scope `{0}` not defined")]
    ScopeNotFound(String),
    #[error("invalid loop: variable `{0}` is no longer on the belt")]
    LoopVariableLost(String),
    #[error("invalid loop: variable `{name}` ends up on belt position {after}, was {before}")]
    LoopVariableMoved {
        name: String,
        before: usize,
        after: usize,
    },
    #[error("invalid loop: variable `{0}` changed signedness across the loop body")]
    LoopVariableSign(String),
    #[error("invalid loop: variable `{0}` is introduced inside the loop body")]
    LoopVariableNew(String),
    #[error("at least either start or length must be given for slice")]
    SliceBoundsMissing,
}

/// A malformed loop-tree witness stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{kind} at offset {offset}")]
pub struct DecodeError {
    /// Byte offset into the stream.
    pub offset: usize,
    /// What was malformed.
    pub kind: DecodeErrorKind,
}

/// Loop-tree decode failure variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum DecodeErrorKind {
    #[error("unexpected end of loop tree stream")]
    UnexpectedEof,
    #[error("unknown loop tree tag {0:#04x}")]
    UnknownTag(u8),
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
    #[error("loop tree nesting exceeds the supported depth")]
    NestingTooDeep,
}

/// Transaction validation errors the driver checks for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The transaction spends more than its inputs provide.
    #[error("output amounts exceed input amounts: [inputs={inputs}, outputs={outputs}]")]
    OutputExceedsInput {
        /// Total amount provided by the input outpoints.
        inputs: u64,
        /// Total amount claimed by the outputs.
        outputs: u64,
    },
    /// Summing the transaction amounts overflowed.
    #[error("transaction amounts cause an arithmetic overflow")]
    AmountOverflow,
    /// No unlock data was provided for the script at this index.
    #[error("missing unlock data for script {0}")]
    MissingUnlockData(usize),
    /// The script at this index is not ASCII text.
    #[error("script {0} is not ascii source text")]
    InvalidSource(usize),
    /// The script was rejected by the compiler.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The witness loop trees were malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The script trapped while executing.
    #[error(transparent)]
    Vm(#[from] VmError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_u8_trap_reason_round_trip() {
        let last_known_trap_reason: u8 = TrapReason::iter().last().unwrap() as u8 + 1;
        let reason = TrapReason::from(0);
        assert_eq!(reason, TrapReason::UnknownTrapReason);

        for i in 1..last_known_trap_reason {
            let reason = TrapReason::from(i);
            let i2 = reason as u8;
            assert_eq!(i, i2);
        }
        for i in last_known_trap_reason..=255 {
            let reason = TrapReason::from(i);
            let i2 = reason as u8;
            assert_eq!(TrapReason::UnknownTrapReason as u8, i2);
        }
    }
}
