//! Transaction data model.
//!
//! Plain data consumed by the validation driver. Scripts and preambles
//! carry surface-language source; the unlock data paired with each
//! script carries the witness the VM needs: loop-tree bytes, the RAM
//! arena size, and the data buffers programs reach through `data(n)`.
//!
//! Signature and Merkle fields travel with the transaction but are
//! checked by outer layers, not by this crate.

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tx {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Additional scripts verified alongside the input scripts.
    pub preambles: Vec<Vec<u8>>,
    /// One entry per input script, then one per preamble.
    pub unlock_data: Vec<UnlockData>,
    pub signatures: Vec<Signature>,
}

/// One transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Input {
    pub outpoints: Vec<Outpoint>,
    pub bytecode_merkle_path: Vec<MerkleBranch>,
    /// Surface-language source of the validation script.
    pub bytecode: Vec<u8>,
}

/// One transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Output {
    pub amount: u64,
    pub bytecode_merkle_root: [u8; 32],
}

/// Witness data for one script run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlockData {
    /// Immutable buffers exposed to the program.
    pub data: Vec<Vec<u8>>,
    /// Encoded loop-tree forest.
    pub loop_trees: Vec<u8>,
    /// Size of the RAM arena, in bytes.
    pub ram_size: usize,
}

/// A signature covering part of the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature {
    pub sig_flags: u8,
    pub num_covered_checks: u32,
    pub signature: Vec<u8>,
}

/// Reference to a spent output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outpoint {
    pub tx_hash: [u8; 32],
    pub idx: u32,
    pub amount: u64,
    pub constraints: Vec<Constraint>,
    pub carryover: Vec<u8>,
}

/// One step of a Merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleBranch {
    pub side: MerkleSide,
    pub branch_hash: [u8; 32],
}

/// Which side a Merkle branch hashes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MerkleSide {
    Left = 1,
    Right = 2,
}

/// A spend constraint attached to an outpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    pub constraint_type: ConstraintType,
    pub payload: Vec<u8>,
}

/// What a constraint binds the spend to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConstraintType {
    PreambleHash = 1,
    PreamblesHash = 2,
    BlockHeight = 3,
    BlockHash = 4,
    Age = 5,
    Timestamp = 6,
}
