//! The data model shared by the registry, the aggregator and the
//! serializer.

use std::fmt::{self, Display};

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Dense integer identity assigned to an address by the
/// [`AddressRegistry`](crate::registry::AddressRegistry).
///
/// Identifiers substitute for full addresses in persisted output to
/// reduce size and allow fast equality comparisons. Once assigned, an
/// address's identifier never changes for the lifetime of the mapping
/// store.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct AddressId(pub u64);

impl AddressId {
    /// The identifier every lookup resolves to when instrumentation is
    /// disabled.
    pub const NULL: AddressId = AddressId(0);
}

impl Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of operation kinds observed while replaying a
/// transaction.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum OperationKind {
    /// Contract creation.
    Create = 0,
    /// Plain value call.
    Call = 1,
    /// `CALLCODE` invocation.
    CallCode = 2,
    /// `DELEGATECALL` invocation.
    DelegateCall = 3,
    /// `STATICCALL` invocation.
    StaticCall = 4,
    /// Call into a precompiled contract.
    Precompiled = 5,
    /// `SELFDESTRUCT`, crediting the remaining balance to a beneficiary.
    Selfdestruct = 6,
}

impl OperationKind {
    /// All kinds, in wire order. Transaction buckets are serialized in
    /// this order regardless of the order operations were recorded in.
    pub const ALL: [Self; 7] = [
        Self::Create,
        Self::Call,
        Self::CallCode,
        Self::DelegateCall,
        Self::StaticCall,
        Self::Precompiled,
        Self::Selfdestruct,
    ];

    /// Wire code emitted in transaction bucket sub-headers.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether records of this kind carry a transferred value.
    pub const fn carries_value(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Call | Self::CallCode | Self::Selfdestruct
        )
    }
}

/// One canonical occurrence of an operation between two identified
/// parties.
///
/// Two records with identical `(from, to, value, code)` are the same
/// entity; the aggregator maps each distinct record to an occurrence
/// count. The derived `Ord` is also the serialization order within a
/// bucket: ascending by `from`, then `to`, then `value`, then `code`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct OperationRecord {
    /// Identifier of the initiating party.
    pub from: AddressId,
    /// Identifier of the receiving party (the created contract for
    /// creation records).
    pub to: AddressId,
    /// Transferred value. Present only for kinds with
    /// [`carries_value`](OperationKind::carries_value).
    pub value: Option<U256>,
    /// Deployed bytecode. Present only for creation records.
    pub code: Option<Vec<u8>>,
}

/// Block reward credited to a coinbase address, produced externally per
/// block and consumed when the block header is written.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CoinbaseReward {
    /// The rewarded coinbase address.
    pub coinbase: Address,
    /// The reward amount in wei.
    pub reward: U256,
}

/// Block metadata exposed by the external replay engine. The only view
/// of a block this crate needs.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct BlockMeta {
    /// Block number.
    pub number: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
    /// Total gas used by the block.
    pub gas_used: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Encoded block size in bytes, serialized rounded to the nearest
    /// integer.
    pub size: f64,
}
