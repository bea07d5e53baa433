//! The instrumentation engine: records operations as the replay driver
//! reports them and serializes them into deterministic, line-oriented,
//! append-only logs.

use std::io::{self, Write};

use ethereum_types::{Address, U256};
use inspector_common::canonical_hex;
use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::aggregator::OperationAggregator;
use crate::context::TransactionContext;
use crate::record::{AddressId, BlockMeta, CoinbaseReward, OperationKind, OperationRecord};
use crate::registry::{AddressRegistry, RegistryError};

/// Stores the result of recorder operations. Returns an [`InspectError`]
/// upon failure.
pub type InspectResult<T> = Result<T, InspectError>;

/// An error raised while recording or serializing operations.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The address registry failed to resolve or persist an identifier.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An append to one of the output logs failed. These are audit logs;
    /// the failure propagates instead of being swallowed.
    #[error("append to the {target} log failed: {source}")]
    Sink {
        /// Which log the append targeted.
        target: &'static str,
        /// The underlying I/O failure.
        source: io::Error,
    },
}

impl InspectError {
    fn sink(target: &'static str, source: io::Error) -> Self {
        InspectError::Sink { target, source }
    }
}

/// The three append-only output logs.
#[derive(Debug)]
pub struct Sinks<W> {
    /// Genesis allocation snapshot and block headers.
    pub blocks: W,
    /// Per-transaction aggregated operations.
    pub transactions: W,
    /// Created-contract bytecode dump.
    pub contracts: W,
}

/// Observes one replayed chain and writes the instrumentation logs.
///
/// The external replay driver calls the `record_*` methods as operation
/// events occur, the context setters once a transaction's outcome is
/// known, and the `write_*` methods at the transaction, block and
/// end-of-run boundaries. Each `write_*` operation flushes its target
/// even when serialization fails part-way, so previously buffered lines
/// are never lost to an early return.
///
/// A recorder built with [`disabled`](Self::disabled) performs no I/O at
/// all: every method is a silent no-op and address lookups resolve to
/// [`AddressId::NULL`].
///
/// Not safe for concurrent use; a single replay thread owns the engine.
#[derive(Debug)]
pub struct Recorder<W> {
    registry: AddressRegistry<W>,
    aggregator: OperationAggregator,
    context: TransactionContext,
    sinks: Option<Sinks<W>>,
}

impl<W> Recorder<W> {
    /// Creates an engine writing to `sinks`, resolving addresses through
    /// `registry`.
    pub fn new(registry: AddressRegistry<W>, sinks: Sinks<W>) -> Self {
        Self {
            registry,
            aggregator: OperationAggregator::default(),
            context: TransactionContext::default(),
            sinks: Some(sinks),
        }
    }

    /// Creates the disabled engine: no sinks, no mapping store, every
    /// operation a silent no-op.
    pub fn disabled() -> Self {
        Self {
            registry: AddressRegistry::disabled(),
            aggregator: OperationAggregator::default(),
            context: TransactionContext::default(),
            sinks: None,
        }
    }

    /// Whether this engine records and writes anything at all.
    pub fn is_enabled(&self) -> bool {
        self.sinks.is_some()
    }

    /// The address registry backing this engine.
    pub fn registry(&self) -> &AddressRegistry<W> {
        &self.registry
    }

    /// The output logs, if the engine is enabled.
    pub fn sinks(&self) -> Option<&Sinks<W>> {
        self.sinks.as_ref()
    }

    /// Marks the current transaction as failed or successful.
    pub fn set_failed(&mut self, failed: bool) {
        self.context.set_failed(failed);
    }

    /// Sets the current transaction's encoded size in bytes.
    pub fn set_size(&mut self, size: f64) {
        self.context.set_size(size);
    }

    /// Sets the enclosing block's coinbase rewards, consumed by the next
    /// block header write.
    pub fn set_coinbase_rewards(&mut self, rewards: Vec<CoinbaseReward>) {
        self.context.set_coinbase_rewards(rewards);
    }
}

impl<W: Write> Recorder<W> {
    fn record_op(
        &mut self,
        kind: OperationKind,
        from: Address,
        to: Address,
        value: Option<U256>,
        code: Option<Vec<u8>>,
    ) -> InspectResult<()> {
        if self.sinks.is_none() {
            return Ok(());
        }
        let record = OperationRecord {
            from: self.registry.id(from)?,
            to: self.registry.id(to)?,
            value,
            code,
        };
        self.aggregator.record(kind, record);
        Ok(())
    }

    /// Records a contract creation deploying `code` to `to`.
    pub fn record_create(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
        code: &[u8],
    ) -> InspectResult<()> {
        self.record_op(
            OperationKind::Create,
            from,
            to,
            Some(value),
            Some(code.to_vec()),
        )
    }

    /// Records a plain value call.
    pub fn record_call(&mut self, from: Address, to: Address, value: U256) -> InspectResult<()> {
        self.record_op(OperationKind::Call, from, to, Some(value), None)
    }

    /// Records a `CALLCODE` invocation.
    pub fn record_call_code(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> InspectResult<()> {
        self.record_op(OperationKind::CallCode, from, to, Some(value), None)
    }

    /// Records a `DELEGATECALL` invocation.
    pub fn record_delegate_call(&mut self, from: Address, to: Address) -> InspectResult<()> {
        self.record_op(OperationKind::DelegateCall, from, to, None, None)
    }

    /// Records a `STATICCALL` invocation.
    pub fn record_static_call(&mut self, from: Address, to: Address) -> InspectResult<()> {
        self.record_op(OperationKind::StaticCall, from, to, None, None)
    }

    /// Records a call into a precompiled contract.
    pub fn record_precompiled(&mut self, from: Address, to: Address) -> InspectResult<()> {
        self.record_op(OperationKind::Precompiled, from, to, None, None)
    }

    /// Records a `SELFDESTRUCT` crediting `value` to the beneficiary.
    pub fn record_selfdestruct(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> InspectResult<()> {
        self.record_op(OperationKind::Selfdestruct, from, to, Some(value), None)
    }

    /// Writes the genesis allocation snapshot to the blocks log: a
    /// `G <count>` header, then one `<id> <balance>` line per allocation,
    /// sorted by the address's canonical hex form ascending regardless of
    /// input order.
    pub fn write_genesis<I>(&mut self, allocations: I) -> InspectResult<()>
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        let Some(sinks) = self.sinks.as_mut() else {
            return Ok(());
        };

        // Resolve identifiers before serializing anything so a registry
        // failure cannot leave a partial snapshot behind.
        let sorted = allocations
            .into_iter()
            .sorted_by_key(|(address, _)| canonical_hex(address))
            .collect::<Vec<_>>();
        let mut lines = Vec::with_capacity(sorted.len());
        for (address, balance) in sorted {
            lines.push((self.registry.id(address)?, balance));
        }

        let written = write_genesis_record(&mut sinks.blocks, &lines);
        let flushed = sinks.blocks.flush();
        written.map_err(|source| InspectError::sink("block", source))?;
        flushed.map_err(|source| InspectError::sink("block", source))?;
        debug!("genesis allocation snapshot written, {} entries", lines.len());
        Ok(())
    }

    /// Writes one block header line to the blocks log: number, timestamp,
    /// gas used, gas limit, rounded byte size, the coinbase rewards in
    /// insertion order, and the transaction count. Consumes the pending
    /// reward list and returns the context to its zero value.
    pub fn write_block_header(&mut self, meta: &BlockMeta, tx_count: usize) -> InspectResult<()> {
        let Some(sinks) = self.sinks.as_mut() else {
            return Ok(());
        };

        let mut rewards = Vec::with_capacity(self.context.coinbase_rewards.len());
        for entry in &self.context.coinbase_rewards {
            rewards.push((self.registry.id(entry.coinbase)?, entry.reward));
        }

        let written = write_block_header_record(&mut sinks.blocks, meta, &rewards, tx_count);
        let flushed = sinks.blocks.flush();
        written.map_err(|source| InspectError::sink("block", source))?;
        flushed.map_err(|source| InspectError::sink("block", source))?;

        self.context.reset();
        debug!("block {} header written", meta.number);
        Ok(())
    }

    /// Serializes the aggregated operations of the current transaction to
    /// the transactions log, then clears the buckets and the
    /// per-transaction context.
    ///
    /// Output: a `T <failed 0|1> <size> <bucketCount>` header, then per
    /// non-empty bucket in fixed kind order a `<kindCode> <recordCount>`
    /// sub-header followed by one `<from> <to> [<value>] <count>` line
    /// per record in sorted order. `value` is present only for kinds
    /// that carry one.
    pub fn write_transaction(&mut self) -> InspectResult<()> {
        let Some(sinks) = self.sinks.as_mut() else {
            return Ok(());
        };

        let written =
            write_transaction_record(&mut sinks.transactions, &self.aggregator, &self.context);
        let flushed = sinks.transactions.flush();
        written.map_err(|source| InspectError::sink("transaction", source))?;
        flushed.map_err(|source| InspectError::sink("transaction", source))?;

        self.aggregator.clear();
        self.context.reset_transaction();
        debug!("transaction record flushed");
        Ok(())
    }

    /// Dumps every distinct creation record observed since process
    /// start, one `<contractID> 0x<bytecode hex>` line each, in
    /// first-seen order.
    ///
    /// Each call replays the full accumulated set; the dump is meant to
    /// run once at end-of-processing, not per transaction.
    pub fn write_created_contracts(&mut self) -> InspectResult<()> {
        let Some(sinks) = self.sinks.as_mut() else {
            return Ok(());
        };

        let written =
            write_created_contracts_record(&mut sinks.contracts, self.aggregator.created_contracts());
        let flushed = sinks.contracts.flush();
        written.map_err(|source| InspectError::sink("contract", source))?;
        flushed.map_err(|source| InspectError::sink("contract", source))?;
        debug!(
            "created-contracts dump written, {} entries",
            self.aggregator.created_contracts().len()
        );
        Ok(())
    }

    /// Flushes every sink and the registry store, ending the engine's
    /// lifecycle. Buffered lines are lost if the process exits without
    /// this.
    pub fn finish(self) -> InspectResult<()> {
        let Recorder { registry, sinks, .. } = self;
        if let Some(mut sinks) = sinks {
            sinks
                .blocks
                .flush()
                .map_err(|source| InspectError::sink("block", source))?;
            sinks
                .transactions
                .flush()
                .map_err(|source| InspectError::sink("transaction", source))?;
            sinks
                .contracts
                .flush()
                .map_err(|source| InspectError::sink("contract", source))?;
        }
        registry.close()?;
        Ok(())
    }
}

fn write_genesis_record<W: Write>(sink: &mut W, lines: &[(AddressId, U256)]) -> io::Result<()> {
    writeln!(sink, "G {}", lines.len())?;
    for (id, balance) in lines {
        writeln!(sink, "{id} {balance}")?;
    }
    Ok(())
}

fn write_block_header_record<W: Write>(
    sink: &mut W,
    meta: &BlockMeta,
    rewards: &[(AddressId, U256)],
    tx_count: usize,
) -> io::Result<()> {
    write!(
        sink,
        "B {} {} {} {} {:.0} {}",
        meta.number,
        meta.timestamp,
        meta.gas_used,
        meta.gas_limit,
        meta.size,
        rewards.len()
    )?;
    for (coinbase, reward) in rewards {
        write!(sink, " {coinbase} {reward}")?;
    }
    writeln!(sink, " {tx_count}")
}

fn write_transaction_record<W: Write>(
    sink: &mut W,
    aggregator: &OperationAggregator,
    context: &TransactionContext,
) -> io::Result<()> {
    writeln!(
        sink,
        "T {} {:.0} {}",
        context.failed as u8,
        context.size,
        aggregator.non_empty_buckets()
    )?;
    for kind in OperationKind::ALL {
        let records = aggregator.sorted_records(kind);
        if records.is_empty() {
            continue;
        }
        writeln!(sink, "{} {}", kind.code(), records.len())?;
        for (record, count) in records {
            write!(sink, "{} {}", record.from, record.to)?;
            if kind.carries_value() {
                if let Some(value) = record.value {
                    write!(sink, " {value}")?;
                }
            }
            writeln!(sink, " {count}")?;
        }
    }
    Ok(())
}

fn write_created_contracts_record<W: Write>(
    sink: &mut W,
    records: &[OperationRecord],
) -> io::Result<()> {
    for record in records {
        let code = record.code.as_deref().unwrap_or_default();
        writeln!(sink, "{} 0x{}", record.to, hex::encode(code))?;
    }
    Ok(())
}
