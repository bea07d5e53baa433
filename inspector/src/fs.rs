//! Opening the append-only file targets and assembling a file-backed
//! engine.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::recorder::{Recorder, Sinks};
use crate::registry::AddressRegistry;

/// Where the instrumentation output lives.
///
/// With `enabled: false` the whole engine becomes a silent no-op and no
/// file is opened or created. The flag is explicit configuration; it is
/// not inferred from missing paths or handles.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct InspectorConfig {
    /// Whether instrumentation is active at all.
    pub enabled: bool,
    /// Genesis allocation snapshot and block headers log.
    pub blocks_path: PathBuf,
    /// Per-transaction operation log.
    pub transactions_path: PathBuf,
    /// Created-contract bytecode log.
    pub contracts_path: PathBuf,
    /// Address mapping store, replayed at startup and extended as new
    /// addresses appear.
    pub mapping_path: PathBuf,
}

/// Opens (creating if missing) an append-only log target.
fn open_append(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open log target {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Builds a file-backed engine from `config`.
///
/// The mapping store is replayed first so identifiers resume where the
/// previous run stopped, then reopened for appending. When enabled, all
/// four targets must open successfully; a failure propagates to the
/// caller instead of degrading into partial instrumentation.
pub fn open_recorder(config: &InspectorConfig) -> anyhow::Result<Recorder<BufWriter<File>>> {
    if !config.enabled {
        info!("instrumentation disabled by configuration");
        return Ok(Recorder::disabled());
    }

    let mut registry = AddressRegistry::new(open_append(&config.mapping_path)?);
    let existing = File::open(&config.mapping_path).with_context(|| {
        format!(
            "could not read the address mapping store {}",
            config.mapping_path.display()
        )
    })?;
    registry
        .bootstrap(BufReader::new(existing))
        .context("could not replay the address mapping store")?;

    let sinks = Sinks {
        blocks: open_append(&config.blocks_path)?,
        transactions: open_append(&config.transactions_path)?,
        contracts: open_append(&config.contracts_path)?,
    };
    info!(
        "instrumentation logs opened: blocks={} transactions={} contracts={}",
        config.blocks_path.display(),
        config.transactions_path.display(),
        config.contracts_path.display()
    );
    Ok(Recorder::new(registry, sinks))
}

#[cfg(test)]
mod tests {
    use ethereum_types::{Address, U256};
    use inspector_common::canonical_hex;

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn config_in(dir: &Path) -> InspectorConfig {
        InspectorConfig {
            enabled: true,
            blocks_path: dir.join("blocks.txt"),
            transactions_path: dir.join("transactions.txt"),
            contracts_path: dir.join("contracts.txt"),
            mapping_path: dir.join("id_mapping.txt"),
        }
    }

    #[test]
    fn identifiers_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut recorder = open_recorder(&config).unwrap();
        recorder
            .record_call(addr(1), addr(2), U256::from(5))
            .unwrap();
        recorder.write_transaction().unwrap();
        recorder.finish().unwrap();

        // Second run: the known address keeps its id, a new one extends
        // the range.
        let mut recorder = open_recorder(&config).unwrap();
        recorder
            .record_call(addr(2), addr(3), U256::from(7))
            .unwrap();
        recorder.write_transaction().unwrap();
        recorder.finish().unwrap();

        let mapping = std::fs::read_to_string(&config.mapping_path).unwrap();
        assert_eq!(
            mapping,
            format!(
                "{}\n{}\n{}\n",
                canonical_hex(&addr(1)),
                canonical_hex(&addr(2)),
                canonical_hex(&addr(3))
            )
        );

        let transactions = std::fs::read_to_string(&config.transactions_path).unwrap();
        assert_eq!(
            transactions,
            "T 0 0 1\n1 1\n0 1 5 1\nT 0 0 1\n1 1\n1 2 7 1\n"
        );
    }

    #[test]
    fn disabled_config_creates_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.enabled = false;

        let mut recorder = open_recorder(&config).unwrap();
        assert!(!recorder.is_enabled());
        recorder
            .record_call(addr(1), addr(2), U256::from(5))
            .unwrap();
        recorder.write_transaction().unwrap();
        recorder.finish().unwrap();

        assert!(!config.blocks_path.exists());
        assert!(!config.transactions_path.exists());
        assert!(!config.contracts_path.exists());
        assert!(!config.mapping_path.exists());
    }

    #[test]
    fn unopenable_target_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.blocks_path = dir.path().join("missing").join("blocks.txt");

        assert!(open_recorder(&config).is_err());
    }
}
