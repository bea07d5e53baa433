//! Address interning backed by an append-only persistent mapping store.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use ethereum_types::Address;
use inspector_common::{canonical_hex, parse_address};
use log::{info, trace};
use thiserror::Error;

use crate::record::AddressId;

/// Stores the result of registry operations. Returns a [`RegistryError`]
/// upon failure.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// An error raised while reading or extending the mapping store.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A bootstrap line did not decode to an address. Skipping it would
    /// silently shift every later identifier, so this is fatal.
    #[error("malformed address on mapping store line {line}: {text:?}")]
    MalformedLine {
        /// 0-based line number of the offending line.
        line: usize,
        /// The raw line content.
        text: String,
    },

    /// The mapping store could not be read or appended to.
    #[error("address mapping store I/O failed: {0}")]
    Store(#[from] std::io::Error),
}

/// Interns addresses into dense, process-wide unique identifiers.
///
/// Identifiers are assigned in first-seen order starting at 0 and stay
/// stable for the lifetime of the mapping store: the store holds one
/// canonical hex address per line, and a line's 0-based position is its
/// identifier. A registry without a backing store is the disabled mode:
/// every lookup resolves to [`AddressId::NULL`] and never touches the
/// filesystem.
///
/// The in-memory map grows monotonically with the number of distinct
/// addresses seen; there is no eviction.
#[derive(Debug)]
pub struct AddressRegistry<W> {
    ids: HashMap<Address, AddressId>,
    next: u64,
    store: Option<W>,
}

impl<W> AddressRegistry<W> {
    /// Creates an empty registry appending new addresses to `store`.
    pub fn new(store: W) -> Self {
        Self {
            ids: HashMap::new(),
            next: 0,
            store: Some(store),
        }
    }

    /// Creates the disabled registry: no backing store, every lookup
    /// resolves to [`AddressId::NULL`].
    pub fn disabled() -> Self {
        Self {
            ids: HashMap::new(),
            next: 0,
            store: None,
        }
    }

    /// Replays an existing mapping store, assigning identifiers in file
    /// order starting at 0. This reproduces the identical id space that
    /// would have resulted from fully replaying history from the start.
    pub fn bootstrap(&mut self, reader: impl BufRead) -> RegistryResult<()> {
        for (line, text) in reader.lines().enumerate() {
            let text = text?;
            let address = parse_address(&text).ok_or_else(|| RegistryError::MalformedLine {
                line,
                text: text.clone(),
            })?;
            self.ids.insert(address, AddressId(self.next));
            self.next += 1;
        }
        info!("address mapping store replayed, next id {}", self.next);
        Ok(())
    }

    /// Number of distinct addresses known to the registry.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the registry has seen no addresses yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<W: Write> AddressRegistry<W> {
    /// Returns the identifier for `address`, assigning and persisting
    /// the next sequential one on first sight.
    ///
    /// Every new entry is flushed to the store immediately, so a crash
    /// cannot orphan an already-assigned identifier. Lookups of known
    /// addresses perform no I/O.
    pub fn id(&mut self, address: Address) -> RegistryResult<AddressId> {
        let Some(store) = self.store.as_mut() else {
            return Ok(AddressId::NULL);
        };
        if let Some(&id) = self.ids.get(&address) {
            return Ok(id);
        }
        writeln!(store, "{}", canonical_hex(&address))?;
        store.flush()?;
        let id = AddressId(self.next);
        self.ids.insert(address, id);
        self.next += 1;
        trace!("assigned id {id} to address {address:x}");
        Ok(id)
    }

    /// Flushes and releases the backing store, ending the registry's
    /// lifecycle.
    pub fn close(mut self) -> RegistryResult<Option<W>> {
        if let Some(store) = self.store.as_mut() {
            store.flush()?;
        }
        Ok(self.store.take())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Cursor;

    use rand::Rng;

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let mut registry = AddressRegistry::new(Vec::new());
        let a = registry.id(addr(1)).unwrap();
        let b = registry.id(addr(2)).unwrap();
        assert_eq!(a, AddressId(0));
        assert_eq!(b, AddressId(1));
        assert_ne!(a, b);
        assert_eq!(registry.id(addr(1)).unwrap(), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn bootstrap_extends_the_id_space() {
        let mut store = String::new();
        for byte in 0..5u8 {
            store.push_str(&canonical_hex(&addr(byte)));
            store.push('\n');
        }

        let mut registry = AddressRegistry::new(Vec::new());
        registry.bootstrap(Cursor::new(store)).unwrap();
        assert_eq!(registry.len(), 5);

        // Known addresses keep their replayed ids, new ones extend the
        // dense range.
        assert_eq!(registry.id(addr(3)).unwrap(), AddressId(3));
        assert_eq!(registry.id(addr(9)).unwrap(), AddressId(5));
        assert_eq!(registry.id(addr(7)).unwrap(), AddressId(6));
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn store_receives_one_line_per_new_address() {
        let mut registry = AddressRegistry::new(Vec::new());
        registry.id(addr(1)).unwrap();
        registry.id(addr(1)).unwrap();
        registry.id(addr(2)).unwrap();

        let store = registry.close().unwrap().unwrap();
        assert_eq!(
            String::from_utf8(store).unwrap(),
            format!("{}\n{}\n", canonical_hex(&addr(1)), canonical_hex(&addr(2)))
        );
    }

    #[test]
    fn disabled_registry_returns_null_ids_without_io() {
        let mut registry = AddressRegistry::<Vec<u8>>::disabled();
        assert_eq!(registry.id(addr(1)).unwrap(), AddressId::NULL);
        assert_eq!(registry.id(addr(2)).unwrap(), AddressId::NULL);
        assert!(registry.is_empty());
        assert!(registry.close().unwrap().is_none());
    }

    #[test]
    fn malformed_bootstrap_line_is_fatal() {
        let mut registry = AddressRegistry::new(Vec::<u8>::new());
        let input = format!("{}\nnot hex at all\n", canonical_hex(&addr(1)));
        let err = registry.bootstrap(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn random_addresses_get_unique_dense_ids() {
        let mut rng = rand::thread_rng();
        let mut registry = AddressRegistry::new(Vec::new());

        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let mut bytes = [0u8; 20];
            rng.fill(&mut bytes[..]);
            let id = registry.id(Address::from(bytes)).unwrap();
            assert!((id.0 as usize) < registry.len());
            ids.insert(id);
        }
        assert_eq!(ids.len(), registry.len());
    }
}
