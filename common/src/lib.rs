use ethereum_types::{Address, U256};

/// Canonical textual form of an address: lowercase hex, fixed width, no
/// `0x` prefix. This is the encoding persisted in the address mapping
/// store, one address per line.
pub fn canonical_hex(address: &Address) -> String {
    format!("{address:x}")
}

/// Parses an address from its canonical hex form. A leading `0x` prefix
/// is tolerated. Returns `None` unless the input decodes to exactly 20
/// bytes.
pub fn parse_address(s: &str) -> Option<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    (bytes.len() == Address::len_bytes()).then(|| Address::from_slice(&bytes))
}

/// Converts an amount in `ETH` to `wei` units.
pub fn eth_to_wei(eth: U256) -> U256 {
    // 1 ether = 10^18 wei.
    eth * U256::from(10).pow(18.into())
}

/// Converts an amount in `gwei` to `wei` units.
/// This also works for converting `ETH` to `gwei`.
pub fn gwei_to_wei(eth: U256) -> U256 {
    // 1 ether = 10^9 gwei = 10^18 wei.
    eth * U256::from(10).pow(9.into())
}

#[test]
fn test_eth_conversion() {
    assert_eq!(
        eth_to_wei(U256::one()),
        gwei_to_wei(gwei_to_wei(U256::one()))
    );
}

#[test]
fn test_canonical_hex_round_trips() {
    let address = Address::repeat_byte(0xab);
    let hex = canonical_hex(&address);
    assert_eq!(hex.len(), 2 * Address::len_bytes());
    assert_eq!(parse_address(&hex), Some(address));
    assert_eq!(parse_address(&format!("0x{hex}")), Some(address));
}

#[test]
fn test_canonical_hex_keeps_leading_zeros() {
    let mut bytes = [0u8; 20];
    bytes[19] = 0x0f;
    assert_eq!(
        canonical_hex(&Address::from(bytes)),
        "000000000000000000000000000000000000000f"
    );
}

#[test]
fn test_parse_address_rejects_bad_input() {
    assert_eq!(parse_address(""), None);
    assert_eq!(parse_address("zz"), None);
    assert_eq!(parse_address("abab"), None);
}
