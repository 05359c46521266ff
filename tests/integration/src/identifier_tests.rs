//! Canonical identifier handling at the node boundary

use crate::test_utils::{memory_node, witness_list};
use dagchain_consensus::ConsensusError;
use dagchain_domain::{decode_lenient, decode_strict, is_valid_address, Address, AddressError};
use dagchain_witness::RegistryError;

#[test]
fn test_lowercase_replacement_rejected_registry_unchanged() {
    let witnesses = witness_list();
    let node = memory_node(&witnesses);
    let candidate = Address::from_definition(b"lowercase-candidate");
    let lower = candidate.as_str().to_lowercase();

    // the same identifier is fine for lenient readers
    assert_eq!(decode_lenient(&lower).unwrap(), candidate.payload());
    assert!(matches!(decode_strict(&lower), Err(AddressError::InvalidFormat(_))));
    assert!(!is_valid_address(&lower));

    let before = node.get_current_witnesses().unwrap();
    let result = node.propose_replacement(witnesses[4].as_str(), &lower);
    assert!(matches!(
        result,
        Err(ConsensusError::Registry(RegistryError::InvalidIdentifier { .. }))
    ));
    assert_eq!(node.get_current_witnesses().unwrap(), before);
}

#[test]
fn test_corrupted_identifier_rejected() {
    let witnesses = witness_list();
    let node = memory_node(&witnesses);
    let candidate = Address::from_definition(b"corrupted-candidate").to_string();

    let mut chars: Vec<char> = candidate.chars().collect();
    chars[10] = if chars[10] == 'A' { 'B' } else { 'A' };
    let corrupted: String = chars.into_iter().collect();

    assert!(matches!(decode_lenient(&corrupted), Err(AddressError::InvalidChecksum)));
    assert!(matches!(
        node.propose_replacement(witnesses[0].as_str(), &corrupted),
        Err(ConsensusError::Registry(RegistryError::InvalidIdentifier { .. }))
    ));
    assert!(matches!(
        node.propose_replacement(witnesses[0].as_str(), &candidate[..31]),
        Err(ConsensusError::Registry(RegistryError::InvalidIdentifier { .. }))
    ));
}

#[test]
fn test_unknown_old_and_existing_new() {
    let witnesses = witness_list();
    let node = memory_node(&witnesses);
    let stranger = Address::from_definition(b"stranger");

    assert!(matches!(
        node.propose_replacement(stranger.as_str(), Address::from_definition(b"x").as_str()),
        Err(ConsensusError::Registry(RegistryError::NotFound { .. }))
    ));
    assert!(matches!(
        node.propose_replacement(witnesses[0].as_str(), witnesses[1].as_str()),
        Err(ConsensusError::Registry(RegistryError::DuplicateEntry { .. }))
    ));
    assert_eq!(node.get_current_witnesses().unwrap().version(), 0);
}
