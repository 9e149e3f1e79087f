// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame check sequences. These are one-byte checksums, not CRCs.

/// XOR of every byte, as used by the UART and SPI NPI framings.
pub fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrapping 8-bit sum seeded with `seed`, as used by the serial bootloader.
pub fn sum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc.wrapping_add(*b))
}
