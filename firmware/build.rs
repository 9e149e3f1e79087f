// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` into the output directory and puts it on the linker
//! search path, so the layout is found whether or not the build runs from
//! the crate root.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// nRF52805: 192K flash, 24K RAM. The image owns the whole part, no
/// softdevice and no bootloader region.
const FLASH_SIZE_K: u32 = 192;
const RAM_SIZE_K: u32 = 24;

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());

    let memory_x_content = format!(
        r##"
        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            FLASH (rx) : ORIGIN = 0x00000000, LENGTH = {}K
            RAM : ORIGIN = 0x20000000, LENGTH = {}K
        }}
        "##,
        FLASH_SIZE_K, RAM_SIZE_K
    );
    File::create(out.join("./memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();

    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
