//! Build script for livecov-core
//!
//! This script checks the toolchain before compilation:
//! - Minimum Rust version (C string literals and let-else)
//! - LLVM major version of the compiling `rustc`
//!
//! The LLVM major version is exported as `LIVECOV_RUSTC_LLVM_MAJOR`. The
//! profile runtime linked into instrumented binaries comes from the same LLVM,
//! so it selects the default runtime ABI.

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    let Ok(meta) = rustc_version::version_meta() else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
        return;
    };

    let min_rust_version = rustc_version::Version::new(1, 77, 0);
    if meta.semver < min_rust_version {
        panic!(
            "livecov-core requires Rust {} or newer, found {}",
            min_rust_version, meta.semver
        );
    }

    match meta.llvm_version {
        Some(llvm) => println!("cargo:rustc-env=LIVECOV_RUSTC_LLVM_MAJOR={}", llvm.major),
        None => println!("cargo:warning=could not detect the LLVM version of rustc"),
    }
}
