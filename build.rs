//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::env;
use std::path::Path;

// Generates $OUT_DIR/sdk_version.rs, included by src/error.rs: the crate
// version stamped into error messages and the User-Agent sent with every
// admin request. The platform is the compilation target, not the build host.
fn main() {
    let out_dir = env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo");
    let version = env!("CARGO_PKG_VERSION");
    let rustc = rustc_version::version().expect("rustc version is available");
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_else(|_| env::consts::ARCH.to_string());
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_else(|_| env::consts::OS.to_string());
    let user_agent = format!("Bigtable-RustSDK/{} (rust{}; {}/{})", version, rustc, arch, os);
    let code = format!(
        "const SDK_VERSION: &str = {:?};\nconst USER_AGENT: &str = {:?};\n",
        version, user_agent
    );
    std::fs::write(Path::new(&out_dir).join("sdk_version.rs"), code)
        .expect("cannot write generated sdk_version.rs");
    println!("cargo::rerun-if-changed=build.rs");
}
