//! Link search configuration for the native libclock backend.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=LIBCLOCK_DIR");

    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Ok(dir) = env::var("LIBCLOCK_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
        // Locate the shared library at run time without LD_LIBRARY_PATH
        println!("cargo:rustc-link-arg=-Wl,-rpath,{dir}");
    }
}
