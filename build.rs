use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=ROCM_PATH");

    // The HIP runtime is only linked when the real device driver is wanted.
    // Default builds stay GPU-free so the crate can compile and test anywhere.
    if env::var("CARGO_FEATURE_ROCM").is_ok() {
        let rocm_root = env::var("ROCM_PATH").unwrap_or_else(|_| "/opt/rocm".to_string());
        println!("cargo:rustc-link-search=native={}/lib", rocm_root);
        println!("cargo:rustc-link-lib=dylib=amdhip64");
    }
}
