//! Build script: embed the git hash and sanity-check GPU feature flags
//! before whisper-rs-sys starts its long compile.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
    {
        if output.status.success() {
            let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
            println!("cargo:rustc-env=GIT_HASH={}", hash);
        }
    }
    println!("cargo:rerun-if-changed=.git/HEAD");

    if cfg!(feature = "cuda") && Command::new("nvcc").arg("--version").output().is_err() {
        panic!(
            "`nvcc` not found — the CUDA toolkit is not installed.\n\
             Install it from https://developer.nvidia.com/cuda-downloads\n\
             or build without CUDA: cargo build --release"
        );
    }

    if cfg!(feature = "vulkan")
        && Command::new("vulkaninfo").arg("--summary").output().is_err()
    {
        panic!(
            "`vulkaninfo` not found — the Vulkan SDK is not installed.\n\
             Install it from https://vulkan.lunarg.com/\n\
             or build without Vulkan: cargo build --release"
        );
    }

    if cfg!(feature = "hipblas") && Command::new("rocminfo").output().is_err() {
        panic!(
            "`rocminfo` not found — ROCm is not installed.\n\
             Install it from https://rocm.docs.amd.com/\n\
             or build without HipBLAS: cargo build --release"
        );
    }
}
