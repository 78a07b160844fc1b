fn main() {
    // Rebuild if fluid kernels change (they are embedded with include_str!)
    println!("cargo:rerun-if-changed=shaders/fluid/common.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/splat.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/curl.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/vorticity.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/divergence.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/scale.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/jacobi.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/gradient_subtract.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/advect.wgsl");

    // Rebuild if the demo overlay shader changes
    println!("cargo:rerun-if-changed=shaders/density_overlay.wgsl");
}
