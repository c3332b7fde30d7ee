fn main() {
    // Always rerun if the build script itself changes.
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto");

    // Handle code generation for gRPC service definitions.
    tonic_build::configure()
        .build_server(false)
        .include_file("skywalking.mod.rs")
        .compile_protos(&["proto/language-agent/Tracing.proto"], &["proto"])
        .expect("failed to build gRPC service definitions for SkyWalking");
}
