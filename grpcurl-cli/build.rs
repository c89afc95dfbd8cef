//! Compiles the protoset fixtures used by `tests/*.rs` into binary
//! `FileDescriptorSet`s, via `protox` (no system `protoc` required).

use std::path::Path;

use prost::Message;

fn compile(proto: &str, out: &str) {
    let include = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/src");
    let fds = protox::compile([proto], [include.as_path()])
        .unwrap_or_else(|e| panic!("failed to compile {proto}: {e}"));

    let out_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(out);
    std::fs::write(&out_path, fds.encode_to_vec())
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", out_path.display()));
}

fn main() {
    compile("test.proto", "test.pb");
    compile("test.proto", "test_full.pb");
    compile("test_complex.proto", "test_complex.pb");

    println!("cargo:rerun-if-changed=tests/testdata/src/test.proto");
    println!("cargo:rerun-if-changed=tests/testdata/src/test_complex.proto");
}
