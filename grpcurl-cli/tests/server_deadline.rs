mod common;

use std::sync::LazyLock;

use common::server::TestServer;
use common::{assert_exit_code, assert_output_contains, run};

static SERVER: LazyLock<TestServer> = LazyLock::new(TestServer::start);

/// A response interval longer than -max-time must time out with the
/// gRPC DeadlineExceeded exit code (64 + 4), not a generic exit 1.
#[test]
#[ignore]
fn server_stream_exceeds_max_time() {
    let r = run(&[
        "-plaintext",
        "-max-time",
        "200ms",
        "-d",
        r#"{"responseParameters":[{"size":1,"intervalUs":2000000}]}"#,
        &SERVER.addr,
        "testing.TestService/StreamingOutputCall",
    ]);
    assert_exit_code(&r, 68);
}

/// A generous max-time must not interfere with a call that completes well
/// within it.
#[test]
#[ignore]
fn unary_call_within_max_time() {
    let r = run(&[
        "-plaintext",
        "-max-time",
        "5s",
        &SERVER.addr,
        "testing.TestService/EmptyCall",
    ]);
    assert_exit_code(&r, 0);
}

/// -connect-timeout/-keepalive-time/-max-time/-max-msg-sz accept the
/// <number><unit> grammar, not just bare numbers.
#[test]
#[ignore]
fn duration_and_size_suffixes_are_accepted() {
    let r = run(&[
        "-plaintext",
        "-connect-timeout",
        "2s",
        "-keepalive-time",
        "30s",
        "-max-msg-sz",
        "4MB",
        &SERVER.addr,
        "testing.TestService/EmptyCall",
    ]);
    assert_exit_code(&r, 0);
}

/// Garbage duration/size suffixes are rejected as argument validation
/// errors (exit 1), before any connection is attempted.
#[test]
fn invalid_duration_suffix_rejected() {
    let r = run(&[
        "-plaintext",
        "-max-time",
        "5fortnights",
        "localhost:0",
        "list",
    ]);
    assert_exit_code(&r, 1);
    assert_output_contains(&r, "invalid value");
}

#[test]
fn invalid_size_suffix_rejected() {
    let r = run(&[
        "-plaintext",
        "-max-msg-sz",
        "1TB",
        "localhost:0",
        "list",
    ]);
    assert_exit_code(&r, 1);
    assert_output_contains(&r, "invalid value");
}
