use std::sync::Arc;

use dacapo::broadcast::Broadcaster;
use dacapo::exec::output::{OutputStream, drain_lines};
use dacapo::exec::{StderrTail, decode_line};
use dacapo_test_utils::{RecordingBroadcaster, init_tracing};

#[test]
fn valid_utf8_passes_through() {
    assert_eq!(decode_line("héllo 世界".as_bytes()), "héllo 世界");
}

#[test]
fn gbk_bytes_are_decoded() {
    // "你好" in GBK.
    let raw = [0xc4, 0xe3, 0xba, 0xc3];
    assert_eq!(decode_line(&raw), "你好");
}

#[test]
fn undecodable_bytes_become_replacement_characters() {
    let raw = [b'o', b'k', 0xff, 0xff];
    let text = decode_line(&raw);
    assert!(text.starts_with("ok"));
    assert!(text.contains('\u{FFFD}'));
}

#[test]
fn stderr_tail_keeps_the_last_characters() {
    let mut tail = StderrTail::new(10);
    tail.push_line("0123456789abcdef");

    assert_eq!(tail.into_string(), "...\n789abcdef\n");
}

#[test]
fn stderr_tail_under_cap_is_untouched() {
    let mut tail = StderrTail::new(100);
    tail.push_line("first");
    tail.push_line("");
    tail.push_line("third");

    assert_eq!(tail.into_string(), "first\n\nthird\n");
}

#[test]
fn stderr_tail_counts_characters_not_bytes() {
    let mut tail = StderrTail::new(3);
    for _ in 0..100 {
        tail.push_line("错误");
    }

    assert_eq!(tail.into_string(), "...\n错误\n");
}

#[tokio::test]
async fn drain_lines_strips_line_endings_and_keeps_empty_lines() {
    init_tracing();
    let recorder = Arc::new(RecordingBroadcaster::new());
    let broadcaster: Arc<dyn Broadcaster> = recorder.clone();
    let pipe: &[u8] = b"one\r\ntwo\n\nthree";

    let tail = drain_lines(
        pipe,
        "alpha".to_string(),
        OutputStream::Stdout,
        broadcaster,
        None,
    )
    .await;

    assert!(tail.is_none());
    assert_eq!(recorder.logs_for("alpha"), vec!["one", "two", "", "three"]);
}

#[tokio::test]
async fn drain_lines_captures_stderr_tail() {
    init_tracing();
    let recorder = Arc::new(RecordingBroadcaster::new());
    let broadcaster: Arc<dyn Broadcaster> = recorder.clone();
    let pipe: &[u8] = b"Traceback:\n  boom\n";

    let tail = drain_lines(
        pipe,
        "alpha".to_string(),
        OutputStream::Stderr,
        broadcaster,
        Some(StderrTail::new(2000)),
    )
    .await
    .expect("stderr reader hands back its tail");

    assert_eq!(tail.into_string(), "Traceback:\n  boom\n");
    assert_eq!(recorder.logs_for("alpha"), vec!["Traceback:", "  boom"]);
}
