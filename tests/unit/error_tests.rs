//! Unit tests for `AppError` display format and conversions.

use testhost_session::AppError;

#[test]
fn each_kind_has_its_own_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Launch("x".into()), "launch: x"),
        (AppError::Protocol("x".into()), "protocol: x"),
        (AppError::Version("x".into()), "version: x"),
        (AppError::Transport("x".into()), "transport: x"),
        (AppError::Codec("x".into()), "codec: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::Cancelled("x".into()), "cancelled: x"),
        (AppError::Io("x".into()), "io: x"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Transport("peer disconnected".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_kind() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn json_error_converts_to_codec_kind() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    assert!(matches!(AppError::from(json_err), AppError::Codec(_)));
}

#[test]
fn toml_error_converts_to_config_kind() {
    let toml_err = toml::from_str::<toml::Value>("= 1").expect_err("invalid toml");
    match AppError::from(toml_err) {
        AppError::Config(msg) => assert!(msg.starts_with("invalid config")),
        other => panic!("expected Config error, got {other:?}"),
    }
}

#[test]
fn implements_std_error_trait() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&AppError::Timeout("peer connection".into()));
}
