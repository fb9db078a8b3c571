use crate::error::CodecError;
use crate::state::{CodecKind, CodecState};

#[test]
fn test_configure_is_rejected_only_when_closed() {
    assert!(CodecState::Unconfigured.ensure_configurable().is_ok());
    assert!(CodecState::Configured.ensure_configurable().is_ok());
    assert!(matches!(
        CodecState::Closed.ensure_configurable(),
        Err(CodecError::State(_))
    ));
}

#[test]
fn test_work_requires_configured() {
    assert!(CodecState::Configured.ensure_configured("encode").is_ok());
    for state in [CodecState::Unconfigured, CodecState::Closed] {
        let err = state.ensure_configured("decode").unwrap_err();
        assert!(matches!(err, CodecError::State(ref msg) if msg.starts_with("decode()")));
    }
}

#[test]
fn test_reset_after_close_differs_by_kind() {
    assert!(matches!(
        CodecState::Closed.ensure_resettable(CodecKind::Encoder),
        Err(CodecError::State(_))
    ));
    assert_eq!(
        CodecState::Closed.ensure_resettable(CodecKind::Decoder),
        Ok(false)
    );
    assert_eq!(
        CodecState::Unconfigured.ensure_resettable(CodecKind::Encoder),
        Ok(true)
    );
    assert_eq!(
        CodecState::Configured.ensure_resettable(CodecKind::Decoder),
        Ok(true)
    );
}
