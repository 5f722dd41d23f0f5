use super::{Call, MockProgram};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineState};
use crate::error::EngineError;
use crate::program::{AttachMode, AttachState, Attachment};
use caps::{CapSet, Capability};

#[test]
fn test_native_attach() {
    let program = MockProgram::default();
    let mut attachment = Attachment::attach(program.clone(), 3).unwrap();
    assert_eq!(attachment.mode(), Some(AttachMode::Native));

    attachment.detach().unwrap();
    assert_eq!(attachment.state(), AttachState::Detached);
    drop(attachment);
    assert_eq!(
        program.calls(),
        vec![Call::Attach(3, AttachMode::Native), Call::Detach(3, AttachMode::Native)]
    );
}

#[test]
fn test_attach_fallback_detaches_skb() {
    let program = MockProgram {
        fail_native: true,
        ..MockProgram::default()
    };
    let attachment = Attachment::attach(program.clone(), 7).unwrap();
    assert_eq!(attachment.state(), AttachState::Attached(AttachMode::Skb));

    drop(attachment);
    assert_eq!(
        program.calls(),
        vec![
            Call::Attach(7, AttachMode::Native),
            Call::Attach(7, AttachMode::Skb),
            Call::Detach(7, AttachMode::Skb),
        ]
    );
}

#[test]
fn test_attach_failure() {
    let program = MockProgram {
        fail_native: true,
        fail_skb: true,
        ..MockProgram::default()
    };
    let err = Attachment::attach(program.clone(), 2).err().unwrap();
    assert!(matches!(err, EngineError::Attach { if_index: 2, .. }));
    // nothing was attached, so nothing is detached
    assert!(program.calls().iter().all(|c| matches!(c, Call::Attach(..))));
}

#[test]
fn test_detach_is_idempotent() {
    let program = MockProgram::default();
    let mut attachment = Attachment::attach(program.clone(), 1).unwrap();
    attachment.detach().unwrap();
    attachment.detach().unwrap();
    drop(attachment);
    let detaches = program
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Detach(..)))
        .count();
    assert_eq!(detaches, 1);
}

#[test]
fn test_engine_start_stops_at_failed_attach() {
    let program = MockProgram {
        fail_native: true,
        fail_skb: true,
        ..MockProgram::default()
    };
    let result = Engine::start(EngineConfig::default(), program.clone(), 5);
    assert!(matches!(result, Err(EngineError::Attach { .. })));
    assert_eq!(program.calls().len(), 2);
}

#[test]
fn test_engine_start_detaches_after_umem_failure() {
    // without CAP_NET_RAW the AF_XDP socket cannot be created
    if caps::has_cap(None, CapSet::Effective, Capability::CAP_NET_RAW).unwrap_or(true) {
        eprintln!("skipping: CAP_NET_RAW is present");
        return;
    }
    let program = MockProgram {
        fail_native: true,
        ..MockProgram::default()
    };
    let result = Engine::start(EngineConfig::default(), program.clone(), 0xffff_ff00);
    assert!(matches!(result, Err(EngineError::Resource { .. })));
    assert_eq!(
        program.calls(),
        vec![
            Call::Attach(0xffff_ff00, AttachMode::Native),
            Call::Attach(0xffff_ff00, AttachMode::Skb),
            Call::Detach(0xffff_ff00, AttachMode::Skb),
        ]
    );
}

#[test]
fn test_engine_start_rejects_config_before_attach() {
    let program = MockProgram::default();
    let config = EngineConfig {
        frame_count: 3,
        ..EngineConfig::default()
    };
    let result = Engine::start(config, program.clone(), 5);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    assert!(program.calls().is_empty());
}

#[test]
fn test_teardown_before_socket() {
    let program = MockProgram {
        fail_native: true,
        ..MockProgram::default()
    };
    let attachment = Attachment::attach(program.clone(), 4).unwrap();
    let mut engine = Engine::assemble(EngineConfig::default(), Some(attachment), None, None);
    assert_eq!(engine.state(), EngineState::Uncreated);

    engine.shutdown();
    engine.shutdown();
    assert_eq!(engine.state(), EngineState::TornDown);
    drop(engine);
    assert_eq!(
        program.calls(),
        vec![
            Call::Attach(4, AttachMode::Native),
            Call::Attach(4, AttachMode::Skb),
            Call::Detach(4, AttachMode::Skb),
        ]
    );
}
