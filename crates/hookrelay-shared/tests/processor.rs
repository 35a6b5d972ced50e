//! Hook processor lifecycle against a recording transport.

use hookrelay_shared::{
    CommunicationMode, Error, FailurePolicy, HookProcessor, HookScope, HookSettings,
    ProcessorState, RelayTransport, Result, WindowHandle,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Install { procedure: String, hook_type: i32, scope: HookScope },
    Uninstall(u32),
    CreateChannel,
    CloseChannel(u32),
    Pull,
    CopyData { target: Option<WindowHandle>, len: usize },
    ClearStaging,
}

#[derive(Default)]
struct MockTransport {
    calls: Rc<RefCell<Vec<Call>>>,
    fail_install: bool,
    fail_channel: bool,
    messages: Vec<Vec<u8>>,
}

impl MockTransport {
    fn new() -> (Self, Rc<RefCell<Vec<Call>>>) {
        let transport = Self::default();
        let calls = transport.calls.clone();
        (transport, calls)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl RelayTransport for MockTransport {
    type Hook = u32;
    type Channel = u32;

    fn owner_thread(&self, window: WindowHandle) -> u32 {
        window.0 as u32 + 1000
    }

    fn install_hook(
        &mut self,
        procedure_name: &str,
        procedure_type: i32,
        scope: HookScope,
    ) -> Result<u32> {
        self.record(Call::Install {
            procedure: procedure_name.to_string(),
            hook_type: procedure_type,
            scope,
        });
        if self.fail_install {
            return Err(Error::HookInstall {
                procedure: procedure_name.to_string(),
                reason: "procedure not exported".into(),
            });
        }
        Ok(7)
    }

    fn uninstall_hook(&mut self, hook: u32) {
        self.record(Call::Uninstall(hook));
    }

    fn create_channel(&mut self) -> Result<u32> {
        self.record(Call::CreateChannel);
        if self.fail_channel {
            return Err(Error::ChannelUnavailable("access denied".into()));
        }
        Ok(9)
    }

    fn close_channel(&mut self, channel: u32) {
        self.record(Call::CloseChannel(channel));
    }

    fn pull(&mut self, _channel: &mut u32, out: &mut Vec<u8>) -> Result<usize> {
        self.record(Call::Pull);
        if !self.messages.is_empty() {
            out.extend(self.messages.remove(0));
        }
        Ok(out.len())
    }

    fn copy_data(&mut self, target: Option<WindowHandle>, payload: &[u8]) -> Result<isize> {
        self.record(Call::CopyData {
            target,
            len: payload.len(),
        });
        Ok(1)
    }

    fn clear_staging(&mut self) {
        self.record(Call::ClearStaging);
    }
}

fn count(calls: &Rc<RefCell<Vec<Call>>>, pred: impl Fn(&Call) -> bool) -> usize {
    calls.borrow().iter().filter(|c| pred(c)).count()
}

#[test]
fn test_one_way_installs_session_hook_without_channel() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);

    processor.initialize_with("GetMessageProc", 3).unwrap();

    assert_eq!(processor.state(), ProcessorState::Active);
    assert!(processor.is_hook_installed());
    assert!(!processor.is_channel_open());
    assert_eq!(
        calls.borrow().as_slice(),
        &[Call::Install {
            procedure: "GetMessageProc".into(),
            hook_type: 3,
            scope: HookScope::Session,
        }]
    );
}

#[test]
fn test_two_way_creates_channel_before_thread_scoped_hook() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);
    let settings = HookSettings::new("CallWndProc", 4)
        .with_window(WindowHandle(0x20))
        .with_mode(CommunicationMode::TwoWay);

    processor.initialize(&settings).unwrap();

    assert!(processor.is_channel_open());
    assert_eq!(processor.target_window(), Some(WindowHandle(0x20)));
    assert_eq!(processor.mode(), CommunicationMode::TwoWay);
    assert_eq!(
        calls.borrow().as_slice(),
        &[
            Call::CreateChannel,
            Call::Install {
                procedure: "CallWndProc".into(),
                hook_type: 4,
                scope: HookScope::Thread(0x20 + 1000),
            },
        ]
    );
}

#[test]
fn test_push_without_hook_makes_no_transport_call() {
    let (mut transport, calls) = MockTransport::new();
    transport.fail_install = true;
    let mut processor = HookProcessor::new(transport);

    // Degraded: initialization itself succeeds.
    processor.initialize_with("Missing", 3).unwrap();
    assert_eq!(processor.state(), ProcessorState::Active);
    assert!(!processor.is_hook_installed());

    assert!(matches!(
        processor.push_bytes(b"payload"),
        Err(Error::HookNotInstalled)
    ));
    assert_eq!(count(&calls, |c| matches!(c, Call::CopyData { .. })), 0);
}

#[test]
fn test_push_before_initialize_fails() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);

    assert!(matches!(
        processor.push_text("hello"),
        Err(Error::HookNotInstalled)
    ));
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_push_sends_to_target_window() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);
    processor
        .initialize(&HookSettings::new("GetMessageProc", 3).with_window(WindowHandle(0x44)))
        .unwrap();

    processor.push_text("hi").unwrap();
    processor.push_bytes(&[1, 2, 3]).unwrap();

    let sends: Vec<Call> = calls
        .borrow()
        .iter()
        .filter(|c| matches!(c, Call::CopyData { .. }))
        .cloned()
        .collect();
    assert_eq!(
        sends,
        vec![
            Call::CopyData {
                target: Some(WindowHandle(0x44)),
                len: 4,
            },
            Call::CopyData {
                target: Some(WindowHandle(0x44)),
                len: 3,
            },
        ]
    );
}

#[test]
fn test_pull_appends_channel_messages() {
    let (mut transport, _calls) = MockTransport::new();
    transport.messages = vec![b"first".to_vec(), b"second".to_vec()];
    let mut processor = HookProcessor::new(transport);
    processor
        .initialize(&HookSettings::new("GetMessageProc", 3).with_mode(CommunicationMode::TwoWay))
        .unwrap();

    let mut out = Vec::new();
    assert_eq!(processor.pull_bytes(&mut out).unwrap(), 5);
    assert_eq!(processor.pull_bytes(&mut out).unwrap(), 11);
    assert_eq!(out, b"firstsecond");
}

#[test]
fn test_pull_without_channel_fails() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);
    processor.initialize_with("GetMessageProc", 3).unwrap();

    let mut out = Vec::new();
    assert!(matches!(
        processor.pull_bytes(&mut out),
        Err(Error::ChannelUnavailable(_))
    ));
    assert_eq!(count(&calls, |c| *c == Call::Pull), 0);
}

#[test]
fn test_dispose_is_idempotent() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);
    processor
        .initialize(&HookSettings::new("GetMessageProc", 3).with_mode(CommunicationMode::TwoWay))
        .unwrap();

    processor.dispose();
    processor.dispose();
    drop(processor);

    assert_eq!(count(&calls, |c| *c == Call::ClearStaging), 1);
    assert_eq!(count(&calls, |c| *c == Call::CloseChannel(9)), 1);
    assert_eq!(count(&calls, |c| *c == Call::Uninstall(7)), 1);
}

#[test]
fn test_drop_disposes_active_processor() {
    let (transport, calls) = MockTransport::new();
    {
        let mut processor = HookProcessor::new(transport);
        processor.initialize_with("GetMessageProc", 3).unwrap();
    }

    assert_eq!(count(&calls, |c| *c == Call::ClearStaging), 1);
    assert_eq!(count(&calls, |c| *c == Call::Uninstall(7)), 1);
}

#[test]
fn test_degraded_channel_failure_still_installs_hook() {
    let (mut transport, calls) = MockTransport::new();
    transport.fail_channel = true;
    let mut processor = HookProcessor::new(transport);

    processor
        .initialize(&HookSettings::new("GetMessageProc", 3).with_mode(CommunicationMode::TwoWay))
        .unwrap();

    assert!(!processor.is_channel_open());
    assert!(processor.is_hook_installed());

    processor.dispose();
    processor.dispose();
    assert_eq!(count(&calls, |c| matches!(c, Call::CloseChannel(_))), 0);
    assert_eq!(count(&calls, |c| *c == Call::Uninstall(7)), 1);
}

#[test]
fn test_strict_hook_failure_releases_channel() {
    let (mut transport, calls) = MockTransport::new();
    transport.fail_install = true;
    let mut processor = HookProcessor::new(transport);
    let settings = HookSettings::new("Missing", 3)
        .with_mode(CommunicationMode::TwoWay)
        .with_policy(FailurePolicy::Strict);

    let result = processor.initialize(&settings);

    assert!(matches!(result, Err(Error::HookInstall { .. })));
    assert_eq!(processor.state(), ProcessorState::Disposed);
    assert!(!processor.is_channel_open());

    processor.dispose();
    drop(processor);
    assert_eq!(count(&calls, |c| *c == Call::CloseChannel(9)), 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::Uninstall(_))), 0);
}

#[test]
fn test_strict_channel_failure_skips_hook() {
    let (mut transport, calls) = MockTransport::new();
    transport.fail_channel = true;
    let mut processor = HookProcessor::new(transport);
    let settings = HookSettings::new("GetMessageProc", 3)
        .with_mode(CommunicationMode::TwoWay)
        .with_policy(FailurePolicy::Strict);

    assert!(matches!(
        processor.initialize(&settings),
        Err(Error::ChannelUnavailable(_))
    ));
    assert_eq!(count(&calls, |c| matches!(c, Call::Install { .. })), 0);
}

#[test]
fn test_disposed_processor_cannot_be_reinitialized() {
    let (transport, _calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);
    processor.initialize_with("GetMessageProc", 3).unwrap();
    processor.dispose();

    assert!(matches!(
        processor.initialize_with("GetMessageProc", 3),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_dispose_uninitialized_leaves_staging_alone() {
    let (transport, calls) = MockTransport::new();
    let mut processor = HookProcessor::new(transport);

    processor.dispose();

    assert_eq!(processor.state(), ProcessorState::Disposed);
    assert!(calls.borrow().is_empty());
}
