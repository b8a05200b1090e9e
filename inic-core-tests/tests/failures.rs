use core::time::Duration;
use inic_core::prelude::*;
use inic_core_tests::*;

const T0: Duration = Duration::ZERO;

/// Runs `rt` and takes the command it sent, leaving it unanswered.
fn sent(rt: &mut TestRuntime<'_>) -> Command {
    _ = rt.run_until_idle(T0, 8);
    rt.controller_mut()
        .next_unanswered()
        .expect("no command was sent")
}

fn built_a(s: &Scenario, rt: &mut TestRuntime<'_>) {
    rt.process(NODE, s.a, ConnectionLabel(0), 0).unwrap();
    _ = settle(rt, T0);
    _ = rt.sink_mut().take();
}

#[test]
fn unknown_handles_count_as_destroyed() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    built_a(&s, &mut rt);

    rt.destroy(NODE, s.a).unwrap();
    assert!(matches!(sent(&mut rt), Command::Destroy { .. }));
    rt.complete_destroy(NODE, Err(DeviceError::HandleNotFound));
    _ = settle(&mut rt, T0);

    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::DestroySuccess]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 0);
}

#[test]
fn busy_device_keeps_the_refused_handles() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    rt.process(NODE, s.c, ConnectionLabel(0), 0).unwrap();
    _ = settle(&mut rt, T0);
    _ = rt.sink_mut().take();

    rt.destroy(NODE, s.c).unwrap();
    let Command::Destroy { handles, .. } = sent(&mut rt) else {
        panic!("expected a destroy command");
    };
    assert_eq!(handles.len(), 4);

    rt.complete_destroy(NODE, Err(DeviceError::Busy { refused_at: 1 }));
    let Command::Destroy { handles: rest, .. } = sent(&mut rt) else {
        panic!("expected a destroy command");
    };
    assert_eq!(rest.as_slice(), &handles[1..]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 3);

    // Nothing destroyed, the same handles are sent again.
    rt.complete_destroy(NODE, Err(DeviceError::Busy { refused_at: 0 }));
    let Command::Destroy { handles: again, .. } = sent(&mut rt) else {
        panic!("expected a destroy command");
    };
    assert_eq!(again, rest);

    rt.complete_destroy(NODE, Ok(()));
    _ = settle(&mut rt, T0);
    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::DestroySuccess]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 0);
}

#[test]
fn busy_device_refusing_the_last_handle() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    rt.process(NODE, s.c, ConnectionLabel(0), 0).unwrap();
    _ = settle(&mut rt, T0);
    _ = rt.sink_mut().take();

    rt.destroy(NODE, s.c).unwrap();
    let Command::Destroy { handles, .. } = sent(&mut rt) else {
        panic!("expected a destroy command");
    };
    let last = handles.len() - 1;

    rt.complete_destroy(NODE, Err(DeviceError::Busy { refused_at: last }));
    let Command::Destroy { handles: rest, .. } = sent(&mut rt) else {
        panic!("expected a destroy command");
    };
    assert_eq!(rest.as_slice(), &[handles[last]]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 1);
    assert!(rt.sink().reports.is_empty());

    rt.complete_destroy(NODE, Ok(()));
    _ = settle(&mut rt, T0);
    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::DestroySuccess]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 0);
}

#[test]
fn full_transmit_buffer_retries_the_same_step() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    assert_eq!(rt.buffer_available(), 0);

    rt.controller_mut().refuse_next(CommandError::BufferOverflow);
    rt.process(NODE, s.a, ConnectionLabel(0), 0).unwrap();
    _ = rt.run_until_idle(T0, 8);
    assert_eq!(rt.controller().creates(), 0);
    assert!(rt.manager(NODE).unwrap().is_locked());
    assert!(rt.sink().reports.is_empty());

    assert_eq!(rt.buffer_available(), 1);
    assert_eq!(settle(&mut rt, T0), 2);
    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::BuildSuccess]);
    assert_eq!(rt.buffer_available(), 0);
}

#[test]
fn unanswered_command_times_out() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);

    rt.process(NODE, s.a, ConnectionLabel(0), 9).unwrap();
    assert!(matches!(sent(&mut rt), Command::Create { .. }));
    assert_eq!(rt.next_timeout(), Some(Duration::from_millis(100)));

    _ = rt.run_until_idle(Duration::from_millis(99), 8);
    assert!(rt.sink().reports.is_empty());

    _ = rt.run_until_idle(Duration::from_millis(100), 8);
    let report = rt.sink_mut().take()[0];
    assert_eq!(report.result.code, ResultCode::BuildError);
    assert_eq!(report.result.details.target, Some(DeviceError::Timeout));
    assert_eq!(report.result.details.resource_index, Some(0));
    assert_eq!(
        report.result.details.resource_type,
        Some(ResourceType::MostSocket)
    );
    assert_eq!(report.user_arg, 9);
    assert_eq!(rt.next_timeout(), None);

    // A late answer is dropped.
    rt.complete_create(
        NODE,
        Ok(CreateResponse {
            handle: FIRST_HANDLE,
            connection_label: None,
        }),
    );
    _ = rt.run_until_idle(Duration::from_millis(100), 8);
    let xrm = rt.manager(NODE).unwrap();
    assert!(!xrm.is_locked());
    assert_eq!(xrm.handle_count(), 0);
    assert_eq!(xrm.job_count(), 0);
    assert!(rt.sink().reports.is_empty());
}

#[test]
fn rejected_create_keeps_what_was_built() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);

    rt.process(NODE, s.c, ConnectionLabel(0), 0).unwrap();
    assert!(matches!(sent(&mut rt), Command::Create { .. }));
    rt.complete_create(
        NODE,
        Ok(CreateResponse {
            handle: FIRST_HANDLE,
            connection_label: None,
        }),
    );
    assert!(matches!(sent(&mut rt), Command::Create { .. }));
    rt.complete_create(NODE, Err(DeviceError::Rejected { code: 0x20 }));
    _ = rt.run_until_idle(T0, 8);

    let report = rt.sink_mut().take()[0];
    assert_eq!(report.result.code, ResultCode::BuildError);
    assert_eq!(
        report.result.details.target,
        Some(DeviceError::Rejected { code: 0x20 })
    );
    assert_eq!(report.result.details.resource_index, Some(1));
    assert_eq!(
        report.result.details.resource_type,
        Some(ResourceType::StreamSocket)
    );
    let failed = rt.sink().resources.last().unwrap();
    assert_eq!(failed.resource, s.stream_socket);
    assert_eq!(failed.event, ResourceEvent::BuildFailed);

    let xrm = rt.manager(NODE).unwrap();
    assert!(!xrm.is_built(s.c));
    assert_eq!(xrm.resource_handle(s.c, s.stream_port), Some(FIRST_HANDLE));
}

#[test]
fn refused_command_fails_the_build() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);

    rt.controller_mut()
        .refuse_next(CommandError::InvalidParameter);
    rt.process(NODE, s.a, ConnectionLabel(0), 0).unwrap();
    _ = rt.run_until_idle(T0, 8);

    let report = rt.sink().reports[0];
    assert_eq!(report.result.code, ResultCode::BuildError);
    assert_eq!(
        report.result.details.transmission,
        Some(CommandError::InvalidParameter)
    );
    assert_eq!(rt.manager(NODE).unwrap().job_count(), 0);
}

#[test]
fn failed_destroy_keeps_the_list_built() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    built_a(&s, &mut rt);

    rt.controller_mut().refuse_next(CommandError::NotAvailable);
    rt.destroy(NODE, s.a).unwrap();
    _ = rt.run_until_idle(T0, 8);
    let report = rt.sink_mut().take()[0];
    assert_eq!(report.result.code, ResultCode::DestroyError);
    assert_eq!(
        report.result.details.transmission,
        Some(CommandError::NotAvailable)
    );
    let xrm = rt.manager(NODE).unwrap();
    assert!(xrm.is_built(s.a));
    assert_eq!(xrm.handle_count(), 2);

    rt.destroy(NODE, s.a).unwrap();
    assert!(matches!(sent(&mut rt), Command::Destroy { .. }));
    rt.complete_destroy(NODE, Err(DeviceError::Rejected { code: 0x01 }));
    _ = rt.run_until_idle(T0, 8);
    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::DestroyError]);
    assert_eq!(rt.manager(NODE).unwrap().handle_count(), 2);

    rt.destroy(NODE, s.a).unwrap();
    _ = settle(&mut rt, T0);
    assert_eq!(
        rt.sink().codes().as_slice(),
        &[ResultCode::DestroyError, ResultCode::DestroySuccess]
    );
}

#[test]
fn remote_device_is_attached_before_the_first_create() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    rt.controller_mut().synced = false;

    rt.process(NODE, s.a, ConnectionLabel(0), 0).unwrap();
    assert_eq!(settle(&mut rt, T0), 3);
    assert_eq!(rt.controller().commands[0], Command::Sync(NODE));
    assert_eq!(rt.controller().creates(), 2);
    assert_eq!(rt.sink().codes().as_slice(), &[ResultCode::BuildSuccess]);
}

#[test]
fn failed_attachment_is_reported() {
    let s = Scenario::default();
    let cfg = config();
    let mut rt = runtime(&s.catalog, &cfg);
    rt.controller_mut().synced = false;

    rt.process(NODE, s.a, ConnectionLabel(0), 0).unwrap();
    assert_eq!(sent(&mut rt), Command::Sync(NODE));
    rt.complete_sync(NODE, Err(DeviceError::Rejected { code: 0x03 }));
    _ = rt.run_until_idle(T0, 8);

    let report = rt.sink().reports[0];
    assert_eq!(report.result.code, ResultCode::SyncError);
    assert_eq!(
        report.result.details.target,
        Some(DeviceError::Rejected { code: 0x03 })
    );
    let xrm = rt.manager(NODE).unwrap();
    assert!(!xrm.is_locked());
    assert_eq!(xrm.job_count(), 0);
    assert_eq!(rt.controller().creates(), 0);
}
