//! Scripted wire-level scenarios against `MockTransport`.
//!
//! Every command the engine sends must match the next expectation exactly,
//! so these tests pin down the byte sequences as well as the state
//! transitions.

use std::time::Duration;

use tokio::sync::broadcast;

use gsmlink_core::{Error, ModemEvent, NullPin, SignalLevel, SmsQueue};
use gsmlink_modem::commands::INIT_SEQUENCE;
use gsmlink_modem::{DispatchStatus, Modem, ModemBuilder, RegistrationPolicy};
use gsmlink_test_harness::{MockHandle, MockTransport, RecordingPin};

const LONG: Duration = Duration::from_secs(86_400);

fn build(builder: ModemBuilder) -> (Modem, MockHandle) {
    let mock = MockTransport::new();
    let handle = mock.handle();
    let modem = builder
        .build_with_transport(Box::new(mock), Box::new(NullPin), Box::new(NullPin))
        .unwrap();
    (modem, handle)
}

/// Immediate registration, keepalive out of the way.
fn quiet_modem() -> (Modem, MockHandle) {
    build(
        ModemBuilder::new()
            .registration_policy(RegistrationPolicy::Immediate)
            .keepalive_interval(LONG),
    )
}

fn drain(rx: &mut broadcast::Receiver<ModemEvent>) -> Vec<ModemEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn expect_store(handle: &MockHandle, number: &str, body: &str, index: u16) {
    handle.expect(format!("AT+CMGW=\"{number}\"\r").as_bytes(), b"\r\n> ");
    handle.expect(body.as_bytes(), b"");
    handle.expect(
        b"\x1a",
        format!("\r\n+CMGW: {index}\r\n\r\nOK\r\n").as_bytes(),
    );
}

async fn register(modem: &mut Modem, handle: &MockHandle) {
    handle.queue_unsolicited(b"\r\n+CREG: 1\r\n");
    modem.dispatch().await.unwrap();
    assert!(modem.is_registered());
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn initialize_pulses_power_and_negotiates_baud() {
    let mock = MockTransport::new();
    let handle = mock.handle();
    let power = RecordingPin::new();
    let mut modem = ModemBuilder::new()
        .build_with_transport(Box::new(mock), Box::new(NullPin), Box::new(power.clone()))
        .unwrap();

    handle.expect(b"AT+IPR=9600\r", b"AT+IPR=9600\r\r\nOK\r\n");
    handle.expect(INIT_SEQUENCE.as_bytes(), b"");
    handle.expect(b"\r", b"\r\nOK\r\n");

    modem.initialize().await.unwrap();

    assert_eq!(power.levels(), vec![true, false]);
    assert_eq!(handle.baud_rates(), vec![115_200, 9600]);
    assert_eq!(handle.remaining_expectations(), 0);
}

#[tokio::test(start_paused = true)]
async fn initialize_reports_rejected_sequence() {
    let (mut modem, handle) = build(ModemBuilder::new());
    handle.expect(b"AT+IPR=9600\r", b"\r\nOK\r\n");
    handle.expect(INIT_SEQUENCE.as_bytes(), b"");
    handle.expect(b"\r", b"\r\n+CME ERROR: 3\r\n");

    let err = modem.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Modem(line) if line == "+CME ERROR: 3"));
}

#[tokio::test(start_paused = true)]
async fn initialize_times_out_on_silent_modem() {
    let (mut modem, handle) = build(ModemBuilder::new());
    handle.expect(b"AT+IPR=9600\r", b"");
    handle.expect(INIT_SEQUENCE.as_bytes(), b"");
    handle.expect(b"\r", b"");

    assert!(matches!(modem.initialize().await, Err(Error::Timeout)));
}

// ---------------------------------------------------------------------------
// Store and forward
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn write_sms_returns_store_index() {
    let (mut modem, handle) = quiet_modem();
    expect_store(&handle, "+391234567890", "ON 22", 3);

    let index = modem.write_sms("+391234567890", "ON 22").await.unwrap();
    assert_eq!(index, 3);
    assert_eq!(modem.pending_urcs(), 0);
}

#[tokio::test(start_paused = true)]
async fn write_sms_keeps_interleaved_urc() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGW=\"+39111\"\r", b"\r\n> ");
    handle.expect(b"hello", b"");
    handle.expect(
        b"\x1a",
        b"\r\n+CMTI: \"SM\",5\r\n\r\n+CMGW: 6\r\n\r\nOK\r\n",
    );

    assert_eq!(modem.write_sms("+39111", "hello").await.unwrap(), 6);
    assert_eq!(modem.pending_urcs(), 1);

    // The next tick processes the queued notification before reading.
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 1);
    assert!(modem.is_sms_available());
}

#[tokio::test(start_paused = true)]
async fn write_sms_store_error() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGW=\"+39111\"\r", b"\r\n> ");
    handle.expect(b"hello", b"");
    handle.expect(b"\x1a", b"\r\n+CMS ERROR: 322\r\n");

    let err = modem.write_sms("+39111", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Modem(_)));
}

#[tokio::test(start_paused = true)]
async fn write_sms_refused_before_prompt() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGW=\"+39111\"\r", b"\r\n+CMS ERROR: 302\r\n");

    let err = modem.write_sms("+39111", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Modem(line) if line == "+CMS ERROR: 302"));
    assert_eq!(handle.count_sent(b"hello"), 0);
    assert_eq!(handle.sent_data().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn write_sms_without_prompt_abandons_body() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGW=\"+39111\"\r", b"");
    handle.expect(b"\x1b", b"");

    let err = modem.write_sms("+39111", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(handle.count_sent(b"hello"), 0);
    assert_eq!(handle.count_sent(b"\x1a"), 0);
    assert_eq!(handle.remaining_expectations(), 0);
}

#[tokio::test(start_paused = true)]
async fn write_sms_rejects_bad_arguments_without_io() {
    let (mut modem, handle) = quiet_modem();
    assert!(matches!(
        modem.write_sms("+39\"x", "hi").await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        modem.write_sms("+39111", &"x".repeat(161)).await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(handle.sent_data().is_empty());
}

#[tokio::test(start_paused = true)]
async fn end_to_end_store_queue_and_send() {
    let (mut modem, handle) = quiet_modem();
    let mut events = modem.subscribe();
    register(&mut modem, &handle).await;

    expect_store(&handle, "+391234567890", "ON 22", 3);
    assert_eq!(modem.send_sms("+391234567890", "ON 22").await.unwrap(), 3);
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 1);

    handle.expect(b"AT+CMSS=3\r", b"\r\n+CMSS: 12\r\n\r\nOK\r\n");
    handle.expect(b"AT+CMGD=3\r", b"\r\nOK\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);

    assert_eq!(modem.sms_count(SmsQueue::Outbound), 0);
    assert_eq!(handle.count_sent(b"AT+CMSS=3\r"), 1);
    assert_eq!(handle.remaining_expectations(), 0);
    assert_eq!(
        drain(&mut events),
        vec![
            ModemEvent::RegistrationChanged { registered: true },
            ModemEvent::SmsStored { index: 3 },
            ModemEvent::SmsSent { index: 3 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn outbound_waits_for_registration() {
    let (mut modem, handle) = quiet_modem();
    expect_store(&handle, "+39111", "hi", 1);
    modem.send_sms("+39111", "hi").await.unwrap();

    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Idle);
    assert_eq!(handle.count_sent(b"AT+CMSS=1\r"), 0);
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 1);
}

#[tokio::test(start_paused = true)]
async fn outbound_queue_full_discards_stored_copy() {
    let (mut modem, handle) = quiet_modem();
    for index in 1..=10 {
        expect_store(&handle, "+39111", "hi", index);
        modem.send_sms("+39111", "hi").await.unwrap();
    }
    expect_store(&handle, "+39111", "hi", 11);
    handle.expect(b"AT+CMGD=11\r", b"\r\nOK\r\n");

    let err = modem.send_sms("+39111", "hi").await.unwrap_err();
    assert!(matches!(err, Error::QueueFull(_)));
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 10);
    assert_eq!(handle.count_sent(b"AT+CMGD=11\r"), 1);
}

// ---------------------------------------------------------------------------
// Retry and backoff
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn twelve_send_failures_drop_the_message() {
    let (mut modem, handle) = quiet_modem();
    let mut events = modem.subscribe();
    register(&mut modem, &handle).await;
    expect_store(&handle, "+39111", "hi", 3);
    modem.send_sms("+39111", "hi").await.unwrap();
    drain(&mut events);

    for _ in 1..12 {
        handle.expect(b"AT+CMSS=3\r", b"\r\n+CMS ERROR: 500\r\n");
        assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);
        assert_eq!(modem.sms_count(SmsQueue::Outbound), 1);

        // Backoff in effect: no attempt until it expires.
        assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Idle);
        tokio::time::advance(Duration::from_millis(15_001)).await;
    }

    handle.expect(b"AT+CMSS=3\r", b"\r\n+CMS ERROR: 500\r\n");
    modem.dispatch().await.unwrap();

    assert_eq!(modem.sms_count(SmsQueue::Outbound), 0);
    assert_eq!(handle.count_sent(b"AT+CMSS=3\r"), 12);
    // A dropped message is not deleted from the store.
    assert_eq!(handle.count_sent(b"AT+CMGD=3\r"), 0);
    assert_eq!(drain(&mut events), vec![ModemEvent::SmsDropped { index: 3 }]);

    // A fresh message gets a fresh budget.
    expect_store(&handle, "+39111", "again", 4);
    modem.send_sms("+39111", "again").await.unwrap();
    handle.expect(b"AT+CMSS=4\r", b"\r\n+CMS ERROR: 500\r\n");
    modem.dispatch().await.unwrap();
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 1);
}

#[tokio::test(start_paused = true)]
async fn send_succeeds_within_budget() {
    let (mut modem, handle) = quiet_modem();
    register(&mut modem, &handle).await;
    expect_store(&handle, "+39111", "hi", 2);
    modem.send_sms("+39111", "hi").await.unwrap();

    for _ in 0..3 {
        handle.expect(b"AT+CMSS=2\r", b"\r\nERROR\r\n");
        modem.dispatch().await.unwrap();
        tokio::time::advance(Duration::from_millis(15_001)).await;
    }
    handle.expect(b"AT+CMSS=2\r", b"\r\nOK\r\n");
    handle.expect(b"AT+CMGD=2\r", b"\r\nOK\r\n");
    modem.dispatch().await.unwrap();

    assert_eq!(modem.sms_count(SmsQueue::Outbound), 0);
    assert_eq!(handle.count_sent(b"AT+CMSS=2\r"), 4);
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sixth_keepalive_failure_powers_off_once() {
    let (mut modem, handle) = build(ModemBuilder::new());
    let mut events = modem.subscribe();

    for _ in 0..5 {
        tokio::time::advance(Duration::from_millis(15_001)).await;
        handle.expect(b"AT\r", b"");
        assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Idle);
        assert!(!modem.is_fatal());
    }
    assert_eq!(handle.count_sent(b"AT+CPWROFF\r"), 0);

    tokio::time::advance(Duration::from_millis(15_001)).await;
    handle.expect(b"AT\r", b"");
    handle.expect(b"AT+CPWROFF\r", b"\r\nOK\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Fatal);
    assert!(modem.is_fatal());
    assert_eq!(drain(&mut events), vec![ModemEvent::Fatal]);

    // Still failing: flag stays, no second power-off.
    tokio::time::advance(Duration::from_millis(15_001)).await;
    handle.expect(b"AT\r", b"");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Fatal);
    assert_eq!(handle.count_sent(b"AT+CPWROFF\r"), 1);

    // Between keepalives the tick still reports the fatal state.
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Fatal);

    tokio::time::advance(Duration::from_millis(15_001)).await;
    handle.expect(b"AT\r", b"\r\nOK\r\n");
    modem.dispatch().await.unwrap();
    assert!(!modem.is_fatal());
    assert_eq!(drain(&mut events), vec![ModemEvent::Recovered]);
}

async fn fail_keepalives_until_fatal(modem: &mut Modem, handle: &MockHandle) {
    for round in 0..6 {
        tokio::time::advance(Duration::from_millis(15_001)).await;
        handle.expect(b"AT\r", b"");
        if round == 5 {
            handle.expect(b"AT+CPWROFF\r", b"\r\nOK\r\n");
        }
        modem.dispatch().await.unwrap();
    }
    assert!(modem.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn fatal_state_suspends_outbound_sends() {
    let (mut modem, handle) =
        build(ModemBuilder::new().registration_policy(RegistrationPolicy::Immediate));
    let mut events = modem.subscribe();
    register(&mut modem, &handle).await;
    fail_keepalives_until_fatal(&mut modem, &handle).await;

    expect_store(&handle, "+39111", "hello", 3);
    modem.send_sms("+39111", "hello").await.unwrap();
    drain(&mut events);

    // Input is still drained, but nothing is sent to the powered-off modem.
    handle.queue_unsolicited(b"\r\n+CMTI: \"SM\",4\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Fatal);
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Fatal);
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 1);
    assert_eq!(handle.count_sent(b"AT+CMSS=3\r"), 0);
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 1);
    assert_eq!(handle.remaining_expectations(), 0);

    // The first answered keepalive resumes the queue in the same tick.
    tokio::time::advance(Duration::from_millis(15_001)).await;
    handle.expect(b"AT\r", b"\r\nOK\r\n");
    handle.expect(b"AT+CMSS=3\r", b"\r\n+CMSS: 12\r\n\r\nOK\r\n");
    handle.expect(b"AT+CMGD=3\r", b"\r\nOK\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);
    assert!(!modem.is_fatal());
    assert_eq!(modem.sms_count(SmsQueue::Outbound), 0);
    assert_eq!(
        drain(&mut events),
        vec![
            ModemEvent::SmsReceived { index: 4 },
            ModemEvent::Recovered,
            ModemEvent::SmsSent { index: 3 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn modem_reset_ends_fatal_state() {
    let (mut modem, handle) = build(ModemBuilder::new());
    fail_keepalives_until_fatal(&mut modem, &handle).await;

    handle.queue_unsolicited(b"\r\n+XDRVI: 1,1,0\r\n");
    handle.expect(b"AT+IPR=9600\r", b"\r\nOK\r\n");
    handle.expect(INIT_SEQUENCE.as_bytes(), b"");
    handle.expect(b"\r", b"\r\nOK\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);

    assert!(!modem.is_fatal());
    assert_eq!(handle.remaining_expectations(), 0);
}

#[tokio::test(start_paused = true)]
async fn keepalive_success_resets_failure_count() {
    let (mut modem, handle) = build(ModemBuilder::new());

    for round in 0..12 {
        tokio::time::advance(Duration::from_millis(15_001)).await;
        // Every third keepalive is answered.
        let reply: &[u8] = if round % 3 == 2 { b"\r\nOK\r\n" } else { b"" };
        handle.expect(b"AT\r", reply);
        modem.dispatch().await.unwrap();
    }
    assert!(!modem.is_fatal());
    assert_eq!(handle.count_sent(b"AT+CPWROFF\r"), 0);
}

// ---------------------------------------------------------------------------
// Unsolicited codes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn registration_settle_delay() {
    let (mut modem, handle) = build(ModemBuilder::new().keepalive_interval(LONG));

    handle.queue_unsolicited(b"\r\n+CREG: 5\r\n");
    modem.dispatch().await.unwrap();
    assert!(!modem.is_registered());

    tokio::time::advance(Duration::from_millis(10_000)).await;
    modem.dispatch().await.unwrap();
    assert!(!modem.is_registered());

    tokio::time::advance(Duration::from_millis(5_001)).await;
    modem.dispatch().await.unwrap();
    assert!(modem.is_registered());
}

#[tokio::test(start_paused = true)]
async fn deregistration_cancels_settle_delay() {
    let (mut modem, handle) = build(ModemBuilder::new().keepalive_interval(LONG));

    handle.queue_unsolicited(b"\r\n+CREG: 1\r\n");
    modem.dispatch().await.unwrap();
    handle.queue_unsolicited(b"\r\n+CREG: 2\r\n");
    modem.dispatch().await.unwrap();

    tokio::time::advance(Duration::from_millis(20_000)).await;
    modem.dispatch().await.unwrap();
    assert!(!modem.is_registered());
}

#[tokio::test(start_paused = true)]
async fn signal_indicator_updates() {
    let (mut modem, handle) = quiet_modem();
    let mut events = modem.subscribe();

    handle.queue_unsolicited(b"\r\n+CIEV: 2,4\r\n\r\n+CIEV: 1,0\r\n\r\n+CIEV: 2,7\r\n");
    modem.dispatch().await.unwrap();
    assert_eq!(modem.signal_level(), SignalLevel::Bars(4));
    modem.dispatch().await.unwrap();
    assert_eq!(modem.signal_level(), SignalLevel::Bars(4));
    modem.dispatch().await.unwrap();
    assert_eq!(modem.signal_level(), SignalLevel::Unknown);

    assert_eq!(
        drain(&mut events),
        vec![
            ModemEvent::SignalChanged(SignalLevel::Bars(4)),
            ModemEvent::SignalChanged(SignalLevel::Unknown),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn phonebook_ready_clears_memory_with_retries() {
    let (mut modem, handle) = quiet_modem();
    handle.queue_unsolicited(b"\r\n+PBREADY\r\n");
    handle.expect(b"AT+CMGD=0,4\r", b"\r\n+CMS ERROR: 500\r\n");
    handle.expect(b"AT+CMGD=0,4\r", b"\r\nOK\r\n");

    modem.dispatch().await.unwrap();

    assert!(modem.is_phonebook_ready());
    assert_eq!(handle.count_sent(b"AT+CMGD=0,4\r"), 2);
    assert_eq!(handle.remaining_expectations(), 0);
}

#[tokio::test(start_paused = true)]
async fn modem_reset_reruns_handshake() {
    let (mut modem, handle) = quiet_modem();
    let mut events = modem.subscribe();
    register(&mut modem, &handle).await;
    handle.queue_unsolicited(b"\r\n+CMTI: \"SM\",1\r\n");
    modem.dispatch().await.unwrap();
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 1);
    drain(&mut events);

    handle.queue_unsolicited(b"\r\n+XDRVI: 1,1,0\r\n");
    handle.expect(b"AT+IPR=9600\r", b"\r\nOK\r\n");
    handle.expect(INIT_SEQUENCE.as_bytes(), b"");
    handle.expect(b"\r", b"\r\nOK\r\n");
    modem.dispatch().await.unwrap();

    assert_eq!(handle.remaining_expectations(), 0);
    assert!(!modem.is_registered());
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 0);
    assert_eq!(drain(&mut events), vec![ModemEvent::ModemReset]);
}

#[tokio::test(start_paused = true)]
async fn unhandled_lines_are_consumed() {
    let (mut modem, handle) = quiet_modem();
    handle.queue_unsolicited(b"\r\nRING\r\n\r\n+CMSS: 9\r\n");
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Handled);
    assert_eq!(modem.dispatch().await.unwrap(), DispatchStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn dispatch_surfaces_link_failure() {
    let (mut modem, handle) = quiet_modem();
    handle.set_connected(false);
    assert!(!modem.is_connected());
    let err = modem.dispatch().await.unwrap_err();
    assert!(err.is_link_failure());
}

#[tokio::test(start_paused = true)]
async fn close_disconnects() {
    let (mut modem, _handle) = quiet_modem();
    assert!(modem.is_connected());
    modem.close().await.unwrap();
    assert!(!modem.is_connected());
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn read_sms_keeps_bare_line_feeds() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(
        b"AT+CMGR=2\r",
        b"\r\n+CMGR: \"REC UNREAD\",\"+39111\",,\"26/10/18,12:00:00+08\"\r\nON 0000,22\nbye\r\n\r\nOK\r\n",
    );

    let sms = modem.read_sms_at_index(2).await.unwrap().unwrap();
    assert_eq!(sms.phone, "+39111");
    assert_eq!(sms.body, "ON 0000,22\nbye");
}

#[tokio::test(start_paused = true)]
async fn read_sms_header_without_body_fails() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGR=2\r", b"\r\n+CMGR: \"REC READ\",\"+39111\"\r\n");
    assert!(matches!(
        modem.read_sms_at_index(2).await,
        Err(Error::Timeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn read_empty_slot() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CMGR=9\r", b"\r\nOK\r\n");
    assert_eq!(modem.read_sms_at_index(9).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn dequeue_reads_then_deletes() {
    let (mut modem, handle) = quiet_modem();
    handle.queue_unsolicited(b"\r\n+CMTI: \"SM\",4\r\n");
    modem.dispatch().await.unwrap();

    handle.expect(
        b"AT+CMGR=4\r",
        b"\r\n+CMGR: \"REC UNREAD\",\"+39222\",,\"26/10/18,12:00:00+08\"\r\nOFF\r\n\r\nOK\r\n",
    );
    handle.expect(b"AT+CMGD=4\r", b"\r\nOK\r\n");

    let sms = modem.sms_dequeue(SmsQueue::Inbound).await.unwrap();
    assert_eq!(sms.body, "OFF");
    assert!(!modem.is_sms_available());

    assert!(matches!(
        modem.sms_dequeue(SmsQueue::Inbound).await,
        Err(Error::QueueEmpty(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn discard_deletes_without_reading() {
    let (mut modem, handle) = quiet_modem();
    handle.queue_unsolicited(b"\r\n+CMTI: \"SM\",7\r\n");
    modem.dispatch().await.unwrap();

    handle.expect(b"AT+CMGD=7\r", b"\r\nOK\r\n");
    modem.sms_discard(SmsQueue::Inbound).await.unwrap();
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 0);
    assert_eq!(handle.count_sent(b"AT+CMGR=7\r"), 0);
}

#[tokio::test(start_paused = true)]
async fn inbound_queue_overflow_drops_new_index() {
    let (mut modem, handle) = quiet_modem();
    for index in 1..=11 {
        handle.queue_unsolicited(format!("\r\n+CMTI: \"SM\",{index}\r\n").as_bytes());
        modem.dispatch().await.unwrap();
    }
    assert_eq!(modem.sms_count(SmsQueue::Inbound), 10);
}

// ---------------------------------------------------------------------------
// Phonebook
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn number_lookup_finds_first_match() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(
        b"AT+CPBR=1,20\r",
        b"\r\n+CPBR: 1,\"+39000\",145,\"A\"\r\n\r\n+CIEV: 2,3\r\n\r\n+CPBR: 4,\"+39111\",145,\"BOB\"\r\n\r\n+CPBR: 6,\"+39111\",145,\"BOB2\"\r\n\r\nOK\r\n",
    );

    assert_eq!(modem.number_exists_in_pb("+39111").await.unwrap(), Some(4));
    // The indicator line was kept for dispatch.
    assert_eq!(modem.pending_urcs(), 1);
}

#[tokio::test(start_paused = true)]
async fn number_lookup_miss() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(
        b"AT+CPBR=1,20\r",
        b"\r\n+CPBR: 1,\"+39000\",145,\"A\"\r\n\r\nOK\r\n",
    );
    assert_eq!(modem.number_exists_in_pb("+39111").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn find_by_name() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(
        b"AT+CPBF=\"ADMIN\"\r",
        b"\r\n+CPBF: 2,\"+39555\",145,\"ADMIN\"\r\n\r\n+CPBF: 8,\"+39666\",145,\"ADMIN2\"\r\n\r\nOK\r\n",
    );

    let entry = modem.get_pb_entry_by_name("ADMIN").await.unwrap().unwrap();
    assert_eq!(entry.index, 2);
    assert_eq!(entry.number, "+39555");
    assert_eq!(modem.pending_urcs(), 0);
}

#[tokio::test(start_paused = true)]
async fn register_and_delete_entries() {
    let (mut modem, handle) = quiet_modem();
    handle.expect(b"AT+CPBW=,\"+39111\",,\"BOB\"\r", b"\r\nOK\r\n");
    handle.expect(b"AT+CPBW=,\"+39222\"\r", b"\r\nOK\r\n");
    handle.expect(b"AT+CPBW=3\r", b"\r\n+CME ERROR: 21\r\n");

    modem
        .register_number_in_pb("+39111", Some("BOB"))
        .await
        .unwrap();
    modem.register_number_in_pb("+39222", None).await.unwrap();
    assert!(matches!(
        modem.delete_pb_entry_at_index(3).await,
        Err(Error::Modem(_))
    ));
}
