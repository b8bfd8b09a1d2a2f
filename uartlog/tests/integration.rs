use std::time::Duration;
use uartlog::framing::{verify_checked, Direction, FrameFormat, CHECKED_OVERHEAD};
use uartlog::{
    HciDump, LogSink, MemoryPort, MemoryPortHandle, PortSettings, RunLoop, SinkConfig,
    TraceRecord, TransportState,
};

fn manual_sink(config: SinkConfig) -> (LogSink<MemoryPort>, MemoryPortHandle) {
    let mut sink = LogSink::with_run_loop(config, RunLoop::with_manual_clock()).unwrap();
    let (port, handle) = MemoryPort::new();
    sink.attach(PortSettings::new("virtual", 500_000), port).unwrap();
    (sink, handle)
}

fn drain(sink: &mut LogSink<MemoryPort>) {
    for _ in 0..10_000 {
        sink.poll();
        if sink.is_idle() {
            return;
        }
        let backoff = sink.config().backoff();
        sink.run_loop_mut().advance(backoff);
    }
    panic!("sink did not drain");
}

#[test]
fn test_trace_session_in_direct_format() {
    let config = SinkConfig::default();
    let dump = HciDump::new(&config);
    let (mut sink, handle) = manual_sink(config);

    for line in ["> 01 03 0c 00", "controller up", "< 04 0e 04 01 03 0c 00"] {
        TraceRecord::parse(line).submit(&dump, &mut sink);
    }
    drain(&mut sink);

    let mut expected = vec![0x01, 0x03, 0x0C, 0x00];
    expected.extend_from_slice(b"LOG: controller up\n");
    expected.extend_from_slice(&[0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]);
    assert_eq!(handle.written(), expected);
    assert_eq!(sink.lost_count(), 0);
    assert_eq!(sink.statistics().delivery_rate(), 100.0);
}

#[test]
fn test_checked_frames_survive_chunking() {
    let config = SinkConfig {
        format: FrameFormat::Checked,
        chunk_size: 7,
        ..SinkConfig::default()
    };
    let (mut sink, handle) = manual_sink(config);

    let payloads: Vec<Vec<u8>> = (1..=5u8).map(|n| vec![n; n as usize * 3]).collect();
    for payload in &payloads {
        sink.write_packet(0x02, Direction::Outgoing, payload);
    }
    drain(&mut sink);

    let written = handle.written();
    let mut offset = 0;
    for payload in &payloads {
        let len = CHECKED_OVERHEAD + payload.len();
        let frame = verify_checked(&written[offset..offset + len]).unwrap();
        assert_eq!(frame.payload, &payload[..]);
        offset += len;
    }
    assert_eq!(offset, written.len());
}

#[test]
fn test_loss_accounting_across_overflow_and_failure() {
    let (mut sink, handle) = manual_sink(SinkConfig {
        buffer_capacity: 64,
        chunk_size: 16,
        ..SinkConfig::default()
    });

    sink.write(&[0xAA; 60]);
    sink.write(&[0xBB; 10]);
    assert_eq!(sink.lost_count(), 10);

    drain(&mut sink);
    assert_eq!(handle.written(), vec![0xAA; 60]);

    // The chunk in flight when the device goes away is lost, the rest waits
    handle.disconnect();
    sink.write(&[0xCC; 20]);
    sink.poll();
    assert_eq!(sink.lost_count(), 26);
    assert_eq!(sink.driver().state(), TransportState::Error);
    assert_eq!(sink.buffer_usage(), 4);

    sink.write(&[0xDD; 5]);
    sink.poll();
    assert_eq!(sink.buffer_usage(), 9);

    let (port, replacement) = MemoryPort::new();
    sink.attach(PortSettings::new("virtual", 500_000), port).unwrap();
    sink.run_loop_mut().advance(Duration::from_millis(10));
    drain(&mut sink);

    let mut expected = vec![0xCC; 4];
    expected.extend_from_slice(&[0xDD; 5]);
    assert_eq!(replacement.written(), expected);
    assert_eq!(sink.lost_count(), 26);
}

#[tokio::test]
async fn test_run_until_idle_on_tokio() {
    let mut sink: LogSink<MemoryPort> = LogSink::new(SinkConfig::default()).unwrap();
    let (port, handle) = MemoryPort::with_write_limit(100);
    sink.attach(PortSettings::new("virtual", 500_000), port).unwrap();

    for i in 0..50 {
        sink.write_log_text(format!("line {}", i).as_bytes());
    }
    tokio::time::timeout(Duration::from_secs(5), sink.run_until_idle())
        .await
        .unwrap()
        .unwrap();

    let text = String::from_utf8(handle.written()).unwrap();
    assert_eq!(text.lines().count(), 50);
    assert!(text.starts_with("LOG: line 0\n"));
    assert!(text.ends_with("LOG: line 49\n"));

    sink.deinit();
    assert!(handle.is_closed());
    assert_eq!(sink.lost_count(), 0);
}
