mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::wait_until;
use tokio::sync::broadcast::error::TryRecvError;
use uhfscan::*;

const WAIT: Duration = Duration::from_secs(5);

fn connected_reader(sim: &Arc<SimulatedReader>, params: InventoryParams) -> UhfReader {
    let reader = UhfReader::new(sim.clone(), ChannelPlan::regulatory(), 4, params).unwrap();
    reader.connect().unwrap();
    reader
}

#[test]
fn test_antenna_count_bounds() {
    let sim = Arc::new(SimulatedReader::new(4));
    for count in [0, 17] {
        let result = UhfReader::new(sim.clone(), ChannelPlan::regulatory(), count, InventoryParams::default());
        assert!(matches!(result, Err(ReaderError::Validation(_))));
    }
}

#[test]
fn test_connect_seeds_antenna_mask() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = UhfReader::new(sim.clone(), ChannelPlan::regulatory(), 4, InventoryParams::default()).unwrap();
    assert_eq!(reader.antenna_mask(), 0x0001);

    reader.connect().unwrap();
    assert_eq!(reader.antenna_mask(), 0x000F);
}

#[test]
fn test_info_decodes_device_block() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    let info = reader.info().unwrap();
    assert_eq!(info.version, "2.7");
    assert_eq!(info.power, Some(30));
    assert_eq!((info.band, info.min_index, info.max_index), (2, 0, 49));
    assert!(info.beep_enabled);
    assert_eq!(info.antennas, vec![1, 2, 3, 4]);
    assert_eq!(info.serial, "SIM00000001");
}

#[test]
fn test_power_validation() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    assert!(matches!(reader.set_power(34), Err(ReaderError::Validation(_))));
    assert_eq!(sim.power(), 30);

    reader.set_power(0).unwrap();
    assert_eq!(sim.power(), 0);
    reader.set_power(33).unwrap();
    assert_eq!(sim.power(), 33);
}

#[test]
fn test_set_antenna_updates_device_and_worker_mask() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    for position in [0, 5] {
        assert!(matches!(reader.set_antenna(position, true, true), Err(ReaderError::Validation(_))));
    }

    reader.set_antenna(2, false, true).unwrap();
    assert_eq!(sim.antenna_mask(), 0b1101);
    assert_eq!(reader.antenna_mask(), 0b1101);

    reader.set_antenna(2, true, false).unwrap();
    assert_eq!(sim.antenna_mask(), 0b1111);
    assert_eq!(reader.info().unwrap().antennas, vec![1, 2, 3, 4]);
}

#[test]
fn test_device_errors_surface_to_caller() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = UhfReader::new(sim.clone(), ChannelPlan::regulatory(), 4, InventoryParams::default()).unwrap();

    // Not connected yet.
    match reader.set_power(20) {
        Err(ReaderError::Device(err)) => {
            assert_eq!(err.hex(), "0x30");
            assert_eq!(err.message(), "Communication error.");
        }
        other => panic!("expected a device error, got {:?}", other),
    }
}

#[test]
fn test_write_power_sends_packed_value() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    reader.set_write_power(30, true).unwrap();
    assert_eq!(sim.write_power(), 0x80 | 30);
    reader.set_write_power(20, false).unwrap();
    assert_eq!(sim.write_power(), 20);
    assert!(matches!(reader.set_write_power(40, false), Err(ReaderError::Validation(_))));
}

#[test]
fn test_set_frequency_and_beep() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    let selection = reader.channel_plan().resolve_by_range(865.0, 868.0).unwrap();
    reader.set_frequency(&selection).unwrap();
    assert_eq!(sim.region(), (4, 0, 14));

    reader.set_beep(false).unwrap();
    assert!(!sim.beep());
}

#[test]
fn test_empty_specs_keep_current_region() {
    let sim = Arc::new(SimulatedReader::new(4));
    let reader = connected_reader(&sim, InventoryParams::default());

    let plan = reader.hop_plan(&[], 1_000).unwrap();
    assert_eq!(plan.len(), 1);
    assert!(!plan.hopping_enabled());
    assert_eq!((plan.first().band_id(), plan.first().min_index(), plan.first().max_index()), (2, 0, 49));
}

#[test]
fn test_start_applies_first_selection_and_collects_tags() {
    let sim = Arc::new(SimulatedReader::demo());
    let reader = connected_reader(&sim, InventoryParams::default());

    let plan = reader
        .hop_plan(&[FrequencySpec::Indexed { band: 21, min_index: 0, max_index: 9 }], 1_000)
        .unwrap();
    reader.start(plan).unwrap();
    assert_eq!(sim.region(), (21, 0, 9));
    assert!(matches!(reader.start(reader.hop_plan(&[], 0).unwrap()), Err(ReaderError::AlreadyRunning)));

    assert!(wait_until(WAIT, || reader.snapshot_buffer().len() == 6));
    reader.stop();
    assert_eq!(reader.state(), RunState::Idle);
    assert!(reader.snapshot_buffer().contains("E28011700000020A1B2C3D04"));
}

#[test]
fn test_concurrent_starts_retune_only_once() {
    let sim = Arc::new(SimulatedReader::demo());
    let reader = Arc::new(connected_reader(&sim, InventoryParams::default()));
    let barrier = Arc::new(std::sync::Barrier::new(2));

    let handles: Vec<_> = [(21u8, 0u8, 9u8), (2, 10, 19)]
        .into_iter()
        .map(|(band, min_index, max_index)| {
            let reader = Arc::clone(&reader);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let plan = reader
                    .hop_plan(&[FrequencySpec::Indexed { band, min_index, max_index }], 0)
                    .unwrap();
                barrier.wait();
                reader.start(plan)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    reader.stop();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(ReaderError::AlreadyRunning))));
    assert_eq!(sim.region_changes().len(), 1);
}

#[test]
fn test_persistent_session_rereads_after_target_flip() {
    let sim = Arc::new(SimulatedReader::new(1).with_tags([SimTag::new("AA01", 1, -40)]));
    let params = InventoryParams::new(4, Session::S2, TargetMode::Auto, 1).unwrap();
    let reader = UhfReader::new(sim.clone(), ChannelPlan::regulatory(), 1, params).unwrap();
    reader.connect().unwrap();
    let mut events = reader.subscribe();

    reader.start(reader.hop_plan(&[], 0).unwrap()).unwrap();
    let mut reads = 0;
    let deadline = Instant::now() + WAIT;
    while reads < 2 && Instant::now() < deadline {
        match events.try_recv() {
            Ok(TagEvent::Read { .. }) => reads += 1,
            Ok(TagEvent::Stopped) => break,
            Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_millis(5)),
            Err(e) => panic!("unexpected receive error: {:?}", e),
        }
    }
    reader.stop();

    assert_eq!(reads, 2, "tag should answer again once the target flips");
    assert_eq!(reader.snapshot_buffer().len(), 1);
}

#[test]
fn test_stop_interrupts_long_poll() {
    let sim = Arc::new(SimulatedReader::demo().with_poll_latency(Duration::from_secs(10)));
    let reader = connected_reader(&sim, InventoryParams::default());

    reader.start(reader.hop_plan(&[], 0).unwrap()).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    reader.stop();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!reader.is_running());
}

#[test]
fn test_close_stops_and_disconnects() {
    let sim = Arc::new(SimulatedReader::demo());
    let reader = connected_reader(&sim, InventoryParams::default());

    reader.start(reader.hop_plan(&[], 0).unwrap()).unwrap();
    reader.close().unwrap();

    assert!(!reader.is_running());
    assert!(!sim.is_connected());
}

#[test]
fn test_poll_faults_do_not_end_the_run() {
    let sim = Arc::new(SimulatedReader::demo());
    sim.set_poll_fault(Some(0xFB));
    let reader = connected_reader(&sim, InventoryParams::default());

    reader.start(reader.hop_plan(&[], 0).unwrap()).unwrap();
    assert!(wait_until(WAIT, || sim.poll_count() >= 5));
    assert!(reader.is_running());
    assert!(reader.snapshot_buffer().is_empty());

    sim.set_poll_fault(None);
    assert!(wait_until(WAIT, || !reader.snapshot_buffer().is_empty()));
    reader.stop();
}
