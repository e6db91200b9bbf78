use axerrno::{ax_err, AxError, AxResult};
use axeventdev::{
    Actuator, ClientHandle, ControlCommand, ControlRequest, DevError, DriverConfig, Edge,
    EventDevices, EventSource, InstanceConfig, InstanceId, ManualClock, PollEvents, SharedLine,
    TriggerBinding, WritePolicy, MAX_DEVICES,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct MockLed {
    name: String,
    history: Mutex<Vec<bool>>,
}

impl MockLed {
    fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            history: Mutex::new(Vec::new()),
        }
    }

    fn is_on(&self) -> bool {
        self.history.lock().unwrap().last().copied().unwrap_or(false)
    }
}

impl Actuator for MockLed {
    fn drive(&self, on: bool) {
        println!("[Test] LED {} -> {}", self.name, if on { "ON" } else { "OFF" });
        self.history.lock().unwrap().push(on);
    }
}

/// LED whose "on" transition holds the deferred job until released.
struct GatedLed {
    entered: AtomicBool,
    released: AtomicBool,
}

impl GatedLed {
    fn new() -> Self {
        Self {
            entered: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }
}

impl Actuator for GatedLed {
    fn drive(&self, on: bool) {
        if !on {
            return;
        }
        self.entered.store(true, Ordering::SeqCst);
        while !self.released.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }
}

struct BusyLine;

impl TriggerBinding for BusyLine {
    fn attach(&self, _source: Arc<EventSource>) -> AxResult {
        ax_err!(ResourceBusy)
    }

    fn detach(&self, _id: InstanceId) {}
}

struct Rig {
    clock: Arc<ManualClock>,
    line: Arc<SharedLine>,
    devices: Arc<EventDevices>,
}

impl Rig {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let devices = EventDevices::new(
            DriverConfig::new().with_relax(thread::yield_now),
            clock.clone(),
        );
        Self {
            clock,
            line: Arc::new(SharedLine::new(17)),
            devices: Arc::new(devices),
        }
    }

    fn probe(&self, config: InstanceConfig) -> InstanceId {
        self.devices
            .probe(config, self.line.clone(), None)
            .expect("probe failed")
    }

    fn press_at(&self, ms: u64) {
        self.clock.set(Duration::from_millis(ms));
        self.line.fire(Edge::Falling);
    }

    fn wait_for_waiters(&self, id: InstanceId, n: usize) {
        let instance = self.devices.instance(id).expect("instance missing");
        while instance.signal().waiters() < n {
            thread::yield_now();
        }
    }
}

#[test]
fn test_debounce_scenario() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    assert_eq!(id, InstanceId(0));
    let handle = rig.devices.open(id).unwrap();

    rig.press_at(0);
    rig.press_at(50);
    rig.devices.run_deferred();
    assert_eq!(handle.read(false).unwrap(), "Press Count: 1\n");

    rig.press_at(200);
    rig.devices.run_deferred();
    assert_eq!(handle.read(false).unwrap(), "Press Count: 2\n");
}

#[test]
fn test_coalescing_never_overcounts() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    // 40 triggers 30ms apart, one deferred job per 8: every fourth survives
    // the 100ms window.
    for batch in 0..5u64 {
        for i in 0..8u64 {
            rig.press_at((batch * 8 + i) * 30);
        }
        assert_eq!(rig.devices.run_deferred(), 1);
    }

    let status = rig.devices.status(id).unwrap();
    assert_eq!(status.press_count, 10);
    assert_eq!(status.accepted + status.ignored, 40);
}

#[test]
fn test_burst_overflow_keeps_newest() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    for i in 0..20u64 {
        rig.press_at(i);
    }
    rig.press_at(500);
    assert_eq!(rig.devices.run_deferred(), 1);

    let status = rig.devices.status(id).unwrap();
    assert_eq!(status.overflowed, 5);
    // The first trigger and the late one are both counted.
    assert_eq!(status.press_count, 2);
}

#[test]
fn test_nonblocking_read_fresh_instance() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handle = rig.devices.open(id).unwrap();
    assert_eq!(handle.read(false), Err(DevError::WouldBlock));
    assert_eq!(rig.devices.status(id).unwrap().press_count, 0);
    assert!(!handle.poll().contains(PollEvents::READABLE));
}

#[test]
fn test_blocking_read_no_lost_wakeup() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17).with_debounce(Duration::ZERO));
    let handle = Arc::new(rig.devices.open(id).unwrap());

    for round in 1..=50u64 {
        let reader = {
            let handle = handle.clone();
            thread::spawn(move || handle.read(true))
        };
        if round % 2 == 0 {
            rig.wait_for_waiters(id, 1);
        }
        rig.press_at(round * 10);
        rig.devices.run_deferred();
        let line = reader.join().unwrap().expect("blocking read failed");
        assert_eq!(line, format!("Press Count: {}\n", round));
    }
}

#[test]
fn test_many_readers_one_event() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handles: Vec<_> = (0..4)
        .map(|_| Arc::new(rig.devices.open(id).unwrap()))
        .collect();

    let readers: Vec<_> = handles
        .iter()
        .map(|handle| {
            let handle = handle.clone();
            thread::spawn(move || handle.read(true))
        })
        .collect();
    rig.wait_for_waiters(id, 4);

    rig.press_at(0);
    rig.devices.run_deferred();
    // One reader consumes the event; the rest go back to sleep until removal.
    let instance = rig.devices.instance(id).unwrap();
    while instance.signal().peek_ready() {
        thread::yield_now();
    }
    drop(instance);
    rig.devices.remove(id).unwrap();

    let results: Vec<_> = readers.into_iter().map(|r| r.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let gone = results
        .iter()
        .filter(|r| **r == Err(DevError::DeviceGone))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(gone, 3);
}

#[test]
fn test_reset_counter_idempotent() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handle = rig.devices.open(id).unwrap();
    rig.press_at(0);
    rig.devices.run_deferred();

    let reset = ControlRequest::from(ControlCommand::ResetCounter);
    handle.control(reset).unwrap();
    assert_eq!(rig.devices.status(id).unwrap().press_count, 0);
    handle.control(reset).unwrap();
    assert_eq!(rig.devices.status(id).unwrap().press_count, 0);

    assert_eq!(
        handle.control(ControlRequest::new(42).with_arg(1)),
        Err(DevError::InvalidCommand)
    );
}

#[test]
fn test_exhaustion_and_reuse() {
    let rig = Rig::new();
    for expected in 0..MAX_DEVICES {
        assert_eq!(rig.probe(InstanceConfig::new(17)), InstanceId(expected));
    }
    assert_eq!(
        rig.devices
            .probe(InstanceConfig::new(17), rig.line.clone(), None),
        Err(DevError::Exhausted)
    );

    rig.devices.remove(InstanceId(3)).unwrap();
    assert_eq!(rig.probe(InstanceConfig::new(17)), InstanceId(3));
    assert_eq!(rig.devices.live_ids().len(), MAX_DEVICES);
}

#[test]
fn test_teardown_wakes_blocked_reader() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handle = Arc::new(rig.devices.open(id).unwrap());

    let reader = {
        let handle = handle.clone();
        thread::spawn(move || handle.read(true))
    };
    rig.wait_for_waiters(id, 1);

    let final_count = rig.devices.remove(id).unwrap();
    assert_eq!(final_count, 0);
    assert_eq!(reader.join().unwrap(), Err(DevError::DeviceGone));
    assert_eq!(handle.poll(), PollEvents::HANGUP);
    assert_eq!(
        AxError::from(handle.write(b"1").unwrap_err()),
        AxError::NotFound
    );
}

#[test]
fn test_handle_close_aborts_blocking_read() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let closing = Arc::new(rig.devices.open(id).unwrap());
    let other = rig.devices.open(id).unwrap();

    let reader = {
        let handle = closing.clone();
        thread::spawn(move || handle.read(true))
    };
    rig.wait_for_waiters(id, 1);
    closing.close();
    assert_eq!(reader.join().unwrap(), Err(DevError::Closed));

    // The device itself is unaffected.
    rig.press_at(0);
    rig.devices.run_deferred();
    assert_eq!(other.read(false).unwrap(), "Press Count: 1\n");
    assert_eq!(rig.devices.status(id).unwrap().open_handles, 1);
}

#[test]
fn test_poll_wait_wakes_on_event() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handle = Arc::new(rig.devices.open(id).unwrap());

    let poller = {
        let handle = handle.clone();
        thread::spawn(move || handle.poll_wait(PollEvents::READABLE))
    };
    rig.wait_for_waiters(id, 1);
    rig.press_at(0);
    rig.devices.run_deferred();

    let events = poller.join().unwrap().unwrap();
    assert!(events.contains(PollEvents::READABLE));
    assert_eq!(handle.read(false).unwrap(), "Press Count: 1\n");
}

#[test]
fn test_write_toggles_actuator() {
    let rig = Rig::new();
    let led = Arc::new(MockLed::new("led0"));
    let id = rig
        .devices
        .probe(InstanceConfig::new(17), rig.line.clone(), Some(led.clone()))
        .unwrap();
    let handle = rig.devices.open(id).unwrap();

    assert!(!led.is_on());
    assert_eq!(handle.write(b"1"), Ok(1));
    assert!(led.is_on());
    assert_eq!(handle.write(b"1"), Ok(1));
    assert!(!led.is_on());
    assert_eq!(handle.write(b"hello"), Ok(5));
    assert!(!led.is_on());

    handle.control(ControlCommand::ForceOn.into()).unwrap();
    assert!(led.is_on());
    rig.press_at(0);
    rig.devices.run_deferred();
    assert!(!led.is_on(), "accepted press toggles the LED");
}

#[test]
fn test_single_slot_write_policy() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17).with_write_policy(WritePolicy::SingleSlot));
    let handle = Arc::new(rig.devices.open(id).unwrap());

    handle.write(b"0").unwrap();
    assert_eq!(handle.write(b"0"), Err(DevError::WouldBlock));

    let poller = {
        let handle = handle.clone();
        thread::spawn(move || handle.poll_wait(PollEvents::WRITABLE))
    };
    rig.wait_for_waiters(id, 1);
    rig.press_at(0);
    rig.devices.run_deferred();
    // The event wakes the poller, but only the read frees the slot.
    let reader = handle.read(true).unwrap();
    assert_eq!(reader, "Press Count: 1\n");

    let events = poller.join().unwrap().unwrap();
    assert!(events.contains(PollEvents::WRITABLE));
}

#[test]
fn test_attach_failure_leaves_no_state() {
    let rig = Rig::new();
    let result = rig
        .devices
        .probe(InstanceConfig::new(4), Arc::new(BusyLine), None);
    assert_eq!(result, Err(DevError::TriggerAttach(AxError::ResourceBusy)));
    assert!(rig.devices.live_ids().is_empty());
    assert!(rig.devices.open(InstanceId(0)).is_err());
    assert_eq!(rig.probe(InstanceConfig::new(17)), InstanceId(0));
}

#[test]
fn test_worker_thread_with_kick() {
    let clock = Arc::new(ManualClock::new());
    let kicks = Arc::new(AtomicUsize::new(0));
    let devices = Arc::new(EventDevices::with_kick(
        DriverConfig::new().with_relax(thread::yield_now),
        clock.clone(),
        {
            let kicks = kicks.clone();
            Arc::new(move || {
                kicks.fetch_add(1, Ordering::SeqCst);
            })
        },
    ));
    let line = Arc::new(SharedLine::new(2));
    let id = devices
        .probe(
            InstanceConfig::new(2).with_debounce(Duration::ZERO),
            line.clone(),
            None,
        )
        .unwrap();
    let handle: ClientHandle = devices.open(id).unwrap();

    let worker = {
        let devices = devices.clone();
        let kicks = kicks.clone();
        thread::spawn(move || {
            while kicks.load(Ordering::SeqCst) < 3 {
                devices.run_deferred();
                thread::yield_now();
            }
            devices.run_deferred();
        })
    };

    for ms in [10, 20, 30] {
        clock.set(Duration::from_millis(ms));
        line.fire(Edge::Falling);
        let expected = format!("Press Count: {}\n", ms / 10);
        assert_eq!(handle.read(true).unwrap(), expected);
    }
    worker.join().unwrap();
    assert_eq!(kicks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_query_status_report() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17).with_label("button"));
    let handle = rig.devices.open(id).unwrap();
    rig.press_at(0);
    rig.press_at(10);
    rig.devices.run_deferred();

    let response = handle
        .control(ControlCommand::QueryStatus.into())
        .expect("status query failed");
    let report = response.payload.expect("status has a payload");
    println!("{}", report);
    assert!(report.contains("device: button0"));
    assert!(report.contains("press count: 1"));
    assert!(report.contains("accepted=1 ignored=1"));
    assert!(report.contains("handles: 1"));
}

#[test]
fn test_remove_waits_for_running_deferred_job() {
    let rig = Rig::new();
    let led = Arc::new(GatedLed::new());
    let id = rig
        .devices
        .probe(InstanceConfig::new(17), rig.line.clone(), Some(led.clone()))
        .unwrap();

    rig.press_at(0);
    let worker = {
        let devices = rig.devices.clone();
        thread::spawn(move || devices.run_deferred())
    };
    while !led.entered.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    assert!(rig.devices.queue().is_running(id));

    let remover = {
        let devices = rig.devices.clone();
        thread::spawn(move || devices.remove(id))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!remover.is_finished(), "remove must wait for the running job");

    led.released.store(true, Ordering::SeqCst);
    assert_eq!(worker.join().unwrap(), 1);
    assert_eq!(remover.join().unwrap(), Ok(1));
    assert!(!rig.devices.queue().is_running(id));
    assert!(rig.devices.live_ids().is_empty());
}

#[test]
fn test_teardown_wakes_blocked_poller() {
    let rig = Rig::new();
    let id = rig.probe(InstanceConfig::new(17));
    let handle = Arc::new(rig.devices.open(id).unwrap());

    let poller = {
        let handle = handle.clone();
        thread::spawn(move || handle.poll_wait(PollEvents::READABLE))
    };
    rig.wait_for_waiters(id, 1);

    rig.devices.remove(id).unwrap();
    assert_eq!(poller.join().unwrap(), Ok(PollEvents::HANGUP));
    assert_eq!(handle.poll_wait(PollEvents::READABLE), Ok(PollEvents::HANGUP));
}
