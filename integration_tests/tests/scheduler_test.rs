use std::sync::atomic::{AtomicBool, Ordering};

use dispatch_common::{constants::ROLLOVER_TICKS, topic, Message, TopicDescriptor};
use dispatch_node::{Dispatcher, Scheduler, SerialPort, TimeBase};
use integration_tests::sim_link::SimLink;
use serial_test::serial;

static TIME: TimeBase = TimeBase::new();

const VI: TopicDescriptor<'static> = topic!("vi:64,s8,s8");

#[derive(Debug, Default)]
struct Settings {
    omega: u16,
}

struct App<'a> {
    link: Dispatcher<SerialPort<'a, 64, 512>, Settings, 64, 160>,
    settings: Settings,
    voltage: [i8; 64],
    current: [i8; 64],
}

fn change_omega(settings: &mut Settings, msg: &Message<'_>) {
    let mut omega = [0u16; 1];
    if msg.get_elements(0, &mut omega).is_ok() {
        settings.omega = omega[0];
    }
}

fn process(app: &mut App<'_>) {
    app.link.process(&mut app.settings);
}

fn send_vi(app: &mut App<'_>) {
    for (i, (v, c)) in app.voltage.iter_mut().zip(app.current.iter_mut()).enumerate() {
        *v = (i as i8).wrapping_add(app.settings.omega as i8);
        *c = -*v;
    }
    app.link
        .publish(&VI, &[(&app.voltage).into(), (&app.current).into()])
        .unwrap();
}

#[test]
#[serial]
fn test_instrument_loop() {
    TIME.set(0);
    let link: &'static SimLink<64, 512> = Box::leak(Box::new(SimLink::new()));
    let mut app = App {
        link: Dispatcher::new(link.port()),
        settings: Settings::default(),
        voltage: [0; 64],
        current: [0; 64],
    };
    app.link.subscribe("omega", change_omega).unwrap();

    let mut scheduler: Scheduler<App<'_>> = Scheduler::new(&TIME);
    scheduler.add(process, 1).unwrap();
    scheduler.add(send_vi, 500).unwrap();

    let mut vi_messages = Vec::new();
    for tick in 1..=2000u32 {
        if tick == 700 {
            link.host_publish("omega,u16", &[(&[3u16]).into()]);
        }
        TIME.tick();
        scheduler.sweep(&mut app);
        for msg in link.host_receive() {
            vi_messages.push((tick, msg));
        }
    }

    let ticks: Vec<u32> = vi_messages.iter().map(|(tick, _)| *tick).collect();
    assert_eq!(vec![500, 1000, 1500, 2000], ticks);
    assert_eq!(3, app.settings.omega);

    // Messages sent after the omega update carry the new offset
    let mut voltage = [0i8; 64];
    let first = vi_messages[0].1.decode();
    assert_eq!("vi", first.topic());
    first.get_elements(0, &mut voltage).unwrap();
    assert_eq!(0, voltage[0]);
    let last = vi_messages[3].1.decode();
    last.get_elements(0, &mut voltage).unwrap();
    assert_eq!(3, voltage[0]);
    let mut current = [0i8; 64];
    last.get_elements(1, &mut current).unwrap();
    assert_eq!(-3, current[0]);

    let stats = app.link.stats();
    assert_eq!(4, stats.published);
    assert_eq!(1, stats.received);
    assert_eq!(0, stats.frames.checksum_errors);
}

#[derive(Debug, Default)]
struct Log {
    runs: Vec<u32>,
}

fn record(log: &mut Log) {
    log.runs.push(TIME.now());
}

#[test]
#[serial]
fn test_rollover_keeps_period() {
    TIME.set(ROLLOVER_TICKS - 5);
    let mut scheduler: Scheduler<Log> = Scheduler::new(&TIME);
    let mut log = Log::default();
    scheduler.add(record, 10).unwrap();
    assert_eq!(Some(ROLLOVER_TICKS + 5), scheduler.next_execution(record));

    for _ in 0..5 {
        TIME.tick();
        scheduler.sweep(&mut log);
    }
    // The sweep at the threshold rebased everything to zero
    assert_eq!(0, TIME.now());
    assert_eq!(1, scheduler.rebases());
    assert_eq!(Some(5), scheduler.next_execution(record));
    assert!(log.runs.is_empty());

    for _ in 0..25 {
        TIME.tick();
        scheduler.sweep(&mut log);
    }
    assert_eq!(vec![5, 15, 25], log.runs);
}

#[test]
#[serial]
fn test_reset_time_preserves_remaining() {
    TIME.set(1000);
    let mut scheduler: Scheduler<Log> = Scheduler::new(&TIME);
    let mut log = Log::default();
    scheduler.add(record, 100).unwrap();
    for _ in 0..40 {
        TIME.tick();
        scheduler.sweep(&mut log);
    }

    scheduler.reset_time(50_000);
    assert_eq!(50_000, scheduler.get_time());
    assert_eq!(Some(50_060), scheduler.next_execution(record));

    for _ in 0..60 {
        TIME.tick();
        scheduler.sweep(&mut log);
    }
    assert_eq!(vec![50_060], log.runs);
}

#[test]
#[serial]
fn test_ticks_from_interrupt_thread() {
    static STOP: AtomicBool = AtomicBool::new(false);
    TIME.set(0);
    STOP.store(false, Ordering::Release);

    // Play the part of the timer interrupt
    let ticker = std::thread::spawn(|| {
        while !STOP.load(Ordering::Acquire) {
            TIME.tick();
            std::thread::sleep(std::time::Duration::from_micros(50));
        }
    });

    let mut scheduler: Scheduler<Log> = Scheduler::new(&TIME);
    let mut log = Log::default();
    scheduler.add(record, 10).unwrap();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while log.runs.len() < 5 && std::time::Instant::now() < deadline {
        scheduler.sweep(&mut log);
    }
    STOP.store(true, Ordering::Release);
    ticker.join().unwrap();

    assert_eq!(5, log.runs.len());
    // Each run happens no earlier than its scheduled time
    for (i, t) in log.runs.iter().enumerate() {
        assert!(*t >= 10 * (i as u32 + 1), "run {i} at tick {t}");
    }
    assert!(log.runs.windows(2).all(|w| w[0] <= w[1]));
}
