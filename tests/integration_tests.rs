use std::sync::Arc;

use hierarchical_statechart::{
    BoxError, Duration, Error, EventQueue, Failure, HistoryMode, Lifecycle, Notification,
    Observer, Snapshot, StateMachine, StateMachineBuilder, StateMachineDefinition,
    TransitionContext,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum RadioState {
    Off,
    On,
    Maintenance,
    Fm,
    Am,
    Play,
    AutoTune,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RadioEvent {
    TogglePower,
    ToggleMode,
    StationLost,
    StationFound,
}

#[derive(Debug, Default)]
struct Radio {
    maintenance: bool,
    log: Vec<&'static str>,
}

impl Radio {
    fn consume_log(&mut self) -> String {
        let log = self.log.join(".");
        self.log.clear();
        log
    }
}

type RadioDefinition = StateMachineDefinition<RadioState, RadioEvent, Radio, ()>;

fn radio_definition(on_history: HistoryMode, am_history: HistoryMode) -> Arc<RadioDefinition> {
    use RadioEvent::*;
    use RadioState::*;

    let mut builder = StateMachineBuilder::<RadioState, RadioEvent, Radio, ()>::new("radio")
        .define_hierarchy(On, Fm, on_history, [Fm, Am])
        .unwrap()
        .define_hierarchy(Am, Play, am_history, [Play, AutoTune])
        .unwrap();

    let logged = [
        (Off, "entryOff", "exitOff"),
        (On, "entryOn", "exitOn"),
        (Maintenance, "entryMaintenance", "exitMaintenance"),
        (Fm, "entryFM", "exitFM"),
        (Am, "entryAM", "exitAM"),
        (Play, "entryPlay", "exitPlay"),
        (AutoTune, "entryAutoTune", "exitAutoTune"),
    ];
    for (state, entry, exit) in logged {
        builder = builder
            .on_entry(state, move |radio: &mut Radio| {
                radio.log.push(entry);
                Ok(())
            })
            .on_exit(state, move |radio: &mut Radio| {
                radio.log.push(exit);
                Ok(())
            });
    }

    fn log(message: &'static str) -> impl Fn(&mut Radio, &()) -> Result<(), BoxError> + Send + Sync {
        move |radio: &mut Radio, _: &()| {
            radio.log.push(message);
            Ok(())
        }
    }

    builder
        .transition(Off, TogglePower, |t| {
            t.to(On)
                .guard(|radio, _| Ok(!radio.maintenance))
                .action(log("OffToOn"))
        })
        .transition(Off, TogglePower, |t| {
            t.to(Maintenance)
                .guard(|radio, _| Ok(radio.maintenance))
                .action(log("OffToMaintenance"))
        })
        .transition(On, TogglePower, |t| t.to(Off).action(log("OnToOff")))
        .transition(Maintenance, TogglePower, |t| {
            t.to(Off).action(log("MaintenanceToOff"))
        })
        .transition(Fm, ToggleMode, |t| t.to(Am).action(log("FMtoAM")))
        .transition(Am, ToggleMode, |t| t.to(Fm).action(log("AMtoFM")))
        .transition(Play, StationLost, |t| {
            t.to(AutoTune).action(log("PlayToAutoTune"))
        })
        .transition(AutoTune, StationFound, |t| {
            t.to(Play).action(log("AutoTuneToPlay"))
        })
        .initial_state(Off)
        .build()
}

#[test]
fn test_radio_turn_on_and_off() {
    init_tracing();
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::None);
    let mut radio = definition.create_synchronous("on and off", Radio::default());

    radio.start().unwrap();
    radio.fire(RadioEvent::TogglePower, ());
    radio.fire(RadioEvent::TogglePower, ());
    radio.terminate();

    assert_eq!(
        radio.context_mut().consume_log(),
        "entryOff.exitOff.OffToOn.entryOn.entryFM.exitFM.exitOn.OnToOff.entryOff.exitOff"
    );
}

fn power_cycle_in_auto_tune(on_history: HistoryMode, am_history: HistoryMode) -> Vec<String> {
    let definition = radio_definition(on_history, am_history);
    let mut radio = definition.create_synchronous("auto tune", Radio::default());
    radio.start().unwrap();

    [
        RadioEvent::TogglePower,
        RadioEvent::ToggleMode,
        RadioEvent::StationLost,
        RadioEvent::TogglePower,
        RadioEvent::TogglePower,
    ]
    .into_iter()
    .map(|event| {
        radio.fire(event, ());
        radio.context_mut().consume_log()
    })
    .collect()
}

#[test]
fn test_radio_history_none_on_am_restores_play() {
    let logs = power_cycle_in_auto_tune(HistoryMode::Deep, HistoryMode::None);

    assert_eq!(logs[0], "entryOff.exitOff.OffToOn.entryOn.entryFM");
    assert_eq!(logs[1], "exitFM.FMtoAM.entryAM.entryPlay");
    assert_eq!(logs[2], "exitPlay.PlayToAutoTune.entryAutoTune");
    assert_eq!(logs[3], "exitAutoTune.exitAM.exitOn.OnToOff.entryOff");
    assert_eq!(logs[4], "exitOff.OffToOn.entryOn.entryAM.entryPlay");
}

#[test]
fn test_radio_shallow_history_on_am_restores_auto_tune() {
    let logs = power_cycle_in_auto_tune(HistoryMode::Deep, HistoryMode::Shallow);

    assert_eq!(logs[4], "exitOff.OffToOn.entryOn.entryAM.entryAutoTune");
}

#[test]
fn test_radio_shallow_history_on_on_restores_play() {
    let logs = power_cycle_in_auto_tune(HistoryMode::Shallow, HistoryMode::Shallow);

    assert_eq!(logs[4], "exitOff.OffToOn.entryOn.entryAM.entryPlay");
}

#[test]
fn test_radio_deep_history_returns_to_am() {
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::None);
    let mut radio = definition.create_synchronous("deep", Radio::default());
    radio.start().unwrap();

    radio.fire(RadioEvent::TogglePower, ());
    radio.fire(RadioEvent::ToggleMode, ());
    radio.fire(RadioEvent::TogglePower, ());
    radio.fire(RadioEvent::TogglePower, ());

    assert_eq!(radio.current_state(), Some(RadioState::Play));
    assert_eq!(radio.interpreter().history().get(&RadioState::On), Some(&RadioState::Am));
}

#[test]
fn test_deep_history_restores_leaf_sub_state() {
    let definition = StateMachineBuilder::<RadioState, RadioEvent, (), ()>::new("two band radio")
        .define_hierarchy(
            RadioState::On,
            RadioState::Fm,
            HistoryMode::Deep,
            [RadioState::Fm, RadioState::Am],
        )
        .unwrap()
        .transition(RadioState::Off, RadioEvent::TogglePower, |t| t.to(RadioState::On))
        .transition(RadioState::On, RadioEvent::TogglePower, |t| t.to(RadioState::Off))
        .transition(RadioState::Fm, RadioEvent::ToggleMode, |t| t.to(RadioState::Am))
        .initial_state(RadioState::Off)
        .build();
    let mut radio = definition.create_synchronous("two band", ());
    radio.start().unwrap();

    for event in [
        RadioEvent::TogglePower,
        RadioEvent::ToggleMode,
        RadioEvent::TogglePower,
        RadioEvent::TogglePower,
    ] {
        radio.fire(event, ());
    }

    assert_eq!(radio.current_state(), Some(RadioState::Am));
}

#[test]
fn test_radio_guard_selects_maintenance() {
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::None);
    let mut radio = definition.create_synchronous("maintenance", Radio::default());
    radio.start().unwrap();

    radio.context_mut().maintenance = true;
    radio.fire(RadioEvent::TogglePower, ());

    assert_eq!(radio.current_state(), Some(RadioState::Maintenance));
    assert_eq!(
        radio.context_mut().consume_log(),
        "entryOff.exitOff.OffToMaintenance.entryMaintenance"
    );
}

#[test]
fn test_radio_passivate_writes_history() {
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::None);
    let mut radio = definition.create_synchronous("passivate", Radio::default());
    radio.start().unwrap();

    radio.fire(RadioEvent::TogglePower, ());
    radio.fire(RadioEvent::ToggleMode, ());
    radio.fire(RadioEvent::TogglePower, ());

    let snapshot = radio.passivate();

    assert_eq!(
        snapshot,
        Snapshot::new(Some(RadioState::Off)).with_history(RadioState::On, RadioState::Am)
    );
}

#[test]
fn test_radio_activate_from_snapshot() {
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::None);
    let mut radio = definition.create_synchronous("activate", Radio::default());
    let snapshot = Snapshot::new(Some(RadioState::Off)).with_history(RadioState::On, RadioState::Fm);

    radio.activate(&snapshot).unwrap();
    radio.fire(RadioEvent::TogglePower, ());
    radio.fire(RadioEvent::TogglePower, ());
    radio.terminate();

    assert_eq!(
        radio.context_mut().consume_log(),
        "exitOff.OffToOn.entryOn.entryFM.exitFM.exitOn.OnToOff.entryOff.exitOff"
    );
}

#[test]
fn test_snapshot_survives_json() {
    let definition = radio_definition(HistoryMode::Deep, HistoryMode::Shallow);
    let mut radio = definition.create_synchronous("json", Radio::default());
    radio.start().unwrap();
    for event in [
        RadioEvent::TogglePower,
        RadioEvent::ToggleMode,
        RadioEvent::StationLost,
        RadioEvent::TogglePower,
    ] {
        radio.fire(event, ());
    }

    let json = serde_json::to_string(&radio.passivate()).unwrap();
    let snapshot: Snapshot<RadioState> = serde_json::from_str(&json).unwrap();

    let mut restored = definition.create_synchronous("json restored", Radio::default());
    restored.activate(&snapshot).unwrap();
    restored.fire(RadioEvent::TogglePower, ());

    assert_eq!(restored.current_state(), Some(RadioState::AutoTune));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Linear {
    A,
    B,
    C,
    D,
}

#[derive(Default)]
struct Recorder {
    notifications: Mutex<Vec<Notification<Linear, Linear, u32>>>,
}

impl Observer<Linear, Linear, u32> for Recorder {
    fn notify(&self, notification: &Notification<Linear, Linear, u32>) -> Result<(), BoxError> {
        self.notifications.lock().push(notification.clone());
        Ok(())
    }
}

impl Recorder {
    fn completed(&self) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| matches!(n, Notification::TransitionCompleted { .. }))
            .count()
    }

    fn declined(&self) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| matches!(n, Notification::TransitionDeclined(_)))
            .count()
    }

    fn failures(&self) -> Vec<Failure<Linear>> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| n.failure().cloned())
            .collect()
    }
}

fn linear_builder(recorder: &Arc<Recorder>) -> StateMachineBuilder<Linear, Linear, (), u32> {
    StateMachineBuilder::<Linear, Linear, (), u32>::new("linear")
        .observer(Arc::clone(recorder) as Arc<dyn Observer<Linear, Linear, u32>>)
        .initial_state(Linear::A)
}

#[test]
fn test_linear_notification_order() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .transition(Linear::B, Linear::C, |t| t.to(Linear::C))
        .transition(Linear::C, Linear::D, |t| t.to(Linear::D))
        .build();
    let mut machine = definition.create_synchronous("linear", ());
    machine.start().unwrap();

    machine.fire(Linear::B, 7);

    assert_eq!(machine.current_state(), Some(Linear::B));
    let notifications = recorder.notifications.lock();
    assert_eq!(notifications.len(), 2);
    let expected = TransitionContext {
        state: Linear::A,
        event: Linear::B,
        args: 7,
    };
    match &notifications[0] {
        Notification::TransitionBegin(transition) => assert_eq!(transition, &expected),
        other => panic!("unexpected notification {other:?}"),
    }
    match &notifications[1] {
        Notification::TransitionCompleted { transition, new_state } => {
            assert_eq!(transition, &expected);
            assert_eq!(*new_state, Linear::B);
        }
        other => panic!("unexpected notification {other:?}"),
    }
}

#[test]
fn test_declined_event_notifies_once() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .build();
    let mut machine = definition.create_synchronous("declined", ());
    machine.start().unwrap();

    machine.fire(Linear::D, 0);

    assert_eq!(machine.current_state(), Some(Linear::A));
    assert_eq!(recorder.declined(), 1);
    assert_eq!(recorder.completed(), 0);
}

#[test]
fn test_priority_fire_from_action() {
    let recorder = Arc::new(Recorder::default());
    let queue = EventQueue::new();
    let relay = queue.clone();
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, move |t| {
            t.to(Linear::B).action(move |_, _| {
                relay.fire(Linear::D, 0);
                relay.fire_priority(Linear::C, 0);
                Ok(())
            })
        })
        .transition(Linear::B, Linear::C, |t| t.to(Linear::C))
        .transition(Linear::C, Linear::D, |t| t.to(Linear::D))
        .build();
    let mut machine = definition.create_synchronous("priority", ()).with_queue(queue);
    machine.start().unwrap();

    machine.fire(Linear::B, 0);

    assert_eq!(machine.current_state(), Some(Linear::D));
    assert_eq!(recorder.completed(), 3);
    assert_eq!(recorder.declined(), 0);
    assert!(recorder.failures().is_empty());
}

#[test]
fn test_stop_and_start() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .build();
    let mut machine = definition.create_synchronous("stop", ());
    machine.start().unwrap();
    machine.terminate();

    machine.fire(Linear::B, 0);

    assert!(recorder.notifications.lock().is_empty());
    assert_eq!(machine.status(), Lifecycle::Terminated);
    assert!(matches!(
        machine.start(),
        Err(Error::InvalidLifecycle {
            operation: "start",
            status: Lifecycle::Terminated
        })
    ));
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Boom(&'static str);

#[test]
fn test_guard_failure_declines() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| {
            t.to(Linear::B).guard(|_, _| Err(Boom("guard").into()))
        })
        .build();
    let mut machine = definition.create_synchronous("guard", ());
    machine.start().unwrap();

    machine.fire(Linear::B, 3);

    assert_eq!(machine.current_state(), Some(Linear::A));
    assert_eq!(recorder.declined(), 1);
    let failures = recorder.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], Failure::Guard { state: Linear::A, .. }));
    assert_eq!(failures[0].cause().to_string(), "guard");

    let notifications = recorder.notifications.lock();
    assert!(notifications.iter().any(|n| matches!(
        n,
        Notification::TransitionThrowsException {
            transition: TransitionContext { state: Linear::A, event: Linear::B, args: 3 },
            ..
        }
    )));
}

#[test]
fn test_action_failure_still_changes_state() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| {
            t.to(Linear::B).action(|_, _| Err(Boom("action").into()))
        })
        .build();
    let mut interpreter = definition.interpreter("action", ());
    interpreter.initialize().unwrap();

    let outcome = interpreter.fire(Linear::B, 5).unwrap();

    assert!(outcome.fired);
    assert_eq!(outcome.new_state, Some(Linear::B));
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].is_transition_failure());
    assert_eq!(recorder.completed(), 1);
}

#[test]
fn test_entry_and_exit_failures_are_reported() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .on_exit(Linear::A, |_| Err(Boom("exit").into()))
        .on_entry(Linear::B, |_| Err(Boom("entry").into()))
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .build();
    let mut machine = definition.create_synchronous("entry exit", ());
    machine.start().unwrap();

    machine.fire(Linear::B, 1);

    assert_eq!(machine.current_state(), Some(Linear::B));
    let failures = recorder.failures();
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0], Failure::ExitAction { state: Linear::A, .. }));
    assert!(matches!(failures[1], Failure::EntryAction { state: Linear::B, .. }));
    assert!(failures.iter().all(|f| !f.is_transition_failure()));

    let notifications = recorder.notifications.lock();
    let exceptions = notifications
        .iter()
        .filter(|n| {
            matches!(
                n,
                Notification::ExceptionThrown {
                    transition: Some(TransitionContext { event: Linear::B, .. }),
                    ..
                }
            )
        })
        .count();
    assert_eq!(exceptions, 2);
}

#[test]
fn test_failing_observer_is_ignored() {
    let definition = StateMachineBuilder::<Linear, Linear, (), u32>::new("observer")
        .observe(|_| Err("observer failed".into()))
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .initial_state(Linear::A)
        .build();
    let mut machine = definition.create_synchronous("observer", ());
    machine.start().unwrap();

    machine.fire(Linear::B, 0);

    assert_eq!(machine.current_state(), Some(Linear::B));
}

#[test]
fn test_threaded_driver_processes_events() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .transition(Linear::B, Linear::C, |t| t.to(Linear::C))
        .transition(Linear::C, Linear::D, |t| t.to(Linear::D))
        .build();
    let mut machine = definition.create_threaded("threaded", ());

    machine.fire(Linear::B, 0);
    machine.fire(Linear::C, 0);
    machine.start().unwrap();
    machine.fire(Linear::D, 0);

    assert!(machine.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(machine.current_state(), Some(Linear::D));
    assert_eq!(recorder.completed(), 3);

    machine.terminate();
    assert_eq!(machine.status(), Lifecycle::Terminated);
}

#[test]
fn test_threaded_self_fired_events() {
    let recorder = Arc::new(Recorder::default());
    let queue = EventQueue::new();
    let relay = queue.clone();
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, move |t| {
            t.to(Linear::B).action(move |_, _| {
                relay.fire(Linear::D, 0);
                relay.fire_priority(Linear::C, 0);
                Ok(())
            })
        })
        .transition(Linear::B, Linear::C, |t| t.to(Linear::C))
        .transition(Linear::C, Linear::D, |t| t.to(Linear::D))
        .build();
    let mut machine = definition.create_threaded("self fire", ()).with_queue(queue);
    machine.start().unwrap();

    machine.fire(Linear::B, 0);

    assert!(machine.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(machine.current_state(), Some(Linear::D));
    assert_eq!(recorder.completed(), 3);
    machine.terminate();
}

#[cfg(feature = "tokio-integration")]
#[tokio::test]
async fn test_wait_until_idle_async() {
    let recorder = Arc::new(Recorder::default());
    let definition = linear_builder(&recorder)
        .transition(Linear::A, Linear::B, |t| t.to(Linear::B))
        .build();
    let mut machine = definition.create_threaded("async", ());
    machine.start().unwrap();
    machine.fire(Linear::B, 0);

    assert!(machine.wait_until_idle_async(Duration::from_secs(5)).await);
    assert_eq!(machine.current_state(), Some(Linear::B));
    machine.terminate();
}

fn radio_event() -> impl Strategy<Value = RadioEvent> {
    prop_oneof![
        Just(RadioEvent::TogglePower),
        Just(RadioEvent::ToggleMode),
        Just(RadioEvent::StationLost),
        Just(RadioEvent::StationFound),
    ]
}

fn history_mode() -> impl Strategy<Value = HistoryMode> {
    prop_oneof![
        Just(HistoryMode::None),
        Just(HistoryMode::Shallow),
        Just(HistoryMode::Deep),
    ]
}

proptest! {
    #[test]
    fn prop_passivate_activate_resumes_identically(
        events in proptest::collection::vec(radio_event(), 0..24),
        split in 0usize..24,
        on_history in history_mode(),
        am_history in history_mode(),
    ) {
        let definition = radio_definition(on_history, am_history);
        let split = split.min(events.len());

        let mut reference = definition.create_synchronous("reference", Radio::default());
        reference.start().unwrap();
        for event in &events {
            reference.fire(*event, ());
        }

        let mut first = definition.create_synchronous("first half", Radio::default());
        first.start().unwrap();
        for event in &events[..split] {
            first.fire(*event, ());
        }
        let snapshot = first.passivate();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot<RadioState> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&restored, &snapshot);

        let mut second = definition.create_synchronous("second half", Radio::default());
        second.activate(&restored).unwrap();
        for event in &events[split..] {
            second.fire(*event, ());
        }

        prop_assert_eq!(second.current_state(), reference.current_state());
        prop_assert_eq!(second.passivate(), reference.passivate());
    }
}

mod prelude_imports {
    use hierarchical_statechart::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Lamp {
        Dark,
        Lit,
    }

    fn switch_on() -> Result<Option<Lamp>, Box<dyn std::error::Error>> {
        let definition = StateMachineBuilder::<Lamp, (), u32, ()>::new("lamp")
            .on_entry(Lamp::Lit, |count: &mut u32| -> Result<(), BoxError> {
                *count += 1;
                Ok(())
            })
            .transition(Lamp::Dark, (), |t| t.to(Lamp::Lit))
            .initial_state(Lamp::Dark)
            .build();
        let mut lamp = definition.create_synchronous("desk", 0);
        lamp.start()?;
        lamp.fire((), ());
        Ok(lamp.current_state())
    }

    #[test]
    fn test_prelude_keeps_std_result() {
        assert_eq!(switch_on().unwrap(), Some(Lamp::Lit));
    }
}
