//! Car radio state machine example
//!
//! This example drives a radio through a two level hierarchy:
//! - Off / Maintenance: top level states
//! - On: composite state with FM and AM bands (deep history)
//! - AM: composite state with Play and AutoTune (shallow history)
//!
//! Switching the radio off and on again returns to the band and tuning
//! state that was active before. The machine is passivated to JSON halfway
//! and activated again as a new instance.
//!
//! Run with: cargo run --example radio --features plantuml

use std::sync::Arc;

use hierarchical_statechart::prelude::*;
use serde::{Deserialize, Serialize};

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
    frequency: u32,
}

fn announce(message: &'static str) -> impl Fn(&mut Radio) -> Result<(), BoxError> + Send + Sync {
    move |_: &mut Radio| {
        println!("  {message}");
        Ok(())
    }
}

type RadioDefinition = StateMachineDefinition<RadioState, RadioEvent, Radio, u32>;

fn define_radio() -> Result<Arc<RadioDefinition>, Error<RadioState>> {
    use RadioEvent::*;
    use RadioState::*;

    let definition = StateMachineBuilder::<RadioState, RadioEvent, Radio, u32>::new("car radio")
        .define_hierarchy(On, Fm, HistoryMode::Deep, [Fm, Am])?
        .define_hierarchy(Am, Play, HistoryMode::Shallow, [Play, AutoTune])?
        .on_entry(Off, announce("📴 radio off"))
        .on_entry(On, announce("🔌 radio on"))
        .on_entry(Maintenance, announce("🔧 maintenance mode"))
        .on_entry(Fm, announce("📻 FM band"))
        .on_entry(Am, announce("📻 AM band"))
        .on_entry(Play, |radio: &mut Radio| {
            println!("  🎵 playing {} kHz", radio.frequency);
            Ok(())
        })
        .on_entry(AutoTune, announce("🔍 searching for a station"))
        .transition(Off, TogglePower, |t| {
            t.to(On).guard(|radio: &Radio, _: &u32| Ok(!radio.maintenance))
        })
        .transition(Off, TogglePower, |t| {
            t.to(Maintenance).guard(|radio: &Radio, _: &u32| Ok(radio.maintenance))
        })
        .transition(On, TogglePower, |t| t.to(Off))
        .transition(Maintenance, TogglePower, |t| t.to(Off))
        .transition(Fm, ToggleMode, |t| t.to(Am))
        .transition(Am, ToggleMode, |t| t.to(Fm))
        .transition(Play, StationLost, |t| t.to(AutoTune))
        .transition(AutoTune, StationFound, |t| {
            t.to(Play).action(|radio: &mut Radio, frequency: &u32| {
                radio.frequency = *frequency;
                Ok(())
            })
        })
        .observe(|notification: &Notification<RadioState, RadioEvent, u32>| {
            if let Notification::TransitionDeclined(declined) = notification {
                println!("  🚫 {:?} ignored in {:?}", declined.event, declined.state);
            }
            Ok(())
        })
        .initial_state(Off)
        .build();

    Ok(definition)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let definition = define_radio()?;
    println!("{}", definition.export_plantuml());

    println!("🚗 Starting the radio\n");
    let mut radio = definition.create_synchronous("dashboard", Radio::default());
    radio.start()?;

    let events = [
        (RadioEvent::TogglePower, 0, "Power on"),
        (RadioEvent::ToggleMode, 0, "Switch to AM"),
        (RadioEvent::StationLost, 0, "Station lost"),
        (RadioEvent::StationFound, 1089, "Station found"),
        (RadioEvent::StationLost, 0, "Station lost again"),
        (RadioEvent::TogglePower, 0, "Power off"),
        (RadioEvent::StationFound, 0, "Station found while off"),
    ];
    for (event, frequency, description) in events {
        println!("📨 {description}: {event:?}");
        radio.fire(event, frequency);
        println!("📍 Current state: {:?}\n", radio.current_state());
    }

    let snapshot = radio.passivate();
    let json = serde_json::to_string_pretty(&snapshot)?;
    println!("💾 Passivated:\n{json}\n");

    let restored: Snapshot<RadioState> = serde_json::from_str(&json)?;
    let mut radio = definition.create_synchronous("dashboard", Radio::default());
    radio.activate(&restored)?;

    println!("📨 Power on after activation");
    radio.fire(RadioEvent::TogglePower, 0);
    println!("📍 Current state: {:?}\n", radio.current_state());

    radio.terminate();
    println!("🎉 Demo completed!");
    Ok(())
}
