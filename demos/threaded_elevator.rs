//! Threaded elevator state machine example
//!
//! The elevator runs on its own worker thread while several passengers
//! call it from their threads:
//! - Healthy: composite state with Idle and Moving (shallow history)
//! - Moving: composite state with Up and Down
//! - Error: entered when an overload is reported, left by a reset
//!
//! After a reset the elevator resumes where it was interrupted.
//!
//! Run with: RUST_LOG=debug cargo run --example threaded_elevator

use std::thread;

use hierarchical_statechart::prelude::*;
use hierarchical_statechart::{DriverConfig, TransitionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Elevator {
    Healthy,
    Idle,
    Moving,
    Up,
    Down,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Command {
    Call,
    Arrived,
    Overload,
    Reset,
}

#[derive(Debug, Default)]
struct Cabin {
    floor: u8,
    target: u8,
    trips: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let definition = StateMachineBuilder::<Elevator, Command, Cabin, u8>::new("elevator")
        .define_hierarchy(
            Elevator::Healthy,
            Elevator::Idle,
            HistoryMode::Shallow,
            [Elevator::Idle, Elevator::Moving],
        )?
        .define_hierarchy(
            Elevator::Moving,
            Elevator::Up,
            HistoryMode::None,
            [Elevator::Up, Elevator::Down],
        )?
        .transition(Elevator::Idle, Command::Call, |t| {
            t.to(Elevator::Up)
                .guard(|cabin: &Cabin, floor: &u8| Ok(*floor > cabin.floor))
                .action(|cabin: &mut Cabin, floor: &u8| {
                    cabin.target = *floor;
                    Ok(())
                })
        })
        .transition(Elevator::Idle, Command::Call, |t| {
            t.to(Elevator::Down)
                .guard(|cabin: &Cabin, floor: &u8| Ok(*floor < cabin.floor))
                .action(|cabin: &mut Cabin, floor: &u8| {
                    cabin.target = *floor;
                    Ok(())
                })
        })
        .transition(Elevator::Moving, Command::Arrived, |t| {
            t.to(Elevator::Idle).action(|cabin: &mut Cabin, _: &u8| {
                cabin.floor = cabin.target;
                cabin.trips += 1;
                Ok(())
            })
        })
        .transition(Elevator::Healthy, Command::Overload, |t| t.to(Elevator::Error))
        .transition(Elevator::Error, Command::Reset, |t| t.to(Elevator::Healthy))
        .on_entry(Elevator::Error, |_: &mut Cabin| {
            println!("🚨 Overload, elevator stopped");
            Ok(())
        })
        .observe(
            |notification: &Notification<Elevator, Command, u8>| match notification {
                Notification::TransitionCompleted {
                    transition: TransitionContext { event, args, .. },
                    new_state,
                } => {
                    println!("✅ {event:?}({args}) -> {new_state:?}");
                    Ok(())
                }
                Notification::TransitionDeclined(declined) => {
                    println!(
                        "🚫 {:?}({}) ignored in {:?}",
                        declined.event, declined.args, declined.state
                    );
                    Ok(())
                }
                _ => Ok(()),
            },
        )
        .initial_state(Elevator::Healthy)
        .build();

    let mut elevator = definition
        .create_threaded("lobby", Cabin::default())
        .with_config(DriverConfig::default().with_poll_interval(Duration::from_millis(5)));
    elevator.start()?;

    println!("🛗 Elevator ready in {:?}\n", elevator.current_state());

    let passengers: Vec<_> = [3u8, 7, 1]
        .into_iter()
        .map(|floor| {
            let calls = elevator.events();
            thread::spawn(move || {
                calls.fire(Command::Call, floor);
                calls.fire(Command::Arrived, floor);
            })
        })
        .collect();
    for passenger in passengers {
        passenger.join().map_err(|_| "passenger thread panicked")?;
    }

    elevator.fire(Command::Call, 0);
    elevator.fire(Command::Overload, 0);
    elevator.fire(Command::Reset, 0);
    elevator.fire(Command::Arrived, 0);

    if !elevator.wait_until_idle(Duration::from_secs(5)) {
        println!("⏱️  Elevator still busy");
    }

    let (floor, trips) = elevator.with_context(|cabin| (cabin.floor, cabin.trips));
    println!("\n📍 Current state: {:?}", elevator.current_state());
    println!("🏢 Floor {floor} after {trips} trips");

    elevator.terminate();
    println!("🎉 Demo completed!");
    Ok(())
}
