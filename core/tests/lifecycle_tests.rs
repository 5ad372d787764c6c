use std::time::Duration;
use troupe::{prelude::*, simulation::Scenario};

mod common;
use common::*;

const EXIT_TIMEOUT: Duration = Duration::from_secs(2);

fn single_system() -> (Scenario, usize) {
    let mut scenario = Scenario::new();
    let conf = config_with_classes(&scenario, LEADER);
    let system = scenario.add_system(conf).expect("system");
    (scenario, system)
}

fn single_system_with(capabilities: &str) -> (Scenario, usize) {
    let mut scenario = Scenario::new();
    let mut conf = config_with_classes(&scenario, LEADER);
    conf.load_config_str(format!("troupe.system.capabilities = {}", capabilities));
    let system = scenario.add_system(conf).expect("system");
    (scenario, system)
}

#[test]
fn top_level_actor_answers_through_its_placeholder() {
    let (mut scenario, sys) = single_system();
    let echo = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo"))
        .expect("echo");
    scenario
        .system(sys)
        .tell(&echo, Message::text("greeting", "hello"))
        .expect("tell");
    let replies = collect(&mut scenario, sys, 1, REPLY_TIMEOUT);
    assert_eq!(1, replies.len());
    assert_eq!(Some(("greeting", "hello")), text_of(&replies[0]));
    assert_eq!(replies[0].sender, echo);
    assert_eq!(1, scenario.system(sys).actor_count());
}

#[test]
fn messages_held_for_a_placeholder_keep_their_order() {
    let (mut scenario, sys) = single_system();
    // a global name sends the creation through the admin, so the placeholder starts out unresolved
    let echo = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo").global("ordered"))
        .expect("echo");
    assert!(echo.unique().is_none());
    for i in 0..5 {
        scenario
            .system(sys)
            .tell(&echo, Message::text("seq", &i.to_string()))
            .expect("tell");
    }
    let replies = collect(&mut scenario, sys, 5, REPLY_TIMEOUT);
    let order: Vec<&str> = replies.iter().filter_map(text_of).map(|(_, text)| text).collect();
    assert_eq!(vec!["0", "1", "2", "3", "4"], order);
}

#[test]
fn global_names_are_created_once() {
    let (mut scenario, sys) = single_system();
    let first = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo").global("registry"))
        .expect("first");
    let first_path = await_resolution(&mut scenario, &first);
    let second = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo").global("registry"))
        .expect("second");
    let second_path = await_resolution(&mut scenario, &second);
    assert_eq!(first_path, second_path);
    assert_eq!(first, second);
    assert_eq!(1, scenario.system(sys).actor_count());
}

#[test]
fn unknown_class_fails_creation() {
    let (mut scenario, sys) = single_system();
    let missing = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Missing"))
        .expect("placeholder");
    let replies = collect(&mut scenario, sys, 1, REPLY_TIMEOUT);
    match &replies[0].message {
        Message::ChildCreationFailed { child, error, .. } => {
            assert_eq!(PendingActorError::InvalidActorClass, *error);
            assert_eq!(child, &missing);
        }
        other => panic!("Unexpected message: {:?}", other),
    }
    assert!(missing.unique().is_none());
    assert_eq!(0, scenario.system(sys).actor_count());
}

#[test]
fn failed_child_creation_is_reported_to_its_parent() {
    let (mut scenario, sys) = single_system();
    let parent = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Parent"))
        .expect("parent");
    scenario
        .system(sys)
        .tell(&parent, Message::text("spawn", "Missing"))
        .expect("tell");
    let replies = collect(&mut scenario, sys, 2, REPLY_TIMEOUT);
    let tags: Vec<&str> = replies.iter().filter_map(text_of).map(|(tag, _)| tag).collect();
    assert_eq!(vec!["spawned", "child-failed"], tags);
    assert_eq!(Some(("child-failed", "invalid actor class")), text_of(&replies[1]));
    assert_eq!(1, scenario.system(sys).actor_count());
}

#[test]
fn recursive_exit_waits_for_all_children() {
    let (mut scenario, sys) = single_system();
    let parent = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Parent"))
        .expect("parent");
    for _ in 0..2 {
        scenario
            .system(sys)
            .tell(&parent, Message::text("spawn", "Echo"))
            .expect("tell");
    }
    let replies = collect(&mut scenario, sys, 2, REPLY_TIMEOUT);
    assert_eq!(2, replies.len());
    assert_eq!(3, scenario.system(sys).actor_count());

    scenario
        .system(sys)
        .tell(&parent, Message::ActorExitRequest { recursive: true })
        .expect("exit");
    let gone = scenario.run_until(EXIT_TIMEOUT, |s| s.system(sys).actor_count() == 0);
    assert!(gone, "Parent and children should all be gone");
    assert!(!scenario.system(sys).hosts(&parent));

    // asking again is harmless
    scenario
        .system(sys)
        .tell(&parent, Message::ActorExitRequest { recursive: true })
        .expect("exit");
    scenario.run_for(EXIT_TIMEOUT);
    assert_eq!(0, scenario.system(sys).actor_count());
    assert!(scenario.system(sys).drain_inbox().is_empty());
}

#[test]
fn non_recursive_exit_leaves_children_running() {
    let (mut scenario, sys) = single_system();
    let parent = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Parent"))
        .expect("parent");
    for _ in 0..2 {
        scenario
            .system(sys)
            .tell(&parent, Message::text("spawn", "Echo"))
            .expect("tell");
    }
    collect(&mut scenario, sys, 2, REPLY_TIMEOUT);
    scenario
        .system(sys)
        .tell(&parent, Message::ActorExitRequest { recursive: false })
        .expect("exit");
    let parent_gone = scenario.run_until(EXIT_TIMEOUT, |s| !s.system(sys).hosts(&parent));
    assert!(parent_gone);
    assert_eq!(2, scenario.system(sys).actor_count());

    assert!(scenario.shutdown(sys));
    assert_eq!(0, scenario.system(sys).actor_count());
}

#[test]
fn message_failing_twice_returns_as_poison() {
    let (mut scenario, sys) = single_system();
    let flaky = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Flaky"))
        .expect("flaky");
    let bad = Message::text("fail", "please");
    scenario.system(sys).tell(&flaky, bad.clone()).expect("tell");
    let replies = collect(&mut scenario, sys, 1, REPLY_TIMEOUT);
    match &replies[0].message {
        Message::PoisonMessage { original } => assert_eq!(bad, **original),
        other => panic!("Unexpected message: {:?}", other),
    }

    // the actor survives and keeps working
    scenario
        .system(sys)
        .tell(&flaky, Message::text("ping", "still there"))
        .expect("tell");
    let replies = collect(&mut scenario, sys, 1, REPLY_TIMEOUT);
    assert_eq!(Some(("ping", "still there")), text_of(&replies[0]));
}

#[test]
fn fatal_failure_stops_the_actor() {
    let (mut scenario, sys) = single_system();
    let flaky = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Flaky"))
        .expect("flaky");
    await_resolution(&mut scenario, &flaky);
    scenario
        .system(sys)
        .tell(&flaky, Message::text("die", "now"))
        .expect("tell");
    let gone = scenario.run_until(EXIT_TIMEOUT, |s| s.system(sys).actor_count() == 0);
    assert!(gone);
}

#[test]
fn wakeup_arrives_after_its_delay() {
    let (mut scenario, sys) = single_system();
    let alarm = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Alarm"))
        .expect("alarm");
    scenario
        .system(sys)
        .tell(&alarm, Message::text("arm", "5"))
        .expect("tell");
    scenario.run_for(Duration::from_secs(4));
    assert!(scenario.system(sys).drain_inbox().is_empty());
    let replies = collect(&mut scenario, sys, 1, Duration::from_secs(2));
    assert_eq!(Some(("ring", "")), text_of(&replies[0]));
}

#[test]
fn losing_a_capability_stops_actors_that_need_it() {
    let (mut scenario, sys) = single_system_with("{ GPU: true }");
    let plain = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo"))
        .expect("plain");
    let gpu = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("GPU", true)])))
        .expect("gpu");
    await_resolution(&mut scenario, &plain);
    await_resolution(&mut scenario, &gpu);
    assert_eq!(2, scenario.system(sys).actor_count());

    scenario.system(sys).update_capability("GPU", None);
    let stopped = scenario.run_until(EXIT_TIMEOUT, |s| s.system(sys).actor_count() == 1);
    assert!(stopped);
    assert!(scenario.system(sys).hosts(&plain));
    assert!(!scenario.system(sys).hosts(&gpu));
}
