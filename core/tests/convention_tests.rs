use std::time::Duration;
use troupe::{prelude::*, simulation::Scenario};

mod common;
use common::*;

const SETTLE_PERIOD: Duration = Duration::from_secs(20);

fn leader_and_member() -> (Scenario, usize, usize) {
    let mut scenario = Scenario::new();
    let leader = convention_config(&scenario, LEADER, "{}");
    let member = convention_config(&scenario, MEMBER, "{ GPU: true }");
    let leader = scenario.add_system(leader).expect("leader");
    let member = scenario.add_system(member).expect("member");
    assert!(await_convention(&mut scenario, &[leader, member]));
    (scenario, leader, member)
}

/// The kinds of the messages sent from `from` to `to`
fn sent_kinds(scenario: &Scenario, from: &str, to: &str) -> Vec<&'static str> {
    scenario
        .network()
        .frames_between(&system_path(from), &system_path(to))
        .iter()
        .map(|frame| frame.message.kind())
        .collect()
}

#[test]
fn member_joins_the_leader() {
    let (mut scenario, leader, member) = leader_and_member();
    let now = scenario.now();
    let leader_admin = system_path(LEADER).admin();
    let member_admin = system_path(MEMBER).admin();

    assert!(scenario.system(leader).is_leader());
    assert!(!scenario.system(member).is_leader());
    assert_eq!(Some(leader_admin.clone()), scenario.system(member).convention().leader(now));
    assert_eq!(vec![member_admin.clone()], scenario.system(leader).convention().live_members(now));
    assert_eq!(vec![leader_admin], scenario.system(member).convention().live_members(now));

    let data = scenario
        .system(leader)
        .convention()
        .member(&member_admin)
        .expect("member data")
        .clone();
    assert_eq!(capabilities(vec![("GPU", true)]), data.capabilities);
}

#[test]
fn observers_hear_about_joins_and_departures() {
    let mut scenario = Scenario::new();
    let leader = convention_config(&scenario, LEADER, "{}");
    let leader = scenario.add_system(leader).expect("leader");
    let observer = scenario.system(leader).external_address();
    scenario.system(leader).notify_on_registration(&observer, true);

    let member = convention_config(&scenario, MEMBER, "{ GPU: true }");
    let member = scenario.add_system(member).expect("member");
    let updates = collect(&mut scenario, leader, 1, JOIN_TIMEOUT);
    match &updates[0].message {
        Message::ConventionUpdate {
            remote_admin,
            capabilities: caps,
            added,
        } => {
            assert!(*added);
            assert_eq!(*remote_admin, system_path(MEMBER).admin());
            assert_eq!(capabilities(vec![("GPU", true)]), *caps);
        }
        other => panic!("Unexpected message: {:?}", other),
    }

    assert!(scenario.shutdown(member));
    let updates = collect(&mut scenario, leader, 1, JOIN_TIMEOUT);
    match &updates[0].message {
        Message::ConventionUpdate {
            remote_admin,
            added,
            ..
        } => {
            assert!(!*added);
            assert_eq!(*remote_admin, system_path(MEMBER).admin());
        }
        other => panic!("Unexpected message: {:?}", other),
    }
    let now = scenario.now();
    assert!(scenario.system(leader).convention().live_members(now).is_empty());
}

#[test]
fn departing_leader_is_forgotten() {
    let (mut scenario, leader, member) = leader_and_member();
    assert!(scenario.shutdown(leader));
    let now = scenario.now();
    assert!(scenario.system(member).convention().live_members(now).is_empty());
    assert_eq!(None, scenario.system(member).convention().leader(now));
}

#[test]
fn actors_are_placed_on_a_capable_member() {
    let (mut scenario, leader, member) = leader_and_member();
    let gpu = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("GPU", true)])))
        .expect("gpu echo");
    scenario
        .system(leader)
        .tell(&gpu, Message::text("ping", "gpu"))
        .expect("tell");
    let replies = collect(&mut scenario, leader, 1, REPLY_TIMEOUT);
    assert_eq!(Some(("ping", "gpu")), text_of(&replies[0]));
    assert_eq!(Some(system_path(MEMBER)), replies[0].sender.system());
    assert_eq!(Some(system_path(MEMBER)), gpu.system());
    assert_eq!(0, scenario.system(leader).actor_count());
    assert_eq!(1, scenario.system(member).actor_count());
}

#[test]
fn remote_children_report_their_exit_to_the_requester() {
    let (mut scenario, leader, member) = leader_and_member();
    let gpu = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("GPU", true)])))
        .expect("gpu echo");
    let path = await_resolution(&mut scenario, &gpu);
    scenario
        .system(leader)
        .tell(&gpu, Message::ActorExitRequest { recursive: true })
        .expect("exit");
    let notices = collect(&mut scenario, leader, 1, REPLY_TIMEOUT);
    match &notices[0].message {
        Message::ChildActorExited { child } => assert_eq!(*child, path),
        other => panic!("Unexpected message: {:?}", other),
    }
    assert_eq!(0, scenario.system(member).actor_count());
}

#[test]
fn no_capable_member_fails_creation() {
    let (mut scenario, leader, _member) = leader_and_member();
    let quantum = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("quantum", true)])))
        .expect("placeholder");
    let replies = collect(&mut scenario, leader, 1, REPLY_TIMEOUT);
    match &replies[0].message {
        Message::ChildCreationFailed { child, error, .. } => {
            assert_eq!(PendingActorError::NoCompatibleSystem, *error);
            assert_eq!(*child, quantum);
        }
        other => panic!("Unexpected message: {:?}", other),
    }
}

#[test]
fn creation_falls_back_when_a_candidate_is_unreachable() {
    let mut scenario = Scenario::new();
    let leader = convention_config(&scenario, LEADER, "{}");
    let member = convention_config(&scenario, MEMBER, "{ GPU: true }");
    let other = convention_config(&scenario, OTHER_MEMBER, "{ GPU: true }");
    let leader = scenario.add_system(leader).expect("leader");
    let member = scenario.add_system(member).expect("member");
    let other = scenario.add_system(other).expect("other");
    assert!(await_convention(&mut scenario, &[leader, member, other]));

    scenario.network().set_down(&system_path(MEMBER), true);
    let gpu = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("GPU", true)])))
        .expect("gpu echo");
    scenario
        .system(leader)
        .tell(&gpu, Message::text("ping", "fallback"))
        .expect("tell");
    let replies = collect(&mut scenario, leader, 1, REPLY_TIMEOUT);
    assert_eq!(Some(("ping", "fallback")), text_of(&replies[0]));
    assert_eq!(Some(system_path(OTHER_MEMBER)), replies[0].sender.system());
    assert_eq!(0, scenario.system(member).actor_count());
    assert_eq!(1, scenario.system(other).actor_count());
}

#[test]
fn late_creation_answers_stop_the_orphan() {
    let mut scenario = Scenario::new();
    let mut leader = convention_config(&scenario, LEADER, "{}");
    leader.load_config_str("troupe.system.max-creation-delay = 3s");
    let member = convention_config(&scenario, MEMBER, "{ GPU: true }");
    let leader = scenario.add_system(leader).expect("leader");
    let member = scenario.add_system(member).expect("member");
    assert!(await_convention(&mut scenario, &[leader, member]));

    let member_path = system_path(MEMBER);
    scenario.network().set_blocked(&member_path, true);
    scenario.network().clear_sent();
    let gpu = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo").requiring(capabilities(vec![("GPU", true)])))
        .expect("gpu echo");
    let replies = collect(&mut scenario, leader, 1, Duration::from_secs(5));
    match &replies[0].message {
        Message::ChildCreationFailed { child, error, .. } => {
            assert_eq!(PendingActorError::Timeout, *error);
            assert_eq!(*child, gpu);
        }
        other => panic!("Unexpected message: {:?}", other),
    }

    // the request still gets through, and the actor it creates is stopped again
    scenario.network().set_blocked(&member_path, false);
    scenario.run_for(SETTLE_PERIOD);
    let sent = sent_kinds(&scenario, LEADER, MEMBER);
    assert!(sent.contains(&"PendingActor"));
    assert!(sent.contains(&"ActorExitRequest"));
    assert_eq!(0, scenario.system(member).actor_count());
    assert!(gpu.unique().is_none());
}

#[test]
fn capability_bursts_are_coalesced() {
    let (mut scenario, leader, member) = leader_and_member();
    scenario.run_for(Duration::from_secs(1));
    scenario.network().clear_sent();

    for cores in 1..=5i64 {
        scenario
            .system(member)
            .update_capability("cores", Some(CapabilityValue::Int(cores)));
    }
    scenario.run_for(SETTLE_PERIOD);
    let sent = sent_kinds(&scenario, MEMBER, LEADER);
    assert_eq!(2, sent.iter().filter(|kind| **kind == "Register").count());

    let data = scenario
        .system(leader)
        .convention()
        .member(&system_path(MEMBER).admin())
        .expect("member data")
        .clone();
    assert_eq!(Some(&CapabilityValue::Int(5)), data.capabilities.get("cores"));
    assert_eq!(Some(&CapabilityValue::Bool(true)), data.capabilities.get("GPU"));
}

#[test]
fn pre_registered_systems_are_invited() {
    let mut scenario = Scenario::new();
    let leader = convention_config(&scenario, LEADER, "{}");
    let leader = scenario.add_system(leader).expect("leader");
    let loner = config_with_classes(&scenario, OTHER_MEMBER);
    let loner = scenario.add_system(loner).expect("loner");

    scenario
        .system(loner)
        .pre_register_system(LEADER)
        .expect("pre-register");
    let joined = scenario.run_until(JOIN_TIMEOUT, |s| {
        let now = s.now();
        s.system(leader)
            .convention()
            .live_members(now)
            .contains(&system_path(OTHER_MEMBER).admin())
    });
    assert!(joined);
    assert!(sent_kinds(&scenario, LEADER, OTHER_MEMBER).contains(&"Invite"));
    let data = scenario
        .system(leader)
        .convention()
        .member(&system_path(OTHER_MEMBER).admin())
        .expect("member data")
        .clone();
    assert!(data.permanent);
}
