use once_cell::sync::Lazy;
use std::{io::Write, sync::Arc, thread, time::Duration};
use troupe::{config_keys, prelude::*, simulation::Scenario};

mod common;
use common::*;

const LISTEN_TIMEOUT: Duration = Duration::from_secs(2);
const RUN_TIMEOUT: Duration = Duration::from_secs(5);

static TEST_LOGGER: Lazy<TroupeLogger> = Lazy::new(|| {
    let drain = slog_async::Async::new(slog::Discard).build().fuse();
    Logger::root_typed(Arc::new(drain), o!("suite" => "system_tests"))
});

/// A wall-clock system on the in-process channel network
fn live_system() -> ActorSystem {
    let mut conf = SystemConfig::default();
    conf.logger(TEST_LOGGER.clone())
        .register_class(echo_class())
        .register_class(parent_class());
    conf.build().expect("system")
}

#[test]
fn config_files_are_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".conf")
        .tempfile()
        .expect("config file");
    writeln!(
        file,
        r#"
        troupe {{
            system {{
                label = "from-file"
                capabilities = {{ GPU: true, cores: 8 }}
            }}
        }}
        "#
    )
    .expect("write config");
    let mut conf = SystemConfig::default();
    conf.logger(TEST_LOGGER.clone())
        .load_config_file(file.path())
        .set_config_value(&config_keys::VERSION, "9.9".to_string());
    let mut system = conf.build().expect("system");
    assert_eq!("from-file", system.label());
    assert_eq!("9.9", system.version());
    assert_eq!(
        capabilities(vec![
            ("GPU", CapabilityValue::Bool(true)),
            ("cores", CapabilityValue::Int(8)),
        ]),
        *system.capabilities()
    );

    let admin = system.admin_address();
    let ack = system
        .ask(&admin, Message::QueryExists, LISTEN_TIMEOUT)
        .expect("ask")
        .expect("ack");
    assert_eq!(
        Message::QueryAck {
            system_name: "from-file".to_string(),
            system_version: "9.9".to_string(),
            in_shutdown: false,
        },
        ack.message
    );
    system.shutdown();
}

#[test]
fn illegal_config_values_are_rejected() {
    let mut conf = SystemConfig::default();
    conf.logger(TEST_LOGGER.clone())
        .load_config_str("troupe.throttle.threshold = 1.5");
    match conf.build() {
        Err(SystemError::ConfigValue(_)) => (),
        other => panic!("Unexpected result: {:?}", other.map(|system| system.label().to_string())),
    }

    let mut conf = SystemConfig::default();
    conf.logger(TEST_LOGGER.clone())
        .load_config_str(r#"troupe.convention.addresses = ["not an address"]"#);
    assert!(conf.build().is_err());
}

#[test]
fn handles_send_from_other_threads() {
    let mut system = live_system();
    let echo = system.create_actor(CreateRequest::new("Echo")).expect("echo");
    let handle = system.handle();
    let target = echo.clone();
    let sender = thread::spawn(move || {
        for i in 0..3 {
            assert!(handle.tell(&target, Message::text("seq", &i.to_string())));
        }
    });
    sender.join().expect("sender thread");

    let mut replies = Vec::new();
    while replies.len() < 3 {
        match system.listen(LISTEN_TIMEOUT) {
            Some(envelope) => replies.push(envelope),
            None => break,
        }
    }
    let order: Vec<&str> = replies.iter().filter_map(text_of).map(|(_, text)| text).collect();
    assert_eq!(vec!["0", "1", "2"], order);
    system.shutdown();
}

#[test]
fn handles_request_shutdown() {
    let mut system = live_system();
    let parent = system.create_actor(CreateRequest::new("Parent")).expect("parent");
    let spawned = system
        .ask(&parent, Message::text("spawn", "Echo"), LISTEN_TIMEOUT)
        .expect("ask");
    assert!(spawned.is_some());
    assert_eq!(2, system.actor_count());

    let handle = system.handle();
    thread::spawn(move || handle.request_shutdown())
        .join()
        .expect("shutdown thread");
    system.run(RUN_TIMEOUT);
    assert!(system.is_shut_down());
    assert_eq!(0, system.actor_count());
    assert_eq!(
        Err(SystemError::ShutDown),
        system.create_actor(CreateRequest::new("Echo")).map(|_| ())
    );
    assert_eq!(
        Err(SystemError::ShutDown),
        system.tell(&parent, Message::text("spawn", "Echo"))
    );
}

#[test]
fn shutdown_requesters_hear_when_it_completes() {
    let mut scenario = Scenario::new();
    let conf = config_with_classes(&scenario, LEADER);
    let sys = scenario.add_system(conf).expect("system");
    let parent = scenario
        .system(sys)
        .create_actor(CreateRequest::new("Parent"))
        .expect("parent");
    scenario
        .system(sys)
        .tell(&parent, Message::text("spawn", "Echo"))
        .expect("tell");
    collect(&mut scenario, sys, 1, REPLY_TIMEOUT);

    let admin = scenario.system(sys).admin_address();
    scenario
        .system(sys)
        .tell(&admin, Message::SystemShutdown)
        .expect("tell");
    let done = scenario.run_until(RUN_TIMEOUT, |s| s.system(sys).is_shut_down());
    assert!(done);
    let replies = scenario.system(sys).drain_inbox();
    assert!(replies
        .iter()
        .any(|envelope| envelope.message == Message::SystemShutdownCompleted));
    assert_eq!(0, scenario.system(sys).actor_count());
}

#[test]
fn draining_systems_refuse_new_actors_and_give_up_at_the_deadline() {
    let mut scenario = Scenario::new();
    let mut leader = config_with_classes(&scenario, LEADER);
    leader.load_config_str("troupe.system.max-drain-period = 3s");
    let leader = scenario.add_system(leader).expect("leader");
    let member = config_with_classes(&scenario, MEMBER);
    let member = scenario.add_system(member).expect("member");
    let echo = scenario
        .system(member)
        .create_actor(CreateRequest::new("Echo"))
        .expect("echo");
    let echo = ActorAddress::Unique(await_resolution(&mut scenario, &echo));

    // a transmit that cannot complete keeps the drain going
    scenario.network().set_blocked(&system_path(MEMBER), true);
    scenario
        .system(leader)
        .tell(&echo, Message::text("ping", "stuck"))
        .expect("tell");
    scenario.system(leader).handle().request_shutdown();
    scenario.settle();
    assert!(scenario.system(leader).is_shutting_down());
    assert!(!scenario.system(leader).is_shut_down());

    let late = scenario
        .system(leader)
        .create_actor(CreateRequest::new("Echo"))
        .expect("placeholder");
    scenario.settle();
    match scenario.system(leader).drain_inbox().first().map(|e| &e.message) {
        Some(Message::ChildCreationFailed { child, error, .. }) => {
            assert_eq!(PendingActorError::ShuttingDown, *error);
            assert_eq!(*child, late);
        }
        other => panic!("Unexpected message: {:?}", other),
    }

    scenario.run_for(Duration::from_secs(2));
    assert!(!scenario.system(leader).is_shut_down());
    let done = scenario.run_until(Duration::from_secs(2), |s| s.system(leader).is_shut_down());
    assert!(done);
    assert_eq!(1, scenario.system(member).actor_count());
}
