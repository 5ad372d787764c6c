#![allow(dead_code)]

use std::{sync::Arc, time::Duration};
use troupe::{prelude::*, simulation::Scenario};

pub const LEADER: &str = "local://10.0.0.1:1900";
pub const MEMBER: &str = "local://10.0.0.2:1900";
pub const OTHER_MEMBER: &str = "local://10.0.0.3:1900";

pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Replies to every user message with the same payload
pub struct Echo;

impl Actor for Echo {
    fn receive(
        &mut self,
        ctx: &mut ActorContext<'_>,
        sender: &ActorAddress,
        msg: Message,
    ) -> Result<Handled, ActorError> {
        if let Message::User(payload) = msg {
            ctx.tell(sender, payload);
        }
        Ok(Handled::Ok)
    }
}

/// Fails every `fail` message, echoes everything else, and dies on `die`
pub struct Flaky {
    pub attempts: usize,
}

impl Actor for Flaky {
    fn receive(
        &mut self,
        ctx: &mut ActorContext<'_>,
        sender: &ActorAddress,
        msg: Message,
    ) -> Result<Handled, ActorError> {
        match msg {
            Message::User(payload) if payload.tag == "fail" => {
                self.attempts += 1;
                Err(ActorError::Handler(format!("attempt {}", self.attempts)))
            }
            Message::User(payload) if payload.tag == "die" => Err(ActorError::Fatal("told to".to_string())),
            Message::User(payload) => {
                ctx.tell(sender, payload);
                Ok(Handled::Ok)
            }
            _ => Ok(Handled::Ok),
        }
    }
}

/// Spawns an `Echo` child per `spawn` message and reports children that exit
///
/// Replies `spawned` to the requester, and forwards `relay` messages to its first child.
pub struct Parent {
    pub children: Vec<ActorAddress>,
    pub requester: Option<ActorAddress>,
}

impl Parent {
    pub fn new() -> Self {
        Parent {
            children: Vec::new(),
            requester: None,
        }
    }
}

impl Actor for Parent {
    fn receive(
        &mut self,
        ctx: &mut ActorContext<'_>,
        sender: &ActorAddress,
        msg: Message,
    ) -> Result<Handled, ActorError> {
        match msg {
            Message::User(payload) if payload.tag == "spawn" => {
                let class = payload.as_text().unwrap_or("Echo").to_string();
                let child = ctx
                    .create_actor(CreateRequest::new(class))
                    .map_err(|e| ActorError::Handler(e.to_string()))?;
                self.children.push(child);
                self.requester = Some(sender.clone());
                ctx.tell(sender, Payload::text("spawned", ""));
            }
            Message::User(payload) if payload.tag == "relay" => {
                if let Some(child) = self.children.first() {
                    let child = child.clone();
                    ctx.tell(&child, payload);
                }
            }
            Message::ChildCreationFailed { error, .. } => {
                if let Some(requester) = self.requester.clone() {
                    ctx.tell(&requester, Payload::text("child-failed", &error.to_string()));
                }
            }
            Message::ChildActorExited { child } => {
                self.children.retain(|c| *c != child);
                if let Some(requester) = self.requester.clone() {
                    ctx.tell(&requester, Payload::text("child-exited", ""));
                }
            }
            _ => (),
        }
        Ok(Handled::Ok)
    }
}

/// Answers `arm` with a wakeup that is reported back as `ring`
pub struct Alarm {
    pub requester: Option<ActorAddress>,
}

impl Actor for Alarm {
    fn receive(
        &mut self,
        ctx: &mut ActorContext<'_>,
        sender: &ActorAddress,
        msg: Message,
    ) -> Result<Handled, ActorError> {
        match msg {
            Message::User(payload) if payload.tag == "arm" => {
                let secs: u64 = payload.as_text().and_then(|t| t.parse().ok()).unwrap_or(1);
                self.requester = Some(sender.clone());
                ctx.wakeup_after(Duration::from_secs(secs), Some(Payload::text("ring", "")));
            }
            Message::WakeupMessage {
                payload: Some(payload),
                ..
            } => {
                if let Some(requester) = self.requester.clone() {
                    ctx.tell(&requester, payload);
                }
            }
            _ => (),
        }
        Ok(Handled::Ok)
    }
}

pub fn echo_class() -> Arc<dyn ActorClass> {
    SimpleClass::new("Echo", || Box::new(Echo) as Box<dyn Actor>).shared()
}

pub fn flaky_class() -> Arc<dyn ActorClass> {
    SimpleClass::new("Flaky", || Box::new(Flaky { attempts: 0 }) as Box<dyn Actor>).shared()
}

pub fn parent_class() -> Arc<dyn ActorClass> {
    SimpleClass::new("Parent", || Box::new(Parent::new()) as Box<dyn Actor>).shared()
}

pub fn alarm_class() -> Arc<dyn ActorClass> {
    SimpleClass::new("Alarm", || Box::new(Alarm { requester: None }) as Box<dyn Actor>).shared()
}

/// A config on `scenario` with the test classes registered
pub fn config_with_classes(scenario: &Scenario, address: &str) -> SystemConfig {
    let mut conf = scenario.config(address).expect("config");
    conf.register_class(echo_class())
        .register_class(flaky_class())
        .register_class(parent_class())
        .register_class(alarm_class());
    conf
}

/// A config that joins the convention led by [LEADER](LEADER)
pub fn convention_config(scenario: &Scenario, address: &str, capabilities: &str) -> SystemConfig {
    let mut conf = config_with_classes(scenario, address);
    conf.load_config_str(format!(
        r#"
        troupe {{
            convention.addresses = ["{}"]
            system.capabilities = {}
        }}
        "#,
        LEADER, capabilities
    ));
    conf
}

/// Run until the leader `systems[0]` sees every other system, and they all see the leader
pub fn await_convention(scenario: &mut Scenario, systems: &[usize]) -> bool {
    let members = systems.len() - 1;
    scenario.run_until(JOIN_TIMEOUT, |s| {
        let now = s.now();
        systems.iter().enumerate().all(|(n, i)| {
            let live = s.system(*i).convention().live_members(now).len();
            if n == 0 {
                live >= members
            } else {
                live >= 1
            }
        })
    })
}

/// Run until `count` envelopes arrived at the external address of `system`
pub fn collect(scenario: &mut Scenario, system: usize, count: usize, limit: Duration) -> Vec<Envelope> {
    let mut received = Vec::new();
    scenario.run_until(limit, |s| {
        received.extend(s.system(system).drain_inbox());
        received.len() >= count
    });
    received
}

/// Run until the placeholder `address` is bound to an actor
pub fn await_resolution(scenario: &mut Scenario, address: &ActorAddress) -> UniquePath {
    let resolved = scenario.run_until(REPLY_TIMEOUT, |_| address.unique().is_some());
    assert!(resolved, "{} was never resolved", address);
    address.unique().expect("resolved")
}

/// The text of a user message
pub fn text_of(envelope: &Envelope) -> Option<(&str, &str)> {
    match &envelope.message {
        Message::User(payload) => payload.as_text().map(|text| (payload.tag.as_str(), text)),
        _ => None,
    }
}

pub fn system_path(address: &str) -> SystemPath {
    address.parse().expect("system path")
}
